//! The polling loop behind `gator agg`.
//!
//! [`Aggregator`] selects the least recently fetched feed, marks it, fetches
//! it and stores each new item as a post, then waits a fixed interval. A link
//! that is already stored ends the current feed's cycle early.

mod clock;
mod interval;
mod scheduler;
mod types;

pub use clock::{Clock, SystemClock};
pub use interval::{parse_interval, MIN_INTERVAL};
pub use scheduler::Aggregator;
pub use types::{AggregateError, CycleReport, FailurePolicy, Phase, RunSummary};
