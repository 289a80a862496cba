//! gator: a command-line RSS aggregator.
//!
//! Users register feeds, follow feeds registered by others and browse the
//! newest posts from what they follow. `gator agg` keeps the post table fresh
//! by polling one feed at a time on a fixed interval.

pub mod aggregator;
pub mod commands;
pub mod config;
pub mod feed;
pub mod storage;
