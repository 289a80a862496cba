use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::feed::FetchError;
use crate::storage::{DatabaseError, Feed};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("could not parse entered duration: {0:?}")]
    InvalidInterval(String),

    #[error("agg command requires at least {}s between requests", .0.as_secs())]
    IntervalTooShort(Duration),

    #[error("No feeds to aggregate. Add one with `gator addfeed <name> <url>`.")]
    NoFeeds,

    #[error(transparent)]
    Store(#[from] DatabaseError),

    /// Fetch failure under [`FailurePolicy::FailFast`]
    #[error("Failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: FetchError,
    },
}

// ============================================================================
// Policy
// ============================================================================

/// What the loop does when a feed cannot be fetched or parsed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Stop the loop with [`AggregateError::Fetch`]
    #[default]
    FailFast,
    /// Log the failure and move on to the next feed after the usual wait
    SkipFeed,
}

// ============================================================================
// Loop State
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Idle,
    Selecting,
    Fetching,
    Storing,
    Waiting,
}

/// Outcome of one select/fetch/store cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub feed_id: Uuid,
    pub feed_name: String,
    pub feed_url: String,
    /// Items returned by the feed
    pub items: usize,
    /// Posts newly stored this cycle
    pub inserted: usize,
    /// Items skipped because they had no link
    pub skipped_no_link: usize,
    /// An already-stored link ended the cycle early
    pub duplicate_stop: bool,
    /// Set when the fetch failed and the feed was skipped
    pub fetch_error: Option<String>,
}

impl CycleReport {
    pub(crate) fn new(feed: &Feed) -> Self {
        Self {
            feed_id: feed.id,
            feed_name: feed.name.clone(),
            feed_url: feed.url.clone(),
            items: 0,
            inserted: 0,
            skipped_no_link: 0,
            duplicate_stop: false,
            fetch_error: None,
        }
    }
}

/// Totals for a loop that ended through cancellation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub cycles: u64,
    pub posts_inserted: u64,
    pub feeds_skipped: u64,
}

impl RunSummary {
    pub(crate) fn record(&mut self, report: &CycleReport) {
        self.cycles += 1;
        self.posts_inserted += report.inserted as u64;
        if report.fetch_error.is_some() {
            self.feeds_skipped += 1;
        }
    }
}
