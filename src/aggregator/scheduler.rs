use std::time::Duration;

use tokio::sync::watch;
use uuid::Uuid;

use super::clock::{Clock, SystemClock};
use super::types::{AggregateError, CycleReport, FailurePolicy, Phase, RunSummary};
use crate::feed::{is_zero, normalize_pub_date, FeedFetcher, FetchError, RssFeed};
use crate::storage::{DatabaseError, Feed, FeedStore, NewPost};

/// Polls registered feeds one at a time, least recently fetched first, and
/// stores their new items as posts.
///
/// Every cycle walks `Selecting -> Fetching -> Storing`, and [`run`] adds a
/// `Waiting` phase between cycles.
///
/// [`run`]: Aggregator::run
pub struct Aggregator<S, C = SystemClock> {
    store: S,
    fetcher: FeedFetcher,
    clock: C,
    policy: FailurePolicy,
    phase: Phase,
}

impl<S: FeedStore> Aggregator<S, SystemClock> {
    pub fn new(store: S, fetcher: FeedFetcher) -> Self {
        Self {
            store,
            fetcher,
            clock: SystemClock,
            policy: FailurePolicy::default(),
            phase: Phase::Idle,
        }
    }
}

impl<S: FeedStore, C: Clock> Aggregator<S, C> {
    pub fn with_clock<C2: Clock>(self, clock: C2) -> Aggregator<S, C2> {
        Aggregator {
            store: self.store,
            fetcher: self.fetcher,
            clock,
            policy: self.policy,
            phase: self.phase,
        }
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Run a single cycle: select the stalest feed, mark it, fetch it and
    /// store its items.
    ///
    /// # Errors
    ///
    /// - [`AggregateError::NoFeeds`] when nothing is registered
    /// - [`AggregateError::Fetch`] on a fetch failure under fail-fast
    /// - [`AggregateError::Store`] on any persistence failure other than a
    ///   duplicate link
    pub async fn run_cycle(&mut self) -> Result<CycleReport, AggregateError> {
        let feed = self.select_and_mark().await?;
        self.phase = Phase::Fetching;
        let fetched = self.fetcher.fetch(&feed.url).await;
        let report = self.ingest(&feed, fetched).await;
        self.phase = Phase::Idle;
        report
    }

    /// Cycle until `shutdown` turns `true`, sleeping `interval` between
    /// cycles. The first cycle starts immediately.
    ///
    /// An in-flight fetch or a pending wait is abandoned as soon as shutdown
    /// is signalled; a store phase already under way finishes first.
    ///
    /// # Errors
    ///
    /// [`AggregateError::NoFeeds`] if no feed is registered when the loop
    /// starts, otherwise the same errors as [`run_cycle`](Self::run_cycle).
    pub async fn run(
        &mut self,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<RunSummary, AggregateError> {
        let feeds = self.store.get_all_feeds().await?;
        if feeds.is_empty() {
            return Err(AggregateError::NoFeeds);
        }
        tracing::info!(feeds = feeds.len(), interval = ?interval, "Collecting feeds");

        let result = self.run_loop(interval, &mut shutdown).await;
        self.phase = Phase::Idle;

        if let Ok(summary) = &result {
            tracing::info!(
                cycles = summary.cycles,
                posts_inserted = summary.posts_inserted,
                feeds_skipped = summary.feeds_skipped,
                "Aggregation stopped"
            );
        }
        result
    }

    async fn run_loop(
        &mut self,
        interval: Duration,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<RunSummary, AggregateError> {
        let mut summary = RunSummary::default();

        loop {
            if *shutdown.borrow() {
                break;
            }

            let feed = self.select_and_mark().await?;

            self.phase = Phase::Fetching;
            let fetched = tokio::select! {
                result = self.fetcher.fetch(&feed.url) => result,
                _ = cancelled(shutdown) => {
                    tracing::debug!(url = %feed.url, "Fetch abandoned on shutdown");
                    break;
                }
            };

            let report = self.ingest(&feed, fetched).await?;
            summary.record(&report);

            self.phase = Phase::Waiting;
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = cancelled(shutdown) => break,
            }
        }

        Ok(summary)
    }

    async fn select_and_mark(&mut self) -> Result<Feed, AggregateError> {
        self.phase = Phase::Selecting;
        let feed = self
            .store
            .get_next_feed_to_fetch()
            .await?
            .ok_or(AggregateError::NoFeeds)?;

        // Marked before fetching so a failing feed still rotates to the back
        self.store
            .mark_feed_fetched(feed.id, self.clock.now())
            .await?;

        tracing::debug!(feed = %feed.name, url = %feed.url, "Selected feed");
        Ok(feed)
    }

    async fn ingest(
        &mut self,
        feed: &Feed,
        fetched: Result<RssFeed, FetchError>,
    ) -> Result<CycleReport, AggregateError> {
        let mut report = CycleReport::new(feed);

        let rss = match fetched {
            Ok(rss) => rss,
            Err(e) => match self.policy {
                FailurePolicy::FailFast => {
                    return Err(AggregateError::Fetch {
                        url: feed.url.clone(),
                        source: e,
                    });
                }
                FailurePolicy::SkipFeed => {
                    tracing::warn!(
                        feed = %feed.name,
                        url = %feed.url,
                        error = %e,
                        "Fetch failed, skipping feed until its next turn"
                    );
                    report.fetch_error = Some(e.to_string());
                    return Ok(report);
                }
            },
        };

        self.phase = Phase::Storing;
        report.items = rss.channel.items.len();

        for item in rss.channel.items {
            if item.link.trim().is_empty() {
                tracing::debug!(feed = %feed.name, title = %item.title, "Item without link skipped");
                report.skipped_no_link += 1;
                continue;
            }

            let published_at = normalize_pub_date(&item.pub_date);
            if is_zero(&published_at) && !item.pub_date.trim().is_empty() {
                tracing::debug!(
                    link = %item.link,
                    pub_date = %item.pub_date,
                    "Could not parse publication date"
                );
            }

            let now = self.clock.now();
            let post = NewPost {
                id: Uuid::new_v4(),
                created_at: now,
                updated_at: now,
                title: item.title,
                url: item.link,
                description: item.description,
                published_at,
                feed_id: feed.id,
            };

            match self.store.create_post(&post).await {
                Ok(_) => report.inserted += 1,
                Err(DatabaseError::DuplicatePost { url }) => {
                    // Items are newest first: everything after a known link is known too
                    tracing::debug!(url = %url, "Reached already stored post");
                    report.duplicate_stop = true;
                    break;
                }
                Err(e) => return Err(e.into()),
            }
        }

        tracing::info!(
            feed = %feed.name,
            items = report.items,
            inserted = report.inserted,
            duplicate_stop = report.duplicate_stop,
            "Feed collected"
        );
        Ok(report)
    }
}

/// Resolves once shutdown is requested. A dropped sender means shutdown can
/// never be requested, so this never resolves.
async fn cancelled(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}
