//! Retrieving and decoding RSS feeds.
//!
//! - [`fetcher`] - HTTP GET with a fixed User-Agent, timeout and size cap
//! - [`rss`] - RSS 2.0 decoding on top of the `quick-xml` event reader
//! - [`timestamp`] - Best-effort `<pubDate>` normalization
//!
//! ```ignore
//! let fetcher = FeedFetcher::new(DEFAULT_USER_AGENT, DEFAULT_TIMEOUT)?;
//! let feed = fetcher.fetch("https://blog.boot.dev/index.xml").await?;
//! for item in &feed.channel.items {
//!     let published = normalize_pub_date(&item.pub_date);
//! }
//! ```

mod fetcher;
mod rss;
mod timestamp;

pub use fetcher::{
    validate_feed_url, FeedFetcher, FetchError, DEFAULT_TIMEOUT, DEFAULT_USER_AGENT,
};
pub use rss::{parse_rss, Channel, RssError, RssFeed, RssItem};
pub use timestamp::{is_zero, normalize_pub_date};
