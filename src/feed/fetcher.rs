use crate::feed::rss::{parse_rss, RssFeed};
use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Sent with every request so feed hosts can identify the aggregator
pub const DEFAULT_USER_AGENT: &str = "gator";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Errors that can occur while retrieving and decoding a feed.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Not an absolute http(s) URL
    #[error("Invalid feed URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// Request exceeded the configured timeout
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Body is not an RSS document
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Check that `raw` is an absolute http or https URL.
pub fn validate_feed_url(raw: &str) -> Result<Url, FetchError> {
    let invalid = |reason: String| FetchError::InvalidUrl {
        url: raw.to_string(),
        reason,
    };

    let url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(invalid(format!("unsupported scheme '{scheme}'"))),
    }
}

/// HTTP client for RSS feeds.
///
/// One GET per call: no retries and no conditional requests. The loop that
/// drives it decides what a failure means.
#[derive(Debug, Clone)]
pub struct FeedFetcher {
    client: reqwest::Client,
    timeout: Duration,
    max_body_bytes: usize,
}

impl FeedFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .pool_idle_timeout(Duration::from_secs(30))
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            timeout,
            max_body_bytes: MAX_FEED_SIZE,
        })
    }

    /// Download `url` and decode it as RSS, with HTML entities in titles and
    /// descriptions already decoded.
    ///
    /// # Errors
    ///
    /// - [`FetchError::InvalidUrl`] - Not an http(s) URL
    /// - [`FetchError::Network`] - Connection or TLS errors
    /// - [`FetchError::Timeout`] - Request and body read exceeded the timeout
    /// - [`FetchError::HttpStatus`] - Non-2xx HTTP response
    /// - [`FetchError::ResponseTooLarge`] - Body exceeded 10MB
    /// - [`FetchError::Parse`] - Malformed or non-RSS XML
    pub async fn fetch(&self, url: &str) -> Result<RssFeed, FetchError> {
        let url = validate_feed_url(url)?;

        let bytes = tokio::time::timeout(self.timeout, self.download(url.clone()))
            .await
            .map_err(|_| FetchError::Timeout(self.timeout))??;

        let mut feed = parse_rss(&bytes).map_err(|e| FetchError::Parse(e.to_string()))?;
        feed.unescape_html();

        tracing::debug!(
            url = %url,
            bytes = bytes.len(),
            items = feed.channel.items.len(),
            "Fetched feed"
        );
        Ok(feed)
    }

    async fn download(&self, url: Url) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout(self.timeout)
            } else {
                FetchError::Network(e)
            }
        })?;

        // EDGE-002: Validate HTTP status before processing
        if !response.status().is_success() {
            return Err(FetchError::HttpStatus(response.status().as_u16()));
        }

        read_limited_bytes(response, self.max_body_bytes).await
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len > limit as u64 {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}
