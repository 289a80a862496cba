//! Command handlers for the `gator` CLI.
//!
//! Handlers return the lines to print so the binary owns stdout. Commands
//! that act on behalf of a user go through [`Session::require_user`] first.
use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use tokio::sync::watch;

use crate::aggregator::{parse_interval, Aggregator, FailurePolicy, RunSummary};
use crate::config::Config;
use crate::feed::{is_zero, validate_feed_url, FeedFetcher};
use crate::storage::{Database, User};

pub const DEFAULT_BROWSE_LIMIT: u32 = 2;

/// Database handle plus the loaded config and where to save it
pub struct Session {
    pub db: Database,
    pub config: Config,
    config_path: PathBuf,
}

impl Session {
    pub fn new(db: Database, config: Config, config_path: PathBuf) -> Self {
        Self {
            db,
            config,
            config_path,
        }
    }

    /// Resolve the logged-in user, failing when nobody is logged in or the
    /// recorded user no longer exists.
    pub async fn require_user(&self) -> Result<User> {
        let Some(name) = self.config.current_user_name.as_deref() else {
            bail!("Not logged in. Run `gator register <name>` or `gator login <name>` first.");
        };
        let user = self
            .db
            .get_user_by_name(name)
            .await
            .context("Current user is no longer registered; log in again")?;
        Ok(user)
    }

    // ========================================================================
    // Users
    // ========================================================================

    pub async fn register(&mut self, name: &str) -> Result<Vec<String>> {
        let name = name.trim();
        if name.is_empty() {
            bail!("register command expects a non-empty username");
        }
        let user = self.db.create_user(name).await?;
        self.config
            .set_user(&user.name, &self.config_path)
            .context("User created but the config file could not be updated")?;

        tracing::info!(user = %user.name, "Registered user");
        Ok(vec![format!("user {} created", user.name)])
    }

    pub async fn login(&mut self, name: &str) -> Result<Vec<String>> {
        let user = self.db.get_user_by_name(name).await?;
        self.config.set_user(&user.name, &self.config_path)?;
        Ok(vec![format!("username has been updated to {}", user.name)])
    }

    pub async fn users(&self) -> Result<Vec<String>> {
        let current = self.config.current_user_name.as_deref();
        let users = self.db.get_users().await?;
        Ok(users
            .into_iter()
            .map(|u| {
                if Some(u.name.as_str()) == current {
                    format!("{} (current)", u.name)
                } else {
                    u.name
                }
            })
            .collect())
    }

    /// Delete every user; feeds, follows and posts go with them.
    pub async fn reset(&self) -> Result<Vec<String>> {
        let removed = self.db.reset_users().await?;
        tracing::info!(users = removed, "Database reset");
        Ok(vec![format!("reset complete, {removed} users removed")])
    }

    // ========================================================================
    // Feeds and Follows
    // ========================================================================

    pub async fn add_feed(&self, name: &str, url: &str) -> Result<Vec<String>> {
        let user = self.require_user().await?;
        validate_feed_url(url)?;

        let feed = self.db.create_feed(name, url, user.id).await?;
        self.db.create_feed_follow(&user, &feed).await?;

        Ok(vec![format!(
            "feed {} created with url {} for user {}",
            feed.name, feed.url, user.name
        )])
    }

    pub async fn feeds(&self) -> Result<Vec<String>> {
        let feeds = self.db.get_feeds_with_owner().await?;
        Ok(feeds
            .into_iter()
            .map(|f| format!("feed {} with url {} for user {}", f.name, f.url, f.user_name))
            .collect())
    }

    pub async fn follow(&self, url: &str) -> Result<Vec<String>> {
        let user = self.require_user().await?;
        let feed = self.db.get_feed_by_url(url).await?;
        let follow = self.db.create_feed_follow(&user, &feed).await?;
        Ok(vec![format!(
            "user {} followed feed {}",
            follow.user_name, follow.feed_name
        )])
    }

    pub async fn following(&self) -> Result<Vec<String>> {
        let user = self.require_user().await?;
        let follows = self.db.get_feed_follows_for_user(&user.name).await?;
        Ok(follows.into_iter().map(|f| f.feed_name).collect())
    }

    pub async fn unfollow(&self, url: &str) -> Result<Vec<String>> {
        let user = self.require_user().await?;
        let feed = self.db.get_feed_by_url(url).await?;
        if !self.db.unfollow_feed(user.id, feed.id).await? {
            bail!("user {} does not follow {}", user.name, feed.url);
        }
        Ok(vec![format!(
            "unfollowed feed with url {} for user {}",
            feed.url, user.name
        )])
    }

    // ========================================================================
    // Posts
    // ========================================================================

    /// Newest posts from the feeds the current user follows.
    pub async fn browse(&self, limit: u32) -> Result<Vec<String>> {
        let user = self.require_user().await?;
        let posts = self.db.get_posts_for_user(user.id, i64::from(limit)).await?;

        let mut lines = Vec::with_capacity(posts.len() * 3);
        for post in posts {
            lines.push(post.title);
            lines.push(format!("    {}", post.url));
            if !is_zero(&post.published_at) {
                lines.push(format!(
                    "    published {}",
                    post.published_at.format("%Y-%m-%d %H:%M UTC")
                ));
            }
        }
        Ok(lines)
    }

    // ========================================================================
    // Aggregation
    // ========================================================================

    /// Run the polling loop until `shutdown` fires or a fatal error occurs.
    ///
    /// `keep_going` overrides the configured failure policy with
    /// [`FailurePolicy::SkipFeed`].
    pub async fn aggregate(
        &self,
        interval: &str,
        keep_going: bool,
        shutdown: watch::Receiver<bool>,
    ) -> Result<RunSummary> {
        let interval = parse_interval(interval, self.config.min_interval())?;
        let policy = if keep_going {
            FailurePolicy::SkipFeed
        } else {
            self.config.fetch_failure_policy
        };

        let fetcher = FeedFetcher::new(&self.config.user_agent, self.config.request_timeout())
            .context("Failed to build HTTP client")?;
        let mut aggregator = Aggregator::new(self.db.clone(), fetcher).with_policy(policy);

        let summary = aggregator.run(interval, shutdown).await?;
        Ok(summary)
    }
}
