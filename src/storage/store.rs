use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::schema::Database;
use super::types::{DatabaseError, Feed, NewPost, Post};

/// The narrow query surface the aggregator needs from persistence.
///
/// [`Database`] is the production implementation. `create_post` must report
/// a link collision as [`DatabaseError::DuplicatePost`] and leave the store
/// unchanged.
#[async_trait]
pub trait FeedStore: Send + Sync {
    async fn get_all_feeds(&self) -> Result<Vec<Feed>, DatabaseError>;

    /// Oldest `last_fetched_at` first, never-fetched feeds before all others
    async fn get_next_feed_to_fetch(&self) -> Result<Option<Feed>, DatabaseError>;

    async fn mark_feed_fetched(
        &self,
        feed_id: Uuid,
        fetched_at: DateTime<Utc>,
    ) -> Result<(), DatabaseError>;

    async fn create_post(&self, post: &NewPost) -> Result<Post, DatabaseError>;
}

#[async_trait]
impl FeedStore for Database {
    async fn get_all_feeds(&self) -> Result<Vec<Feed>, DatabaseError> {
        Database::get_all_feeds(self).await
    }

    async fn get_next_feed_to_fetch(&self) -> Result<Option<Feed>, DatabaseError> {
        Database::get_next_feed_to_fetch(self).await
    }

    async fn mark_feed_fetched(
        &self,
        feed_id: Uuid,
        fetched_at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        Database::mark_feed_fetched(self, feed_id, fetched_at).await
    }

    async fn create_post(&self, post: &NewPost) -> Result<Post, DatabaseError> {
        Database::create_post(self, post).await
    }
}
