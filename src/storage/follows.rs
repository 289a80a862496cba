use chrono::Utc;
use uuid::Uuid;

use super::schema::Database;
use super::types::{to_millis, DatabaseError, Feed, FeedFollow, User};

impl Database {
    // ========================================================================
    // Follow Operations
    // ========================================================================

    /// Make `user` follow `feed`. Following twice is an error.
    pub async fn create_feed_follow(
        &self,
        user: &User,
        feed: &Feed,
    ) -> Result<FeedFollow, DatabaseError> {
        let now = to_millis(Utc::now());
        let id = Uuid::new_v4();
        let result = sqlx::query(
            r#"
            INSERT INTO feed_follows (id, created_at, updated_at, user_id, feed_id)
            VALUES (?, ?, ?, ?, ?)
        "#,
        )
        .bind(id)
        .bind(now)
        .bind(now)
        .bind(user.id)
        .bind(feed.id)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(FeedFollow {
                id,
                user_id: user.id,
                feed_id: feed.id,
                user_name: user.name.clone(),
                feed_name: feed.name.clone(),
            }),
            Err(e) if DatabaseError::is_unique_violation_on(&e, "feed_follows.user_id") => {
                Err(DatabaseError::AlreadyFollowing {
                    user: user.name.clone(),
                    url: feed.url.clone(),
                })
            }
            Err(e) => Err(DatabaseError::from_sqlx(e)),
        }
    }

    /// Feeds followed by the named user, oldest follow first
    pub async fn get_feed_follows_for_user(
        &self,
        user_name: &str,
    ) -> Result<Vec<FeedFollow>, DatabaseError> {
        let follows = sqlx::query_as::<_, FeedFollow>(
            r#"
            SELECT ff.id, ff.user_id, ff.feed_id, u.name AS user_name, f.name AS feed_name
            FROM feed_follows ff
            JOIN users u ON u.id = ff.user_id
            JOIN feeds f ON f.id = ff.feed_id
            WHERE u.name = ?
            ORDER BY ff.created_at, ff.rowid
        "#,
        )
        .bind(user_name)
        .fetch_all(&self.pool)
        .await?;

        Ok(follows)
    }

    /// Remove a follow. Returns whether a follow existed.
    pub async fn unfollow_feed(&self, user_id: Uuid, feed_id: Uuid) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM feed_follows WHERE user_id = ? AND feed_id = ?")
            .bind(user_id)
            .bind(feed_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
