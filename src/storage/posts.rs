use uuid::Uuid;

use super::schema::Database;
use super::types::{to_millis, DatabaseError, NewPost, Post, PostRow};

/// Upper bound for a single browse query
const MAX_POSTS: i64 = 1000;

impl Database {
    // ========================================================================
    // Post Operations
    // ========================================================================

    /// Insert a post.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::DuplicatePost` when a post with the same link
    /// is already stored. The store is left unchanged in that case.
    pub async fn create_post(&self, post: &NewPost) -> Result<Post, DatabaseError> {
        let result = sqlx::query_as::<_, PostRow>(
            r#"
            INSERT INTO posts (id, created_at, updated_at, title, url, description, published_at, feed_id)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id, title, url, description, published_at, feed_id, created_at, updated_at
        "#,
        )
        .bind(post.id)
        .bind(to_millis(post.created_at))
        .bind(to_millis(post.updated_at))
        .bind(&post.title)
        .bind(&post.url)
        .bind(&post.description)
        .bind(to_millis(post.published_at))
        .bind(post.feed_id)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => Ok(row.into_post()),
            Err(e) if DatabaseError::is_unique_violation_on(&e, "posts.url") => {
                Err(DatabaseError::DuplicatePost {
                    url: post.url.clone(),
                })
            }
            Err(e) => Err(DatabaseError::from_sqlx(e)),
        }
    }

    /// Newest posts (by published date) from the feeds a user follows
    pub async fn get_posts_for_user(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Post>, DatabaseError> {
        let rows = sqlx::query_as::<_, PostRow>(
            r#"
            SELECT p.id, p.title, p.url, p.description, p.published_at, p.feed_id,
                   p.created_at, p.updated_at
            FROM posts p
            JOIN feed_follows ff ON ff.feed_id = p.feed_id
            WHERE ff.user_id = ?
            ORDER BY p.published_at DESC, p.created_at DESC
            LIMIT ?
        "#,
        )
        .bind(user_id)
        .bind(limit.clamp(0, MAX_POSTS))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(PostRow::into_post).collect())
    }

    /// Posts of one feed, in insertion order
    pub async fn get_posts_for_feed(&self, feed_id: Uuid) -> Result<Vec<Post>, DatabaseError> {
        let rows = sqlx::query_as::<_, PostRow>(
            r#"
            SELECT id, title, url, description, published_at, feed_id, created_at, updated_at
            FROM posts
            WHERE feed_id = ?
            ORDER BY rowid
        "#,
        )
        .bind(feed_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(PostRow::into_post).collect())
    }

    pub async fn count_posts(&self) -> Result<i64, DatabaseError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM posts")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
