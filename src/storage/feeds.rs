use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::schema::Database;
use super::types::{to_millis, DatabaseError, Feed, FeedRow, FeedWithOwner};

const FEED_COLUMNS: &str = "id, name, url, user_id, created_at, updated_at, last_fetched_at";

impl Database {
    // ========================================================================
    // Feed Operations
    // ========================================================================

    /// Register a feed owned by `user_id`. URLs are globally unique.
    pub async fn create_feed(
        &self,
        name: &str,
        url: &str,
        user_id: Uuid,
    ) -> Result<Feed, DatabaseError> {
        let now = to_millis(Utc::now());
        let result = sqlx::query_as::<_, FeedRow>(&format!(
            r#"
            INSERT INTO feeds (id, created_at, updated_at, name, url, user_id)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING {FEED_COLUMNS}
        "#
        ))
        .bind(Uuid::new_v4())
        .bind(now)
        .bind(now)
        .bind(name)
        .bind(url)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => Ok(row.into_feed()),
            Err(e) if DatabaseError::is_unique_violation_on(&e, "feeds.url") => {
                Err(DatabaseError::FeedExists(url.to_string()))
            }
            Err(e) => Err(DatabaseError::from_sqlx(e)),
        }
    }

    pub async fn get_feed_by_url(&self, url: &str) -> Result<Feed, DatabaseError> {
        let row = sqlx::query_as::<_, FeedRow>(&format!(
            "SELECT {FEED_COLUMNS} FROM feeds WHERE url = ?"
        ))
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;

        row.map(FeedRow::into_feed)
            .ok_or_else(|| DatabaseError::FeedNotFound(url.to_string()))
    }

    /// Every registered feed, in registration order
    pub async fn get_all_feeds(&self) -> Result<Vec<Feed>, DatabaseError> {
        let rows = sqlx::query_as::<_, FeedRow>(&format!(
            "SELECT {FEED_COLUMNS} FROM feeds ORDER BY created_at, rowid"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(FeedRow::into_feed).collect())
    }

    /// Feed listing joined with the owner's name
    pub async fn get_feeds_with_owner(&self) -> Result<Vec<FeedWithOwner>, DatabaseError> {
        let feeds = sqlx::query_as::<_, FeedWithOwner>(
            r#"
            SELECT f.name, f.url, u.name AS user_name
            FROM feeds f
            JOIN users u ON u.id = f.user_id
            ORDER BY f.created_at, f.rowid
        "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(feeds)
    }

    // ========================================================================
    // Scheduling
    // ========================================================================

    /// The feed fetched longest ago. Never-fetched feeds come first; ties
    /// fall back to registration order so selection is deterministic.
    pub async fn get_next_feed_to_fetch(&self) -> Result<Option<Feed>, DatabaseError> {
        let row = sqlx::query_as::<_, FeedRow>(&format!(
            r#"
            SELECT {FEED_COLUMNS} FROM feeds
            ORDER BY last_fetched_at ASC NULLS FIRST, created_at ASC, rowid ASC
            LIMIT 1
        "#
        ))
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(FeedRow::into_feed))
    }

    /// Stamp `last_fetched_at` (and `updated_at`) for a feed
    pub async fn mark_feed_fetched(
        &self,
        feed_id: Uuid,
        fetched_at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        let ts = to_millis(fetched_at);
        let result =
            sqlx::query("UPDATE feeds SET last_fetched_at = ?, updated_at = ? WHERE id = ?")
                .bind(ts)
                .bind(ts)
                .bind(feed_id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            tracing::warn!(feed_id = %feed_id, "mark_feed_fetched matched no feed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::{Database, DatabaseError, User};
    use chrono::{DateTime, Duration, Utc};

    async fn test_db() -> (Database, User) {
        let db = Database::open(":memory:").await.unwrap();
        let user = db.create_user("owner").await.unwrap();
        (db, user)
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    #[tokio::test]
    async fn test_create_feed_and_lookup_by_url() {
        let (db, user) = test_db().await;
        let feed = db
            .create_feed("Lanes", "https://wagslane.dev/index.xml", user.id)
            .await
            .unwrap();
        assert!(feed.last_fetched_at.is_none());

        let fetched = db
            .get_feed_by_url("https://wagslane.dev/index.xml")
            .await
            .unwrap();
        assert_eq!(feed, fetched);
    }

    #[tokio::test]
    async fn test_duplicate_feed_url_rejected() {
        let (db, user) = test_db().await;
        db.create_feed("A", "https://a.example.com/rss", user.id)
            .await
            .unwrap();

        let err = db
            .create_feed("B", "https://a.example.com/rss", user.id)
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::FeedExists(_)));
    }

    #[tokio::test]
    async fn test_get_feed_by_unknown_url() {
        let (db, _) = test_db().await;
        assert!(matches!(
            db.get_feed_by_url("https://missing.example.com").await,
            Err(DatabaseError::FeedNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_feeds_with_owner() {
        let (db, user) = test_db().await;
        db.create_feed("A", "https://a.example.com/rss", user.id)
            .await
            .unwrap();

        let feeds = db.get_feeds_with_owner().await.unwrap();
        assert_eq!(feeds.len(), 1);
        assert_eq!(feeds[0].name, "A");
        assert_eq!(feeds[0].user_name, "owner");
    }

    #[tokio::test]
    async fn test_next_feed_empty_store() {
        let (db, _) = test_db().await;
        assert!(db.get_next_feed_to_fetch().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_next_feed_prefers_never_fetched() {
        let (db, user) = test_db().await;
        let a = db
            .create_feed("A", "https://a.example.com/rss", user.id)
            .await
            .unwrap();
        let b = db
            .create_feed("B", "https://b.example.com/rss", user.id)
            .await
            .unwrap();

        db.mark_feed_fetched(a.id, at(0)).await.unwrap();

        let next = db.get_next_feed_to_fetch().await.unwrap().unwrap();
        assert_eq!(next.id, b.id, "Never-fetched feed must be selected first");
    }

    #[tokio::test]
    async fn test_next_feed_picks_oldest_timestamp() {
        let (db, user) = test_db().await;
        let a = db
            .create_feed("A", "https://a.example.com/rss", user.id)
            .await
            .unwrap();
        let b = db
            .create_feed("B", "https://b.example.com/rss", user.id)
            .await
            .unwrap();
        let c = db
            .create_feed("C", "https://c.example.com/rss", user.id)
            .await
            .unwrap();

        db.mark_feed_fetched(a.id, at(30)).await.unwrap();
        db.mark_feed_fetched(b.id, at(10)).await.unwrap();
        db.mark_feed_fetched(c.id, at(20)).await.unwrap();

        let next = db.get_next_feed_to_fetch().await.unwrap().unwrap();
        assert_eq!(next.id, b.id);
    }

    #[tokio::test]
    async fn test_next_feed_ties_break_by_registration_order() {
        let (db, user) = test_db().await;
        let a = db
            .create_feed("A", "https://a.example.com/rss", user.id)
            .await
            .unwrap();
        db.create_feed("B", "https://b.example.com/rss", user.id)
            .await
            .unwrap();

        for _ in 0..3 {
            let next = db.get_next_feed_to_fetch().await.unwrap().unwrap();
            assert_eq!(next.id, a.id);
        }
    }

    #[tokio::test]
    async fn test_mark_fetched_rotates_selection() {
        let (db, user) = test_db().await;
        let a = db
            .create_feed("A", "https://a.example.com/rss", user.id)
            .await
            .unwrap();
        let b = db
            .create_feed("B", "https://b.example.com/rss", user.id)
            .await
            .unwrap();

        let start = at(0);
        let mut selected = Vec::new();
        for i in 0..4 {
            let next = db.get_next_feed_to_fetch().await.unwrap().unwrap();
            db.mark_feed_fetched(next.id, start + Duration::seconds(i))
                .await
                .unwrap();
            selected.push(next.id);
        }
        assert_eq!(selected, vec![a.id, b.id, a.id, b.id]);

        let a_after = db.get_feed_by_url(&a.url).await.unwrap();
        assert_eq!(a_after.last_fetched_at, Some(start + Duration::seconds(2)));
    }
}
