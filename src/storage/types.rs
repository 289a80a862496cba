use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process holds the write lock on the database file
    #[error("Database is locked by another gator process. Please close it and try again.")]
    Locked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// A post with this link is already stored. Expected during ingestion.
    #[error("Post with url {url} already exists")]
    DuplicatePost { url: String },

    #[error("User {0} already exists")]
    UserExists(String),

    #[error("User {0} does not exist")]
    UserNotFound(String),

    #[error("No feed registered with url {0}")]
    FeedNotFound(String),

    #[error("Feed with url {0} is already registered")]
    FeedExists(String),

    #[error("User {user} already follows {url}")]
    AlreadyFollowing { user: String, url: String },

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Classify a sqlx error, detecting lock contention on the database file
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5) / SQLITE_LOCKED (6)
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
        {
            return DatabaseError::Locked;
        }

        DatabaseError::Other(err)
    }

    /// True when the insert failed on the UNIQUE constraint of `column`
    /// (e.g. `posts.url`).
    pub(crate) fn is_unique_violation_on(err: &sqlx::Error, column: &str) -> bool {
        match err {
            sqlx::Error::Database(db_err) => {
                db_err.is_unique_violation() && db_err.message().contains(column)
            }
            _ => false,
        }
    }
}

// ============================================================================
// Timestamp Conversion
// ============================================================================

/// Timestamps are persisted as INTEGER Unix milliseconds.
pub(crate) fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

// ============================================================================
// Row Types
// ============================================================================

/// Internal row type for user queries, converted via `into_user()`
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct UserRow {
    pub id: Uuid,
    pub name: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl UserRow {
    pub(crate) fn into_user(self) -> User {
        User {
            id: self.id,
            name: self.name,
            created_at: from_millis(self.created_at),
            updated_at: from_millis(self.updated_at),
        }
    }
}

/// Internal row type for feed queries, converted via `into_feed()`
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct FeedRow {
    pub id: Uuid,
    pub name: String,
    pub url: String,
    pub user_id: Uuid,
    pub created_at: i64,
    pub updated_at: i64,
    pub last_fetched_at: Option<i64>,
}

impl FeedRow {
    pub(crate) fn into_feed(self) -> Feed {
        Feed {
            id: self.id,
            name: self.name,
            url: self.url,
            user_id: self.user_id,
            created_at: from_millis(self.created_at),
            updated_at: from_millis(self.updated_at),
            last_fetched_at: self.last_fetched_at.map(from_millis),
        }
    }
}

/// Internal row type for post queries, converted via `into_post()`
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PostRow {
    pub id: Uuid,
    pub title: String,
    pub url: String,
    pub description: String,
    pub published_at: i64,
    pub feed_id: Uuid,
    pub created_at: i64,
    pub updated_at: i64,
}

impl PostRow {
    pub(crate) fn into_post(self) -> Post {
        Post {
            id: self.id,
            title: self.title,
            url: self.url,
            description: self.description,
            published_at: from_millis(self.published_at),
            feed_id: self.feed_id,
            created_at: from_millis(self.created_at),
            updated_at: from_millis(self.updated_at),
        }
    }
}

// ============================================================================
// Data Structures
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A registered RSS source.
///
/// `last_fetched_at` is `None` until the aggregator first selects the feed,
/// and is only ever written by the aggregator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feed {
    pub id: Uuid,
    pub name: String,
    pub url: String,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_fetched_at: Option<DateTime<Utc>>,
}

/// Feed listing row joined with the owning user's name
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FeedWithOwner {
    pub name: String,
    pub url: String,
    pub user_name: String,
}

/// A follow relation, with the names needed to report it
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FeedFollow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub feed_id: Uuid,
    pub user_name: String,
    pub feed_name: String,
}

/// A single ingested item. Immutable once stored.
///
/// `published_at` is the Unix epoch when the source date could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub id: Uuid,
    pub title: String,
    pub url: String,
    pub description: String,
    pub published_at: DateTime<Utc>,
    pub feed_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert parameters for [`Post`]
#[derive(Debug, Clone)]
pub struct NewPost {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub title: String,
    pub url: String,
    pub description: String,
    pub published_at: DateTime<Utc>,
    pub feed_id: Uuid,
}
