//! SQLite persistence for users, feeds, follows and posts.
//!
//! [`Database`] owns the connection pool and exposes one `impl` block per
//! table. The aggregator only sees it through the [`FeedStore`] trait.

mod feeds;
mod follows;
mod posts;
mod schema;
mod store;
mod types;
mod users;

pub use schema::Database;
pub use store::FeedStore;
pub use types::{DatabaseError, Feed, FeedFollow, FeedWithOwner, NewPost, Post, User};
