use chrono::Utc;
use uuid::Uuid;

use super::schema::Database;
use super::types::{to_millis, DatabaseError, User, UserRow};

impl Database {
    // ========================================================================
    // User Operations
    // ========================================================================

    /// Create a user. Names are unique.
    pub async fn create_user(&self, name: &str) -> Result<User, DatabaseError> {
        let now = to_millis(Utc::now());
        let result = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (id, created_at, updated_at, name)
            VALUES (?, ?, ?, ?)
            RETURNING id, name, created_at, updated_at
        "#,
        )
        .bind(Uuid::new_v4())
        .bind(now)
        .bind(now)
        .bind(name)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => Ok(row.into_user()),
            Err(e) if DatabaseError::is_unique_violation_on(&e, "users.name") => {
                Err(DatabaseError::UserExists(name.to_string()))
            }
            Err(e) => Err(DatabaseError::from_sqlx(e)),
        }
    }

    /// Look up a user by name
    pub async fn get_user_by_name(&self, name: &str) -> Result<User, DatabaseError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, name, created_at, updated_at FROM users WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.map(UserRow::into_user)
            .ok_or_else(|| DatabaseError::UserNotFound(name.to_string()))
    }

    /// All users ordered by name
    pub async fn get_users(&self) -> Result<Vec<User>, DatabaseError> {
        let rows = sqlx::query_as::<_, UserRow>(
            "SELECT id, name, created_at, updated_at FROM users ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(UserRow::into_user).collect())
    }

    /// Delete every user. Feeds, follows and posts go with them (ON DELETE CASCADE).
    pub async fn reset_users(&self) -> Result<u64, DatabaseError> {
        let result = sqlx::query("DELETE FROM users")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
