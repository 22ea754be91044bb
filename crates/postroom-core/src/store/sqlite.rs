//! SQLite-backed store for durable cross-invocation state.

use std::time::Duration;

use chrono::Utc;
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use super::KeyValueStore;
use crate::Result;

/// SQLite-backed [`KeyValueStore`] implementation.
///
/// Expiry is stored as an RFC 3339 timestamp; expired rows are treated as
/// absent and purged lazily on access.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (and if necessary creates) the store at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema
    /// creation fails.
    pub async fn new(database_path: &str) -> Result<Self> {
        let url = format!("sqlite:{database_path}?mode=rwc");
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let store = Self { pool };
        store.initialize().await?;
        Ok(store)
    }

    /// Creates an in-memory store for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema
    /// creation fails.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { pool };
        store.initialize().await?;
        Ok(store)
    }

    /// Builds a store sharing an existing pool.
    #[must_use]
    pub const fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Returns the underlying pool, for components sharing the database.
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS cache_entries (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                expires_at TEXT
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn expiry_string(ttl: Duration) -> String {
        (Utc::now() + ttl).to_rfc3339()
    }
}

impl KeyValueStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = Utc::now().to_rfc3339();

        // Purge lazily so expired leases don't linger as rows.
        sqlx::query(r"DELETE FROM cache_entries WHERE expires_at IS NOT NULL AND expires_at <= ?")
            .bind(&now)
            .execute(&self.pool)
            .await?;

        let row = sqlx::query(r"SELECT value FROM cache_entries WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| r.get("value")))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO cache_entries (key, value, expires_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                expires_at = excluded.expires_at
            ",
        )
        .bind(key)
        .bind(value)
        .bind(ttl.map(Self::expiry_string))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let now = Utc::now().to_rfc3339();

        // The conflict arm only fires when the existing row has expired,
        // which makes acquire-if-absent a single atomic statement.
        let result = sqlx::query(
            r"
            INSERT INTO cache_entries (key, value, expires_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                expires_at = excluded.expires_at
            WHERE cache_entries.expires_at IS NOT NULL
              AND cache_entries.expires_at <= ?
            ",
        )
        .bind(key)
        .bind(value)
        .bind(Self::expiry_string(ttl))
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn del(&self, key: &str) -> Result<()> {
        sqlx::query(r"DELETE FROM cache_entries WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
