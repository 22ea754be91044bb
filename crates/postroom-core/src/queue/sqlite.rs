//! SQLite-backed durable queue.

use std::time::Duration;

use chrono::Utc;
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use super::{Job, JobId, QueuedJob, WorkQueue};
use crate::Result;

/// SQLite-backed [`WorkQueue`] implementation.
///
/// Claiming a job is one atomic UPDATE..RETURNING statement, so two
/// consumers racing on the same database cannot both claim it inside the
/// visibility window.
#[derive(Debug, Clone)]
pub struct SqliteQueue {
    pool: SqlitePool,
}

impl SqliteQueue {
    /// Opens (and if necessary creates) the queue at the given path.
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

        let queue = Self { pool };
        queue.initialize().await?;
        Ok(queue)
    }

    /// Creates an in-memory queue for testing.
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

        let queue = Self { pool };
        queue.initialize().await?;
        Ok(queue)
    }

    /// Builds a queue sharing an existing pool.
    ///
    /// # Errors
    ///
    /// Returns an error if schema creation fails.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        let queue = Self { pool };
        queue.initialize().await?;
        Ok(queue)
    }

    async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS jobs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                body TEXT NOT NULL,
                attempts INTEGER NOT NULL DEFAULT 0,
                visible_at TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"CREATE INDEX IF NOT EXISTS idx_jobs_visible ON jobs(visible_at, id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

impl WorkQueue for SqliteQueue {
    async fn enqueue(&self, job: &Job) -> Result<JobId> {
        let body = serde_json::to_string(job)?;
        let now = Utc::now().to_rfc3339();

        let row = sqlx::query(
            r"
            INSERT INTO jobs (body, attempts, visible_at, created_at)
            VALUES (?, 0, ?, ?)
            RETURNING id
            ",
        )
        .bind(&body)
        .bind(&now)
        .bind(&now)
        .fetch_one(&self.pool)
        .await?;

        Ok(JobId(row.get("id")))
    }

    async fn dequeue(&self, visibility: Duration) -> Result<Option<QueuedJob>> {
        let now = Utc::now().to_rfc3339();
        let hidden_until = (Utc::now() + visibility).to_rfc3339();

        let row = sqlx::query(
            r"
            UPDATE jobs
            SET attempts = attempts + 1, visible_at = ?
            WHERE id = (
                SELECT id FROM jobs WHERE visible_at <= ? ORDER BY id LIMIT 1
            )
            RETURNING id, body, attempts
            ",
        )
        .bind(&hidden_until)
        .bind(&now)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let body: String = row.get("body");
        let job: Job = serde_json::from_str(&body)?;

        Ok(Some(QueuedJob {
            id: JobId(row.get("id")),
            job,
            attempts: u32::try_from(row.get::<i64, _>("attempts")).unwrap_or(u32::MAX),
        }))
    }

    async fn ack(&self, id: JobId) -> Result<()> {
        sqlx::query(r"DELETE FROM jobs WHERE id = ?")
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn retry(&self, id: JobId, delay: Duration) -> Result<()> {
        let visible_at = (Utc::now() + delay).to_rfc3339();
        sqlx::query(r"UPDATE jobs SET visible_at = ? WHERE id = ?")
            .bind(&visible_at)
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
