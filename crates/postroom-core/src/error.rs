//! Error types for the core pipeline.

use thiserror::Error;

use crate::retry::Retryable;

/// Errors that can occur in pipeline operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Mailbox protocol operation failed.
    #[error("Mailbox error: {0}")]
    Imap(#[from] postroom_imap::Error),

    /// A message failed to parse.
    #[error("Parse error: {0}")]
    Parse(#[from] postroom_mime::Error),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Record store call failed (after any retries).
    #[error("Record store error: {0}")]
    RecordStore(#[from] crate::record::RecordStoreError),

    /// Target message absent after a full mailbox scan. Distinct from
    /// "found but zero attachments", which is a valid empty outcome.
    #[error("Message not found: {0}")]
    MessageNotFound(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal concurrency primitive failure.
    #[error("Concurrency error: {0}")]
    Concurrency(String),
}

impl Error {
    /// True when the failure is a record-store outage (transport-level or
    /// 5xx after retry exhaustion) rather than a per-message problem.
    #[must_use]
    pub fn is_record_store_outage(&self) -> bool {
        matches!(self, Self::RecordStore(e) if e.is_retryable())
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
