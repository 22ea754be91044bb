//! Record store models and capability trait.
//!
//! The record store is the sole source of truth for "has this message been
//! seen before". It is an opaque GraphQL content API with query-by-field
//! and create/update mutations; this module only knows the fields the
//! pipeline reads and writes.

mod graphql;

pub use graphql::GraphqlRecordStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::retry::Retryable;

/// Tracking status of an email record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EmailStatus {
    /// Awaiting a human response.
    NeedsAttention,
    /// No response required.
    Informational,
    /// A response has been sent.
    Responded,
}

impl EmailStatus {
    /// Wire value used by the record store.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NeedsAttention => "needsAttention",
            Self::Informational => "informational",
            Self::Responded => "responded",
        }
    }
}

/// Who responded last on a tracked thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Responder {
    /// The tenant/client side.
    Client,
    /// The property-management side.
    Admin,
}

/// A durably stored attachment reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredAttachment {
    /// Attachment filename.
    pub name: String,
    /// Durable object-storage URL.
    pub url: String,
    /// Size in bytes.
    pub size: u64,
    /// MIME content type.
    pub mime_type: String,
}

/// The durable record-store entity for one tracked email.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailTrackingRecord {
    /// Record-store primary key.
    pub document_id: String,
    /// Externally stable identity (mailbox UID or Message-ID).
    pub email_id: String,
    /// Sender display text.
    pub from: String,
    /// Recipient display text.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// When the message was received.
    pub received_date: DateTime<Utc>,
    /// Tracking status.
    pub status: EmailStatus,
    /// Who responded last, if anyone.
    #[serde(default)]
    pub last_response_by: Option<Responder>,
    /// When the last response happened.
    #[serde(default)]
    pub last_response_date: Option<DateTime<Utc>>,
    /// Uploaded attachment references, in upload order.
    #[serde(default)]
    pub attachments: Vec<StoredAttachment>,
}

/// Payload for creating a new tracking record.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEmailRecord {
    /// Externally stable identity.
    pub email_id: String,
    /// Sender display text.
    pub from: String,
    /// Recipient display text.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// When the message was received.
    pub received_date: DateTime<Utc>,
    /// Initial tracking status.
    pub status: EmailStatus,
    /// Seeded responder for replies.
    pub last_response_by: Option<Responder>,
    /// Seeded response date for replies.
    pub last_response_date: Option<DateTime<Utc>>,
}

/// Errors from the record store.
#[derive(Debug, thiserror::Error)]
pub enum RecordStoreError {
    /// The request never produced a response (connection reset, DNS
    /// failure, timeout).
    #[error("record store unreachable: {0}")]
    Transport(String),

    /// The store answered with a non-success HTTP status.
    #[error("record store returned HTTP {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body excerpt.
        message: String,
    },

    /// The store rejected the operation at the GraphQL level (validation
    /// or schema errors). Not transient; never retried.
    #[error("record store rejected request: {0:?}")]
    GraphQl(Vec<String>),

    /// A success response was missing the expected data shape.
    #[error("record store response missing expected data: {0}")]
    MissingData(String),
}

impl Retryable for RecordStoreError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => *status == 404 || (500..600).contains(status),
            Self::GraphQl(_) | Self::MissingData(_) => false,
        }
    }
}

/// Result type for record store operations.
pub type RecordResult<T> = std::result::Result<T, RecordStoreError>;

/// Record store capability.
pub trait RecordStore: Send + Sync {
    /// Looks up a record by its external identity.
    fn find_by_email_id(
        &self,
        email_id: &str,
    ) -> impl Future<Output = RecordResult<Option<EmailTrackingRecord>>> + Send;

    /// Creates a record and returns its `documentId`.
    fn create(
        &self,
        record: &NewEmailRecord,
    ) -> impl Future<Output = RecordResult<String>> + Send;

    /// Updates the status fields of an existing record.
    fn update_status(
        &self,
        document_id: &str,
        status: EmailStatus,
        last_response_by: Option<Responder>,
        last_response_date: Option<DateTime<Utc>>,
    ) -> impl Future<Output = RecordResult<()>> + Send;

    /// Replaces the attachments list of an existing record.
    fn set_attachments(
        &self,
        document_id: &str,
        attachments: &[StoredAttachment],
    ) -> impl Future<Output = RecordResult<()>> + Send;
}
