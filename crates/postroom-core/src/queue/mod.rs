//! Durable, at-least-once work queue.
//!
//! Dequeued jobs stay invisible for a visibility window; a consumer that
//! dies without acking lets the job reappear. Jobs are a tagged union
//! dispatched on the `type` field, never by shape-sniffing.

mod memory;
mod sqlite;

pub use memory::MemoryQueue;
pub use sqlite::SqliteQueue;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::Result;

/// Reference to one attachment inside a job body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    /// Attachment filename.
    pub filename: String,
    /// MIME content type.
    pub content_type: String,
}

/// A queued unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Job {
    /// Run a full sync pass.
    SyncMailbox {
        /// Search all messages instead of unseen only.
        refresh: bool,
    },
    /// Reconcile a single message by its external identity.
    ProcessEmail {
        /// Target external identity.
        email_id: String,
    },
    /// Upload one message's attachment set.
    ProcessAttachments {
        /// Target external identity.
        email_id: String,
        /// Attachments to extract and upload.
        attachments: Vec<AttachmentRef>,
    },
}

impl Job {
    /// Short label for logs and trigger responses.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::SyncMailbox { .. } => "sync_mailbox",
            Self::ProcessEmail { .. } => "process_email",
            Self::ProcessAttachments { .. } => "process_attachments",
        }
    }
}

/// Identifier of a queued job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(pub i64);

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A job handed to a consumer.
#[derive(Debug, Clone)]
pub struct QueuedJob {
    /// Queue identifier, used to ack or retry.
    pub id: JobId,
    /// The job body.
    pub job: Job,
    /// Delivery count including this one.
    pub attempts: u32,
}

/// Work queue capability with visibility-timeout redelivery.
pub trait WorkQueue: Send + Sync {
    /// Enqueues a job, immediately visible.
    fn enqueue(&self, job: &Job) -> impl Future<Output = Result<JobId>> + Send;

    /// Claims the oldest visible job, hiding it for the visibility window.
    ///
    /// Returns `None` when the queue holds no visible job.
    fn dequeue(
        &self,
        visibility: Duration,
    ) -> impl Future<Output = Result<Option<QueuedJob>>> + Send;

    /// Acknowledges (removes) a claimed job.
    fn ack(&self, id: JobId) -> impl Future<Output = Result<()>> + Send;

    /// Makes a claimed job visible again after the given delay.
    fn retry(&self, id: JobId, delay: Duration) -> impl Future<Output = Result<()>> + Send;
}
