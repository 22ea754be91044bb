//! # postroom-core
//!
//! Core pipeline logic for the postroom email ingestion service.
//!
//! This crate provides:
//! - Sync coordination (leased mailbox passes, idempotent reconciliation)
//! - The attachment upload pipeline (bounded concurrency, partial-failure
//!   accounting)
//! - Lock/cache and work-queue abstractions with in-memory and SQLite
//!   backings
//! - Retry with linear backoff for record-store calls
//! - Record store (GraphQL) and object storage clients
//! - The authorized trigger surface for scheduled and manual invocations
//!
//! Components receive their collaborators explicitly; there is no ambient
//! global state. Cross-invocation coordination happens only through the
//! shared key-value store's leases.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod attachment;
pub mod config;
mod error;
pub mod lease;
pub mod mail;
pub mod message;
pub mod queue;
pub mod record;
pub mod retry;
pub mod storage;
pub mod store;
pub mod sync;
pub mod trigger;

#[cfg(test)]
pub(crate) mod testing;

pub use attachment::{AttachmentPipeline, AttachmentReport, UploadOutcome};
pub use config::{
    AttachmentConfig, MailboxConfig, PipelineConfig, RecordStoreConfig, StorageConfig,
    SyncConfig, TriggerConfig,
};
pub use error::{Error, Result};
pub use mail::{ImapMailSource, MailSource, RawMail};
pub use message::{AttachmentDescriptor, MailboxMessage};
pub use queue::{AttachmentRef, Job, JobId, MemoryQueue, QueuedJob, SqliteQueue, WorkQueue};
pub use record::{
    EmailStatus, EmailTrackingRecord, GraphqlRecordStore, NewEmailRecord, RecordStore,
    RecordStoreError, Responder, StoredAttachment,
};
pub use retry::{RetryPolicy, Retryable, with_retry};
pub use storage::{HttpObjectStorage, ObjectStorage, UploadError, is_valid_upload_url};
pub use store::{KeyValueStore, MemoryStore, SqliteStore};
pub use sync::{SyncCoordinator, SyncReport};
pub use trigger::{TriggerAuth, TriggerResponse, TriggerService};
