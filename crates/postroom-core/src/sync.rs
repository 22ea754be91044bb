//! Sync coordinator: one full mailbox synchronization pass.
//!
//! A pass moves through lock acquisition, fetching, reconciling, and lock
//! release. Concurrent invocations are expected in a serverless
//! environment; the second one short-circuits on the held lease and
//! reports "already in progress" without touching the mailbox.

use std::time::Duration;

use chrono::Utc;
use postroom_imap::SearchCriteria;
use postroom_mime::Message;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::SyncConfig;
use crate::error::Result;
use crate::lease::{self, LAST_SYNC_TIMESTAMP, SYNC_IN_PROGRESS};
use crate::mail::MailSource;
use crate::message::MailboxMessage;
use crate::queue::{AttachmentRef, Job, WorkQueue};
use crate::record::{EmailStatus, NewEmailRecord, RecordStore, Responder};
use crate::retry::{RetryPolicy, with_retry};
use crate::store::KeyValueStore;

/// Structured result of a sync pass.
///
/// Callers must not treat "the call returned" as "all items succeeded":
/// a completed pass can carry per-message failures, and `success` is
/// false when the record store was unreachable mid-pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncReport {
    /// Another invocation holds the sync lease. A no-op, not an error.
    AlreadyRunning,
    /// The pass ran to completion.
    Completed {
        /// Messages reconciled into the record store.
        processed: u32,
        /// Messages skipped over parse or reconciliation failures.
        failed: u32,
        /// False when a record-store outage cut the pass short.
        success: bool,
    },
}

/// Orchestrates sync passes against the mailbox and record store.
pub struct SyncCoordinator<S, Q, M, R> {
    store: S,
    queue: Q,
    mail: M,
    records: R,
    settings: SyncConfig,
    retry: RetryPolicy,
}

impl<S, Q, M, R> SyncCoordinator<S, Q, M, R>
where
    S: KeyValueStore,
    Q: WorkQueue,
    M: MailSource,
    R: RecordStore,
{
    /// Wires a coordinator from its injected capabilities.
    pub const fn new(
        store: S,
        queue: Q,
        mail: M,
        records: R,
        settings: SyncConfig,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            queue,
            mail,
            records,
            settings,
            retry,
        }
    }

    /// Runs one sync pass under the `sync_in_progress` lease.
    ///
    /// The lease is released on every exit path, including fetch and
    /// reconciliation failures; only a crash leaves it to TTL expiry.
    ///
    /// # Errors
    ///
    /// Returns an error for failures that abort the pass (mailbox
    /// connection loss, fetch timeout); per-message failures are counted
    /// in the report instead.
    pub async fn run_pass(&self, refresh: bool) -> Result<SyncReport> {
        let ttl = Duration::from_secs(self.settings.lease_ttl_secs);
        let outcome = lease::with_lease(
            &self.store,
            SYNC_IN_PROGRESS,
            ttl,
            self.pass_inner(refresh),
        )
        .await?;

        match outcome {
            None => Ok(SyncReport::AlreadyRunning),
            Some(result) => result,
        }
    }

    /// Fetches and reconciles a single message by external identity.
    ///
    /// Used by `process_email` jobs; shares the reconcile path with full
    /// passes.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::MessageNotFound`] when the mailbox holds
    /// no such message, parse and record-store errors otherwise.
    pub async fn sync_single(&self, email_id: &str) -> Result<()> {
        let raw = self.mail.find_message(email_id).await?;
        let parsed = Message::parse(&raw.bytes)?;
        let message = MailboxMessage::from_parsed(raw.uid, &parsed, self.settings.preview_chars);
        self.reconcile(&message).await?;
        Ok(())
    }

    async fn pass_inner(&self, refresh: bool) -> Result<SyncReport> {
        let criteria = if refresh {
            SearchCriteria::All
        } else {
            SearchCriteria::Unseen
        };
        info!(criteria = criteria.as_imap(), "starting sync pass");

        let raw_messages = self
            .mail
            .fetch_batch(criteria, self.settings.batch_size)
            .await?;

        let mut failed: u32 = 0;
        let mut messages = Vec::with_capacity(raw_messages.len());
        for raw in raw_messages {
            match Message::parse(&raw.bytes) {
                Ok(parsed) => messages.push(MailboxMessage::from_parsed(
                    raw.uid,
                    &parsed,
                    self.settings.preview_chars,
                )),
                Err(e) => {
                    warn!(uid = %raw.uid, error = %e, "skipping malformed message");
                    failed += 1;
                }
            }
        }

        // Server search order carries no meaning; present newest first.
        messages.sort_by(|a, b| b.received_at.cmp(&a.received_at));

        let mut processed: u32 = 0;
        let mut store_outage = false;
        let total = messages.len();
        for (index, message) in messages.iter().enumerate() {
            match self.reconcile(message).await {
                Ok(_) => processed += 1,
                Err(e) if e.is_record_store_outage() => {
                    // The store is down; the remaining messages cannot
                    // reconcile either. They stay unseen for next pass.
                    error!(error = %e, "record store unreachable, aborting reconciliation");
                    failed += u32::try_from(total - index).unwrap_or(u32::MAX);
                    store_outage = true;
                    break;
                }
                Err(e) => {
                    warn!(email_id = %message.email_id(), error = %e, "failed to reconcile message");
                    failed += 1;
                }
            }
        }

        if let Err(e) = self
            .store
            .set(LAST_SYNC_TIMESTAMP, &Utc::now().to_rfc3339(), None)
            .await
        {
            warn!(error = %e, "failed to record sync timestamp");
        }

        info!(processed, failed, "sync pass finished");
        Ok(SyncReport::Completed {
            processed,
            failed,
            success: !store_outage,
        })
    }

    /// Reconciles one message against the record store and enqueues its
    /// attachment work. Returns true when a record was created.
    async fn reconcile(&self, message: &MailboxMessage) -> Result<bool> {
        let email_id = message.email_id();

        let existing = with_retry(self.retry, || self.records.find_by_email_id(&email_id)).await?;
        if existing.is_some() {
            debug!(email_id, "message already tracked");
            return Ok(false);
        }

        // Check-then-create is not atomic against the record store: if
        // the lease is bypassed or expires mid-pass, concurrent passes
        // can race and create duplicate records for the same email_id.
        let is_reply = message.is_reply();
        let record = NewEmailRecord {
            email_id: email_id.clone(),
            from: message.from.clone(),
            to: message.to.clone(),
            subject: message.subject.clone(),
            received_date: message.received_at,
            status: EmailStatus::NeedsAttention,
            last_response_by: is_reply.then_some(Responder::Client),
            last_response_date: is_reply.then_some(message.received_at),
        };
        let document_id = with_retry(self.retry, || self.records.create(&record)).await?;
        info!(email_id, document_id, is_reply, "created tracking record");

        if !message.attachments.is_empty() {
            let job = Job::ProcessAttachments {
                email_id: email_id.clone(),
                attachments: message
                    .attachments
                    .iter()
                    .map(|a| AttachmentRef {
                        filename: a.filename.clone(),
                        content_type: a.content_type.clone(),
                    })
                    .collect(),
            };
            self.queue.enqueue(&job).await?;
            debug!(email_id, count = message.attachments.len(), "enqueued attachment job");
        }

        Ok(true)
    }
}
