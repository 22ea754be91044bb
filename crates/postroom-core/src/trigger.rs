//! Trigger surface for scheduled and manual invocations.
//!
//! Both the time-based and the manual trigger present a shared-secret
//! bearer credential; authorization is checked before any lease is
//! touched. Every invocation returns a structured result — callers must
//! not read "it returned" as "all items succeeded".

use std::time::Duration;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::attachment::AttachmentPipeline;
use crate::config::{AttachmentConfig, SyncConfig};
use crate::error::Result;
use crate::lease::{self, PROCESSING_ATTACHMENTS};
use crate::mail::MailSource;
use crate::queue::{Job, QueuedJob, WorkQueue};
use crate::record::RecordStore;
use crate::retry::RetryPolicy;
use crate::storage::ObjectStorage;
use crate::store::KeyValueStore;
use crate::sync::{SyncCoordinator, SyncReport};

/// Shared-secret trigger authorization.
#[derive(Debug, Clone)]
pub struct TriggerAuth {
    shared_secret: String,
}

impl TriggerAuth {
    /// Creates an authorizer for the given shared secret.
    #[must_use]
    pub fn new(shared_secret: impl Into<String>) -> Self {
        Self {
            shared_secret: shared_secret.into(),
        }
    }

    /// Verifies a presented credential, with or without a `Bearer` prefix.
    #[must_use]
    pub fn verify(&self, presented: Option<&str>) -> bool {
        let Some(token) = presented else {
            return false;
        };
        let token = token.strip_prefix("Bearer ").unwrap_or(token).trim();
        constant_time_eq(token.as_bytes(), self.shared_secret.as_bytes())
    }
}

/// Length-guarded constant-time byte comparison.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Structured trigger result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum TriggerResponse {
    /// The presented credential was rejected. No lease was touched.
    Unauthorized,
    /// Another invocation holds the relevant lease. A no-op.
    AlreadyRunning,
    /// A sync pass completed (possibly with per-message failures).
    SyncCompleted {
        /// Messages reconciled.
        processed: u32,
        /// Messages skipped.
        failed: u32,
        /// False when the record store was unreachable mid-pass.
        success: bool,
    },
    /// The work queue held no visible job.
    QueueEmpty,
    /// One queued job was processed.
    JobCompleted {
        /// Job tag.
        job: String,
        /// False for failed or partially-successful jobs (re-queued
        /// until their attempts run out).
        success: bool,
    },
    /// The invocation failed outright.
    Fatal {
        /// Failure description.
        message: String,
    },
}

/// Outcome of dispatching one queued job.
enum JobStatus {
    /// Fully done; ack the job.
    Done,
    /// Partially successful; the job should be retried as a whole.
    Partial,
}

/// Entry points invoked by the scheduler and by manual triggers.
///
/// Each instance serves one stateless invocation; coordination with
/// concurrent invocations happens only through the shared store.
pub struct TriggerService<S, Q, M, R, O> {
    auth: TriggerAuth,
    store: S,
    queue: Q,
    coordinator: SyncCoordinator<S, Q, M, R>,
    attachments: AttachmentPipeline<M, R, O>,
    settings: AttachmentConfig,
}

impl<S, Q, M, R, O> TriggerService<S, Q, M, R, O>
where
    S: KeyValueStore + Clone,
    Q: WorkQueue + Clone,
    M: MailSource + Clone,
    R: RecordStore + Clone,
    O: ObjectStorage + Clone + Send + Sync + 'static,
{
    /// Wires the service and its component pipelines.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        auth: TriggerAuth,
        store: S,
        queue: Q,
        mail: M,
        records: R,
        storage: O,
        sync_settings: SyncConfig,
        attachment_settings: AttachmentConfig,
        retry: RetryPolicy,
    ) -> Self {
        let coordinator = SyncCoordinator::new(
            store.clone(),
            queue.clone(),
            mail.clone(),
            records.clone(),
            sync_settings,
            retry,
        );
        let attachments =
            AttachmentPipeline::new(mail, records, storage, &attachment_settings, retry);
        Self {
            auth,
            store,
            queue,
            coordinator,
            attachments,
            settings: attachment_settings,
        }
    }

    /// Runs one sync pass.
    pub async fn trigger_sync(&self, token: Option<&str>, refresh: bool) -> TriggerResponse {
        if !self.auth.verify(token) {
            warn!("rejected sync trigger with bad credential");
            return TriggerResponse::Unauthorized;
        }

        match self.coordinator.run_pass(refresh).await {
            Ok(SyncReport::AlreadyRunning) => TriggerResponse::AlreadyRunning,
            Ok(SyncReport::Completed {
                processed,
                failed,
                success,
            }) => TriggerResponse::SyncCompleted {
                processed,
                failed,
                success,
            },
            Err(e) => {
                error!(error = %e, "sync pass failed");
                TriggerResponse::Fatal {
                    message: e.to_string(),
                }
            }
        }
    }

    /// Drains one queued job under the `processing_attachments` lease.
    pub async fn drain_one(&self, token: Option<&str>) -> TriggerResponse {
        if !self.auth.verify(token) {
            warn!("rejected drain trigger with bad credential");
            return TriggerResponse::Unauthorized;
        }

        let ttl = Duration::from_secs(self.settings.lease_ttl_secs);
        match lease::with_lease(&self.store, PROCESSING_ATTACHMENTS, ttl, self.drain_inner()).await
        {
            Ok(Some(response)) => response,
            Ok(None) => TriggerResponse::AlreadyRunning,
            Err(e) => {
                error!(error = %e, "failed to acquire processing lease");
                TriggerResponse::Fatal {
                    message: e.to_string(),
                }
            }
        }
    }

    async fn drain_inner(&self) -> TriggerResponse {
        let visibility = Duration::from_secs(self.settings.visibility_timeout_secs);
        let claimed = match self.queue.dequeue(visibility).await {
            Ok(Some(claimed)) => claimed,
            Ok(None) => return TriggerResponse::QueueEmpty,
            Err(e) => {
                error!(error = %e, "failed to dequeue job");
                return TriggerResponse::Fatal {
                    message: e.to_string(),
                };
            }
        };

        let kind = claimed.job.kind().to_string();
        info!(job = %kind, id = %claimed.id, attempts = claimed.attempts, "processing job");

        match self.dispatch(&claimed.job).await {
            Ok(JobStatus::Done) => {
                if let Err(e) = self.queue.ack(claimed.id).await {
                    warn!(id = %claimed.id, error = %e, "failed to ack completed job");
                }
                TriggerResponse::JobCompleted {
                    job: kind,
                    success: true,
                }
            }
            Ok(JobStatus::Partial) => {
                warn!(job = %kind, id = %claimed.id, "job partially succeeded");
                self.requeue_or_drop(&claimed).await;
                TriggerResponse::JobCompleted {
                    job: kind,
                    success: false,
                }
            }
            Err(e) => {
                error!(job = %kind, id = %claimed.id, error = %e, "job failed");
                self.requeue_or_drop(&claimed).await;
                TriggerResponse::JobCompleted {
                    job: kind,
                    success: false,
                }
            }
        }
    }

    /// Re-queues a failed job with a delay, or drops it once its
    /// delivery attempts are spent (conceptual dead letter).
    async fn requeue_or_drop(&self, claimed: &QueuedJob) {
        if claimed.attempts >= self.settings.max_attempts {
            error!(
                id = %claimed.id,
                attempts = claimed.attempts,
                "dropping job after exhausting delivery attempts"
            );
            if let Err(e) = self.queue.ack(claimed.id).await {
                warn!(id = %claimed.id, error = %e, "failed to drop exhausted job");
            }
            return;
        }

        let delay = Duration::from_secs(self.settings.retry_delay_secs);
        if let Err(e) = self.queue.retry(claimed.id, delay).await {
            warn!(id = %claimed.id, error = %e, "failed to re-queue job");
        }
    }

    async fn dispatch(&self, job: &Job) -> Result<JobStatus> {
        match job {
            Job::SyncMailbox { refresh } => {
                self.coordinator.run_pass(*refresh).await?;
                Ok(JobStatus::Done)
            }
            Job::ProcessEmail { email_id } => {
                self.coordinator.sync_single(email_id).await?;
                Ok(JobStatus::Done)
            }
            Job::ProcessAttachments {
                email_id,
                attachments,
            } => {
                let report = self.attachments.process(email_id, attachments).await?;
                if report.complete {
                    Ok(JobStatus::Done)
                } else {
                    Ok(JobStatus::Partial)
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::queue::{AttachmentRef, MemoryQueue};
    use crate::store::MemoryStore;
    use crate::testing::{MockMailSource, MockRecordStore, MockStorage, raw_mail};

    const SECRET: &str = "trigger-secret";

    struct Fixture {
        service: TriggerService<MemoryStore, MemoryQueue, MockMailSource, MockRecordStore, MockStorage>,
        store: MemoryStore,
        queue: MemoryQueue,
        mail: MockMailSource,
        records: MockRecordStore,
        storage: MockStorage,
    }

    fn fixture(mail: MockMailSource) -> Fixture {
        fixture_with(mail, AttachmentConfig::default())
    }

    fn fixture_with(mail: MockMailSource, attachment_settings: AttachmentConfig) -> Fixture {
        let store = MemoryStore::new();
        let queue = MemoryQueue::new();
        let records = MockRecordStore::new();
        let storage = MockStorage::new();
        let service = TriggerService::new(
            TriggerAuth::new(SECRET),
            store.clone(),
            queue.clone(),
            mail.clone(),
            records.clone(),
            storage.clone(),
            SyncConfig::default(),
            attachment_settings,
            RetryPolicy {
                max_retries: 2,
                base_delay: Duration::from_millis(1),
            },
        );
        Fixture {
            service,
            store,
            queue,
            mail,
            records,
            storage,
        }
    }

    fn simple_message(uid: u32, message_id: &str) -> crate::mail::RawMail {
        raw_mail(
            uid,
            &format!(
                "From: jane@example.com\r\nMessage-ID: <{message_id}>\r\n\
                 Subject: Hello\r\nContent-Type: text/plain\r\n\r\nbody\r\n"
            ),
        )
    }

    #[test]
    fn test_auth_accepts_bearer_and_bare_forms() {
        let auth = TriggerAuth::new(SECRET);
        assert!(auth.verify(Some("trigger-secret")));
        assert!(auth.verify(Some("Bearer trigger-secret")));
        assert!(!auth.verify(Some("Bearer wrong")));
        assert!(!auth.verify(Some("")));
        assert!(!auth.verify(None));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
    }

    #[tokio::test]
    async fn test_unauthorized_sync_touches_nothing() {
        let f = fixture(MockMailSource::new(vec![simple_message(1, "m1@example.com")]));

        let response = f.service.trigger_sync(Some("Bearer wrong"), false).await;

        assert_eq!(response, TriggerResponse::Unauthorized);
        assert_eq!(f.mail.fetch_calls(), 0);
        // No lease was taken either.
        assert_eq!(
            f.store.get(crate::lease::SYNC_IN_PROGRESS).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_authorized_sync_completes() {
        let f = fixture(MockMailSource::new(vec![simple_message(1, "m1@example.com")]));

        let response = f.service.trigger_sync(Some("Bearer trigger-secret"), false).await;

        assert_eq!(
            response,
            TriggerResponse::SyncCompleted {
                processed: 1,
                failed: 0,
                success: true
            }
        );
        assert_eq!(f.records.len(), 1);
    }

    #[tokio::test]
    async fn test_drain_empty_queue() {
        let f = fixture(MockMailSource::new(vec![]));
        let response = f.service.drain_one(Some(SECRET)).await;
        assert_eq!(response, TriggerResponse::QueueEmpty);
    }

    #[tokio::test]
    async fn test_drain_under_held_lease_is_noop() {
        let f = fixture(MockMailSource::new(vec![]));
        f.store
            .set_if_absent(PROCESSING_ATTACHMENTS, "other", Duration::from_secs(60))
            .await
            .unwrap();

        let response = f.service.drain_one(Some(SECRET)).await;
        assert_eq!(response, TriggerResponse::AlreadyRunning);
    }

    #[tokio::test]
    async fn test_drain_processes_process_email_job() {
        let mail = MockMailSource::new(vec![])
            .with_message("m9@example.com", simple_message(9, "m9@example.com"));
        let f = fixture(mail);
        f.queue
            .enqueue(&Job::ProcessEmail {
                email_id: "m9@example.com".to_string(),
            })
            .await
            .unwrap();

        let response = f.service.drain_one(Some(SECRET)).await;

        assert_eq!(
            response,
            TriggerResponse::JobCompleted {
                job: "process_email".to_string(),
                success: true
            }
        );
        assert!(f.records.get("m9@example.com").is_some());
        assert!(f.queue.is_empty().await);
        // Lease released after the drain.
        assert_eq!(f.store.get(PROCESSING_ATTACHMENTS).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_failed_job_requeues_until_attempts_run_out() {
        // The job targets a message the mailbox does not have.
        let f = fixture_with(
            MockMailSource::new(vec![]),
            AttachmentConfig {
                max_attempts: 2,
                retry_delay_secs: 0,
                ..AttachmentConfig::default()
            },
        );
        f.queue
            .enqueue(&Job::ProcessAttachments {
                email_id: "email-42".to_string(),
                attachments: vec![AttachmentRef {
                    filename: "invoice.pdf".to_string(),
                    content_type: "application/pdf".to_string(),
                }],
            })
            .await
            .unwrap();

        // First drain: failure, job re-queued.
        let response = f.service.drain_one(Some(SECRET)).await;
        assert_eq!(
            response,
            TriggerResponse::JobCompleted {
                job: "process_attachments".to_string(),
                success: false
            }
        );
        assert_eq!(f.queue.len().await, 1);

        // Second drain: attempts exhausted, job dropped.
        let response = f.service.drain_one(Some(SECRET)).await;
        assert_eq!(
            response,
            TriggerResponse::JobCompleted {
                job: "process_attachments".to_string(),
                success: false
            }
        );
        assert!(f.queue.is_empty().await);
        assert_eq!(f.records.writes(), 0);
        assert_eq!(f.storage.upload_count(), 0);
    }
}
