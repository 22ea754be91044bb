//! Attachment upload pipeline.
//!
//! Dequeued attachment jobs locate their message by scanning the mailbox,
//! extract each named attachment, and upload it through a bounded worker
//! pool. The record store is only written when the whole batch uploaded
//! cleanly; anything less preserves prior record state and reports partial
//! success.

use std::sync::Arc;

use postroom_mime::Message;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::AttachmentConfig;
use crate::error::{Error, Result};
use crate::mail::MailSource;
use crate::queue::AttachmentRef;
use crate::record::{RecordStore, RecordStoreError, StoredAttachment};
use crate::retry::{RetryPolicy, with_retry};
use crate::storage::ObjectStorage;

/// Per-attachment upload result.
///
/// A failed upload keeps its entry with an empty `url` and an `error`
/// field — downstream detects partial success via "has an entry with no
/// url", so failures are never silently dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadOutcome {
    /// Attachment filename.
    pub name: String,
    /// Durable URL, empty on failure.
    pub url: String,
    /// Decoded size in bytes.
    pub size: u64,
    /// MIME content type.
    pub mime_type: String,
    /// Failure description, absent on success.
    pub error: Option<String>,
}

impl UploadOutcome {
    /// True when this entry carries a usable uploaded URL.
    #[must_use]
    pub fn is_uploaded(&self) -> bool {
        self.error.is_none() && self.url.starts_with("http")
    }

    fn failure(name: String, mime_type: String, size: u64, error: String) -> Self {
        Self {
            name,
            url: String::new(),
            size,
            mime_type,
            error: Some(error),
        }
    }
}

/// Result of one attachment job.
#[derive(Debug, Clone, Serialize)]
pub struct AttachmentReport {
    /// Target external identity.
    pub email_id: String,
    /// One entry per requested attachment, in request order.
    pub entries: Vec<UploadOutcome>,
    /// True when every entry uploaded and the record store was updated.
    /// False is the partial-success signal; the record was left as-is.
    pub complete: bool,
}

/// Concurrency-bounded attachment processor.
///
/// The bound is process-local. Concurrent invocations multiply the true
/// aggregate upload concurrency, which the `processing_attachments` lease
/// keeps serialized in practice.
pub struct AttachmentPipeline<M, R, O> {
    mail: M,
    records: R,
    storage: O,
    semaphore: Arc<Semaphore>,
    retry: RetryPolicy,
}

impl<M, R, O> AttachmentPipeline<M, R, O>
where
    M: MailSource,
    R: RecordStore,
    O: ObjectStorage + Clone + Send + Sync + 'static,
{
    /// Wires a pipeline from its injected capabilities.
    pub fn new(
        mail: M,
        records: R,
        storage: O,
        settings: &AttachmentConfig,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            mail,
            records,
            storage,
            semaphore: Arc::new(Semaphore::new(settings.upload_concurrency.max(1))),
            retry,
        }
    }

    /// Processes one attachment job.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MessageNotFound`] when the mailbox scan finds no
    /// matching message (the record store stays untouched), parse errors
    /// for an unreadable message, and record-store errors when the final
    /// reconcile fails after retries. Per-attachment upload failures are
    /// recorded inline in the report instead.
    pub async fn process(
        &self,
        email_id: &str,
        attachments: &[AttachmentRef],
    ) -> Result<AttachmentReport> {
        let raw = self.mail.find_message(email_id).await?;
        let parsed = Message::parse(&raw.bytes)?;

        if attachments.is_empty() {
            // Nothing to do is a valid outcome, not an error.
            debug!(email_id, "attachment job with empty set, nothing to do");
            return Ok(AttachmentReport {
                email_id: email_id.to_string(),
                entries: Vec::new(),
                complete: true,
            });
        }

        let entries = self.upload_batch(&parsed, attachments).await?;

        let complete = entries.iter().all(UploadOutcome::is_uploaded);
        if complete {
            self.reconcile_attachments(email_id, &entries).await?;
        } else {
            // Partial success: skip the write so prior record state is
            // preserved for a later retry of the whole job.
            warn!(
                email_id,
                failed = entries.iter().filter(|e| !e.is_uploaded()).count(),
                "partial upload batch, record store write skipped"
            );
        }

        Ok(AttachmentReport {
            email_id: email_id.to_string(),
            entries,
            complete,
        })
    }

    /// Extracts and uploads each requested attachment through the bounded
    /// pool, preserving request order in the result set.
    async fn upload_batch(
        &self,
        parsed: &Message,
        attachments: &[AttachmentRef],
    ) -> Result<Vec<UploadOutcome>> {
        let mut slots: Vec<Option<UploadOutcome>> = vec![None; attachments.len()];
        let mut uploads = JoinSet::new();

        for (index, spec) in attachments.iter().enumerate() {
            let bytes = match parsed.attachment_bytes(&spec.filename) {
                Ok(Some(bytes)) => bytes,
                Ok(None) => {
                    slots[index] = Some(UploadOutcome::failure(
                        spec.filename.clone(),
                        spec.content_type.clone(),
                        0,
                        "attachment not present in message".to_string(),
                    ));
                    continue;
                }
                Err(e) => {
                    slots[index] = Some(UploadOutcome::failure(
                        spec.filename.clone(),
                        spec.content_type.clone(),
                        0,
                        e.to_string(),
                    ));
                    continue;
                }
            };

            // Admission blocks here until a pool slot frees; jobs are
            // never dropped for being over the limit.
            let permit = Arc::clone(&self.semaphore)
                .acquire_owned()
                .await
                .map_err(|e| Error::Concurrency(e.to_string()))?;
            let storage = self.storage.clone();
            let name = spec.filename.clone();
            let mime_type = spec.content_type.clone();

            uploads.spawn(async move {
                let _permit = permit;
                let size = bytes.len() as u64;
                let outcome = match storage.upload(bytes, name.clone(), mime_type.clone()).await {
                    Ok(url) => UploadOutcome {
                        name,
                        url,
                        size,
                        mime_type,
                        error: None,
                    },
                    Err(e) => UploadOutcome::failure(name, mime_type, size, e.to_string()),
                };
                (index, outcome)
            });
        }

        while let Some(joined) = uploads.join_next().await {
            let (index, outcome) = joined.map_err(|e| Error::Concurrency(e.to_string()))?;
            slots[index] = Some(outcome);
        }

        Ok(slots.into_iter().flatten().collect())
    }

    /// Writes the full uploaded set onto the tracking record.
    async fn reconcile_attachments(
        &self,
        email_id: &str,
        entries: &[UploadOutcome],
    ) -> Result<()> {
        let record = with_retry(self.retry, || self.records.find_by_email_id(email_id))
            .await?
            .ok_or_else(|| {
                Error::RecordStore(RecordStoreError::MissingData(format!(
                    "no tracking record for {email_id}"
                )))
            })?;

        let stored: Vec<StoredAttachment> = entries
            .iter()
            .map(|e| StoredAttachment {
                name: e.name.clone(),
                url: e.url.clone(),
                size: e.size,
                mime_type: e.mime_type.clone(),
            })
            .collect();

        with_retry(self.retry, || {
            self.records.set_attachments(&record.document_id, &stored)
        })
        .await?;

        info!(email_id, count = stored.len(), "attachments reconciled into record store");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::time::Duration;

    use crate::record::{EmailStatus, EmailTrackingRecord};
    use crate::testing::{MockMailSource, MockRecordStore, MockStorage, raw_mail};

    const EMAIL_ID: &str = "m7@example.com";

    fn two_attachment_message() -> crate::mail::RawMail {
        raw_mail(
            7,
            concat!(
                "From: jane@example.com\r\n",
                "Message-ID: <m7@example.com>\r\n",
                "Subject: Documents\r\n",
                "Content-Type: multipart/mixed; boundary=\"b\"\r\n",
                "\r\n",
                "--b\r\n",
                "Content-Type: text/plain\r\n",
                "\r\n",
                "both files attached\r\n",
                "--b\r\n",
                "Content-Type: application/pdf; name=\"lease.pdf\"\r\n",
                "Content-Disposition: attachment; filename=\"lease.pdf\"\r\n",
                "Content-Transfer-Encoding: base64\r\n",
                "\r\n",
                "JVBERi0xLjQK\r\n",
                "--b\r\n",
                "Content-Type: image/jpeg; name=\"photo.jpg\"\r\n",
                "Content-Disposition: attachment; filename=\"photo.jpg\"\r\n",
                "Content-Transfer-Encoding: base64\r\n",
                "\r\n",
                "/9j/4AAQSkZJRg==\r\n",
                "--b--\r\n",
            ),
        )
    }

    fn tracked_record(attachments: Vec<StoredAttachment>) -> EmailTrackingRecord {
        EmailTrackingRecord {
            document_id: "doc-7".to_string(),
            email_id: EMAIL_ID.to_string(),
            from: "Jane".to_string(),
            to: "office@property.example".to_string(),
            subject: "Documents".to_string(),
            received_date: Utc::now(),
            status: EmailStatus::NeedsAttention,
            last_response_by: None,
            last_response_date: None,
            attachments,
        }
    }

    fn refs(names: &[(&str, &str)]) -> Vec<AttachmentRef> {
        names
            .iter()
            .map(|(filename, content_type)| AttachmentRef {
                filename: (*filename).to_string(),
                content_type: (*content_type).to_string(),
            })
            .collect()
    }

    fn pipeline(
        mail: MockMailSource,
        records: MockRecordStore,
        storage: MockStorage,
        concurrency: usize,
    ) -> AttachmentPipeline<MockMailSource, MockRecordStore, MockStorage> {
        let settings = AttachmentConfig {
            upload_concurrency: concurrency,
            ..AttachmentConfig::default()
        };
        AttachmentPipeline::new(
            mail,
            records,
            storage,
            &settings,
            RetryPolicy {
                max_retries: 2,
                base_delay: Duration::from_millis(1),
            },
        )
    }

    #[tokio::test]
    async fn test_full_batch_uploads_and_reconciles() {
        let mail = MockMailSource::new(vec![]).with_message(EMAIL_ID, two_attachment_message());
        let records = MockRecordStore::new();
        records.insert(tracked_record(Vec::new()));
        let storage = MockStorage::new();
        let pipeline = pipeline(mail, records.clone(), storage.clone(), 3);

        let report = pipeline
            .process(
                EMAIL_ID,
                &refs(&[
                    ("lease.pdf", "application/pdf"),
                    ("photo.jpg", "image/jpeg"),
                ]),
            )
            .await
            .unwrap();

        assert!(report.complete);
        assert_eq!(report.entries.len(), 2);
        assert_eq!(report.entries[0].name, "lease.pdf");
        assert_eq!(report.entries[0].url, "https://files.example/lease.pdf");
        assert!(report.entries[0].size > 0);

        let stored = records.get(EMAIL_ID).unwrap().attachments;
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].name, "lease.pdf");
        assert_eq!(stored[1].name, "photo.jpg");
    }

    #[tokio::test]
    async fn test_zero_attachments_is_a_noop() {
        let mail = MockMailSource::new(vec![]).with_message(EMAIL_ID, two_attachment_message());
        let records = MockRecordStore::new();
        records.insert(tracked_record(Vec::new()));
        let storage = MockStorage::new();
        let pipeline = pipeline(mail, records.clone(), storage.clone(), 3);

        let report = pipeline.process(EMAIL_ID, &[]).await.unwrap();

        assert!(report.complete);
        assert!(report.entries.is_empty());
        assert_eq!(storage.upload_count(), 0);
        assert_eq!(records.writes(), 0);
    }

    #[tokio::test]
    async fn test_message_not_found_leaves_record_store_untouched() {
        let mail = MockMailSource::new(vec![]);
        let records = MockRecordStore::new();
        let storage = MockStorage::new();
        let pipeline = pipeline(mail, records.clone(), storage.clone(), 3);

        let result = pipeline
            .process("email-42", &refs(&[("invoice.pdf", "application/pdf")]))
            .await;

        assert!(matches!(result, Err(Error::MessageNotFound(_))));
        assert_eq!(records.writes(), 0);
        assert_eq!(storage.upload_count(), 0);
    }

    #[tokio::test]
    async fn test_partial_failure_skips_record_write_and_keeps_prior_state() {
        let mail = MockMailSource::new(vec![]).with_message(EMAIL_ID, two_attachment_message());
        let records = MockRecordStore::new();
        let prior = vec![StoredAttachment {
            name: "old.pdf".to_string(),
            url: "https://files.example/old.pdf".to_string(),
            size: 10,
            mime_type: "application/pdf".to_string(),
        }];
        records.insert(tracked_record(prior.clone()));
        let storage = MockStorage::new();
        storage.fail_for("photo.jpg");
        let pipeline = pipeline(mail, records.clone(), storage, 3);

        let report = pipeline
            .process(
                EMAIL_ID,
                &refs(&[
                    ("lease.pdf", "application/pdf"),
                    ("photo.jpg", "image/jpeg"),
                ]),
            )
            .await
            .unwrap();

        // Entry #2 is recorded with an empty url and an error, never
        // silently dropped.
        assert!(!report.complete);
        assert_eq!(report.entries.len(), 2);
        assert!(report.entries[0].is_uploaded());
        assert_eq!(report.entries[1].url, "");
        assert!(report.entries[1].error.is_some());

        // The record keeps its prior attachment state.
        assert_eq!(records.get(EMAIL_ID).unwrap().attachments, prior);
        assert_eq!(records.writes(), 0);
    }

    #[tokio::test]
    async fn test_placeholder_url_counts_as_failure() {
        let mail = MockMailSource::new(vec![]).with_message(EMAIL_ID, two_attachment_message());
        let records = MockRecordStore::new();
        records.insert(tracked_record(Vec::new()));
        let storage = MockStorage::new();
        storage.placeholder_for("lease.pdf");
        let pipeline = pipeline(mail, records.clone(), storage, 3);

        let report = pipeline
            .process(EMAIL_ID, &refs(&[("lease.pdf", "application/pdf")]))
            .await
            .unwrap();

        assert!(!report.complete);
        assert!(!report.entries[0].is_uploaded());
        assert_eq!(records.writes(), 0);
    }

    #[tokio::test]
    async fn test_missing_attachment_gets_error_entry() {
        let mail = MockMailSource::new(vec![]).with_message(EMAIL_ID, two_attachment_message());
        let records = MockRecordStore::new();
        records.insert(tracked_record(Vec::new()));
        let storage = MockStorage::new();
        let pipeline = pipeline(mail, records.clone(), storage.clone(), 3);

        let report = pipeline
            .process(EMAIL_ID, &refs(&[("absent.pdf", "application/pdf")]))
            .await
            .unwrap();

        assert!(!report.complete);
        assert_eq!(report.entries[0].url, "");
        assert!(report.entries[0].error.is_some());
        // Nothing was worth uploading.
        assert_eq!(storage.upload_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_upload_concurrency_is_bounded() {
        let mail = MockMailSource::new(vec![]).with_message(EMAIL_ID, two_attachment_message());
        let records = MockRecordStore::new();
        records.insert(tracked_record(Vec::new()));
        let storage = MockStorage::new();
        let pipeline = pipeline(mail, records, storage.clone(), 1);

        pipeline
            .process(
                EMAIL_ID,
                &refs(&[
                    ("lease.pdf", "application/pdf"),
                    ("photo.jpg", "image/jpeg"),
                ]),
            )
            .await
            .unwrap();

        assert_eq!(storage.max_concurrency(), 1);
    }
}
