//! Shared test doubles.
//!
//! These are explicit, separately-invoked doubles for test code only;
//! production fetch failures propagate as errors and never degrade to
//! sample data.

#![allow(clippy::unwrap_used)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use postroom_imap::{SearchCriteria, Uid};

use crate::error::{Error, Result};
use crate::mail::{MailSource, RawMail};
use crate::record::{
    EmailStatus, EmailTrackingRecord, NewEmailRecord, RecordResult, RecordStore,
    RecordStoreError, Responder, StoredAttachment,
};
use crate::storage::{ObjectStorage, UploadError};

/// Builds a [`RawMail`] from a UID and raw text.
#[must_use]
pub fn raw_mail(uid: u32, raw: &str) -> RawMail {
    RawMail {
        uid: Uid(uid),
        bytes: raw.as_bytes().to_vec(),
    }
}

/// Scripted mailbox double.
#[derive(Debug, Clone)]
pub struct MockMailSource {
    batch: Arc<Vec<RawMail>>,
    by_email_id: Arc<Mutex<HashMap<String, RawMail>>>,
    fetch_calls: Arc<AtomicU32>,
    fail_connect: bool,
}

impl MockMailSource {
    /// A source whose batch fetches return the given messages.
    #[must_use]
    pub fn new(batch: Vec<RawMail>) -> Self {
        Self {
            batch: Arc::new(batch),
            by_email_id: Arc::new(Mutex::new(HashMap::new())),
            fetch_calls: Arc::new(AtomicU32::new(0)),
            fail_connect: false,
        }
    }

    /// A source where every operation fails like a dead connection.
    #[must_use]
    pub fn failing() -> Self {
        let mut source = Self::new(Vec::new());
        source.fail_connect = true;
        source
    }

    /// Registers a message findable by external identity.
    #[must_use]
    pub fn with_message(self, email_id: &str, mail: RawMail) -> Self {
        self.by_email_id
            .lock()
            .unwrap()
            .insert(email_id.to_string(), mail);
        self
    }

    /// Number of mailbox operations performed.
    #[must_use]
    pub fn fetch_calls(&self) -> u32 {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    fn connection_error() -> Error {
        Error::Imap(postroom_imap::Error::Auth(
            "mock connection refused".to_string(),
        ))
    }
}

impl MailSource for MockMailSource {
    async fn fetch_batch(&self, _criteria: SearchCriteria, limit: usize) -> Result<Vec<RawMail>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect {
            return Err(Self::connection_error());
        }
        Ok(self.batch.iter().take(limit).cloned().collect())
    }

    async fn find_message(&self, email_id: &str) -> Result<RawMail> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect {
            return Err(Self::connection_error());
        }
        self.by_email_id
            .lock()
            .unwrap()
            .get(email_id)
            .cloned()
            .ok_or_else(|| Error::MessageNotFound(email_id.to_string()))
    }
}

/// In-memory record store double with scripted failures.
#[derive(Debug, Clone, Default)]
pub struct MockRecordStore {
    records: Arc<Mutex<HashMap<String, EmailTrackingRecord>>>,
    failures: Arc<Mutex<VecDeque<RecordStoreError>>>,
    creates: Arc<AtomicU32>,
    writes: Arc<AtomicU32>,
    next_id: Arc<AtomicU32>,
}

impl MockRecordStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts a failure consumed by the next store call.
    pub fn push_failure(&self, error: RecordStoreError) {
        self.failures.lock().unwrap().push_back(error);
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    /// True when no records are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Looks up a stored record directly.
    #[must_use]
    pub fn get(&self, email_id: &str) -> Option<EmailTrackingRecord> {
        self.records.lock().unwrap().get(email_id).cloned()
    }

    /// Inserts a record directly, bypassing the capability surface.
    pub fn insert(&self, record: EmailTrackingRecord) {
        self.records
            .lock()
            .unwrap()
            .insert(record.email_id.clone(), record);
    }

    /// Create calls performed through the capability surface.
    #[must_use]
    pub fn creates(&self) -> u32 {
        self.creates.load(Ordering::SeqCst)
    }

    /// Mutation calls (create + update) performed.
    #[must_use]
    pub fn writes(&self) -> u32 {
        self.writes.load(Ordering::SeqCst)
    }

    fn take_failure(&self) -> Option<RecordStoreError> {
        self.failures.lock().unwrap().pop_front()
    }
}

impl RecordStore for MockRecordStore {
    async fn find_by_email_id(&self, email_id: &str) -> RecordResult<Option<EmailTrackingRecord>> {
        if let Some(failure) = self.take_failure() {
            return Err(failure);
        }
        Ok(self.records.lock().unwrap().get(email_id).cloned())
    }

    async fn create(&self, record: &NewEmailRecord) -> RecordResult<String> {
        if let Some(failure) = self.take_failure() {
            return Err(failure);
        }
        self.creates.fetch_add(1, Ordering::SeqCst);
        self.writes.fetch_add(1, Ordering::SeqCst);

        let document_id = format!("doc-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let stored = EmailTrackingRecord {
            document_id: document_id.clone(),
            email_id: record.email_id.clone(),
            from: record.from.clone(),
            to: record.to.clone(),
            subject: record.subject.clone(),
            received_date: record.received_date,
            status: record.status,
            last_response_by: record.last_response_by,
            last_response_date: record.last_response_date,
            attachments: Vec::new(),
        };
        self.records
            .lock()
            .unwrap()
            .insert(record.email_id.clone(), stored);
        Ok(document_id)
    }

    async fn update_status(
        &self,
        document_id: &str,
        status: EmailStatus,
        last_response_by: Option<Responder>,
        last_response_date: Option<chrono::DateTime<chrono::Utc>>,
    ) -> RecordResult<()> {
        if let Some(failure) = self.take_failure() {
            return Err(failure);
        }
        self.writes.fetch_add(1, Ordering::SeqCst);

        let mut records = self.records.lock().unwrap();
        for record in records.values_mut() {
            if record.document_id == document_id {
                record.status = status;
                record.last_response_by = last_response_by;
                record.last_response_date = last_response_date;
                return Ok(());
            }
        }
        Err(RecordStoreError::MissingData(format!(
            "no record {document_id}"
        )))
    }

    async fn set_attachments(
        &self,
        document_id: &str,
        attachments: &[StoredAttachment],
    ) -> RecordResult<()> {
        if let Some(failure) = self.take_failure() {
            return Err(failure);
        }
        self.writes.fetch_add(1, Ordering::SeqCst);

        let mut records = self.records.lock().unwrap();
        for record in records.values_mut() {
            if record.document_id == document_id {
                record.attachments = attachments.to_vec();
                return Ok(());
            }
        }
        Err(RecordStoreError::MissingData(format!(
            "no record {document_id}"
        )))
    }
}

/// Object storage double recording uploads and observed concurrency.
#[derive(Debug, Clone, Default)]
pub struct MockStorage {
    uploads: Arc<Mutex<Vec<String>>>,
    fail_filenames: Arc<Mutex<Vec<String>>>,
    placeholder_filenames: Arc<Mutex<Vec<String>>>,
    active: Arc<AtomicU32>,
    max_active: Arc<AtomicU32>,
}

impl MockStorage {
    /// A storage double where every upload succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts an upload rejection for the given filename.
    pub fn fail_for(&self, filename: &str) {
        self.fail_filenames
            .lock()
            .unwrap()
            .push(filename.to_string());
    }

    /// Scripts a placeholder-URL result for the given filename.
    pub fn placeholder_for(&self, filename: &str) {
        self.placeholder_filenames
            .lock()
            .unwrap()
            .push(filename.to_string());
    }

    /// Filenames uploaded so far.
    #[must_use]
    pub fn uploaded(&self) -> Vec<String> {
        self.uploads.lock().unwrap().clone()
    }

    /// Number of upload calls that reached storage.
    #[must_use]
    pub fn upload_count(&self) -> usize {
        self.uploads.lock().unwrap().len()
    }

    /// Highest number of uploads observed in flight at once.
    #[must_use]
    pub fn max_concurrency(&self) -> u32 {
        self.max_active.load(Ordering::SeqCst)
    }
}

impl ObjectStorage for MockStorage {
    async fn upload(
        &self,
        _bytes: Vec<u8>,
        filename: String,
        _content_type: String,
    ) -> std::result::Result<String, UploadError> {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        self.active.fetch_sub(1, Ordering::SeqCst);

        self.uploads.lock().unwrap().push(filename.clone());

        if self.fail_filenames.lock().unwrap().contains(&filename) {
            return Err(UploadError::Rejected(503));
        }
        if self
            .placeholder_filenames
            .lock()
            .unwrap()
            .contains(&filename)
        {
            return Err(UploadError::PlaceholderUrl(format!(
                "https://placeholder.example/{filename}"
            )));
        }
        Ok(format!("https://files.example/{filename}"))
    }
}
