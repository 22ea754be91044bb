//! Pipeline configuration.
//!
//! Every component receives its settings explicitly; there is no ambient
//! global configuration. The binary deserializes one `PipelineConfig` from
//! a JSON file and wires the components from it.

use std::time::Duration;

use serde::Deserialize;

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Mailbox connection settings.
    pub mailbox: MailboxConfig,
    /// Record store (GraphQL content API) settings.
    pub record_store: RecordStoreConfig,
    /// Object storage upload settings.
    pub storage: StorageConfig,
    /// Trigger authorization settings.
    pub trigger: TriggerConfig,
    /// Sync pass settings.
    #[serde(default)]
    pub sync: SyncConfig,
    /// Attachment pipeline settings.
    #[serde(default)]
    pub attachments: AttachmentConfig,
    /// Path of the SQLite database backing the cache and work queue.
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

/// Mailbox connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct MailboxConfig {
    /// IMAP server hostname.
    pub host: String,
    /// IMAP server port.
    #[serde(default = "default_imap_port")]
    pub port: u16,
    /// Login username.
    pub username: String,
    /// Login password.
    pub password: String,
    /// Folder to synchronize.
    #[serde(default = "default_folder")]
    pub folder: String,
    /// TCP + TLS connection timeout in seconds.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Authentication timeout in seconds.
    #[serde(default = "default_connect_timeout_secs")]
    pub auth_timeout_secs: u64,
    /// Global deadline for a bulk sync fetch in seconds.
    #[serde(default = "default_bulk_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    /// Deadline for a single-message fetch in seconds.
    #[serde(default = "default_single_fetch_timeout_secs")]
    pub single_fetch_timeout_secs: u64,
    /// Deadline for a full mailbox scan while locating one message.
    #[serde(default = "default_scan_timeout_secs")]
    pub scan_timeout_secs: u64,
}

impl MailboxConfig {
    /// Builds the protocol-level connection config.
    #[must_use]
    pub fn to_imap_config(&self) -> postroom_imap::Config {
        postroom_imap::Config::builder(self.host.clone())
            .port(self.port)
            .connect_timeout(Duration::from_secs(self.connect_timeout_secs))
            .auth_timeout(Duration::from_secs(self.auth_timeout_secs))
            .build()
    }

    /// Builds the login credentials.
    #[must_use]
    pub fn credentials(&self) -> postroom_imap::Credentials {
        postroom_imap::Credentials {
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }
}

/// Record store settings.
#[derive(Debug, Clone, Deserialize)]
pub struct RecordStoreConfig {
    /// GraphQL endpoint URL.
    pub endpoint: String,
    /// Bearer token for the content API.
    pub api_token: String,
}

/// Object storage settings.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Upload endpoint URL.
    pub endpoint: String,
    /// Bearer token for the upload API.
    pub api_token: String,
    /// Domains whose URLs mark a synthetic (non-durable) upload result.
    #[serde(default = "default_placeholder_domains")]
    pub placeholder_domains: Vec<String>,
}

/// Trigger surface settings.
#[derive(Debug, Clone, Deserialize)]
pub struct TriggerConfig {
    /// Shared secret for time-based and manual invocations.
    pub shared_secret: String,
}

/// Sync pass settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Hard cap on messages processed per pass.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// TTL of the `sync_in_progress` lease in seconds.
    #[serde(default = "default_lease_ttl_secs")]
    pub lease_ttl_secs: u64,
    /// Body preview length stored on tracking records.
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            lease_ttl_secs: default_lease_ttl_secs(),
            preview_chars: default_preview_chars(),
        }
    }
}

/// Attachment pipeline settings.
#[derive(Debug, Clone, Deserialize)]
pub struct AttachmentConfig {
    /// Maximum concurrent uploads. The upload target enforces per-account
    /// concurrency limits; exceeding them yields rejections, not
    /// throttling.
    #[serde(default = "default_upload_concurrency")]
    pub upload_concurrency: usize,
    /// TTL of the `processing_attachments` lease in seconds.
    #[serde(default = "default_lease_ttl_secs")]
    pub lease_ttl_secs: u64,
    /// Queue visibility timeout in seconds.
    #[serde(default = "default_visibility_timeout_secs")]
    pub visibility_timeout_secs: u64,
    /// Delivery attempts before a job is dropped.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before a failed job becomes visible again, in seconds.
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
}

impl Default for AttachmentConfig {
    fn default() -> Self {
        Self {
            upload_concurrency: default_upload_concurrency(),
            lease_ttl_secs: default_lease_ttl_secs(),
            visibility_timeout_secs: default_visibility_timeout_secs(),
            max_attempts: default_max_attempts(),
            retry_delay_secs: default_retry_delay_secs(),
        }
    }
}

const fn default_imap_port() -> u16 {
    993
}

fn default_folder() -> String {
    "INBOX".to_string()
}

const fn default_connect_timeout_secs() -> u64 {
    10
}

const fn default_bulk_fetch_timeout_secs() -> u64 {
    60
}

const fn default_single_fetch_timeout_secs() -> u64 {
    15
}

const fn default_scan_timeout_secs() -> u64 {
    120
}

fn default_database_path() -> String {
    "postroom.db".to_string()
}

fn default_placeholder_domains() -> Vec<String> {
    vec!["placeholder.example".to_string()]
}

const fn default_batch_size() -> usize {
    50
}

const fn default_lease_ttl_secs() -> u64 {
    300
}

const fn default_preview_chars() -> usize {
    200
}

const fn default_upload_concurrency() -> usize {
    3
}

const fn default_visibility_timeout_secs() -> u64 {
    120
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_retry_delay_secs() -> u64 {
    30
}
