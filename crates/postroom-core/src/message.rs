//! In-flight message model for a sync pass.

use chrono::{DateTime, Utc};
use postroom_imap::Uid;
use postroom_mime::Message;

/// Attachment metadata carried by a [`MailboxMessage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentDescriptor {
    /// Attachment filename.
    pub filename: String,
    /// MIME content type.
    pub content_type: String,
    /// Size in bytes (estimated from the encoded form).
    pub size: u64,
}

/// One message on the remote server during a sync pass.
///
/// Constructed by parsing fetched bytes, discarded after reconciliation;
/// never persisted as-is.
#[derive(Debug, Clone)]
pub struct MailboxMessage {
    /// Server-assigned UID, stable within the session only.
    pub uid: Uid,
    /// Message-ID header, the durable fallback identity.
    pub message_id: Option<String>,
    /// Sender display text (first address when a list).
    pub from: String,
    /// Recipient display text (first address when a list).
    pub to: String,
    /// Subject, defaulted when absent.
    pub subject: String,
    /// Parsed Date header, or the observation time when missing.
    pub received_at: DateTime<Utc>,
    /// Capped plain-text preview.
    pub body_preview: String,
    /// Attachment metadata (no content).
    pub attachments: Vec<AttachmentDescriptor>,
}

impl MailboxMessage {
    /// Builds the model from a parsed message.
    #[must_use]
    pub fn from_parsed(uid: Uid, parsed: &Message, preview_chars: usize) -> Self {
        Self {
            uid,
            message_id: parsed.message_id(),
            from: parsed.from_display().unwrap_or_default(),
            to: parsed.to_display().unwrap_or_default(),
            subject: parsed
                .subject()
                .unwrap_or_else(|| "(no subject)".to_string()),
            received_at: parsed.received_at().unwrap_or_else(Utc::now),
            body_preview: parsed.preview(preview_chars),
            attachments: parsed
                .attachments()
                .into_iter()
                .map(|info| AttachmentDescriptor {
                    filename: info.filename,
                    content_type: info.content_type,
                    size: info.size,
                })
                .collect(),
        }
    }

    /// The externally stable identity: the Message-ID when present
    /// (durable across server-side renumbering), otherwise a UID-derived
    /// fallback.
    #[must_use]
    pub fn email_id(&self) -> String {
        self.message_id
            .clone()
            .unwrap_or_else(|| format!("uid-{}", self.uid))
    }

    /// Reply-vs-new heuristic on the subject prefix.
    #[must_use]
    pub fn is_reply(&self) -> bool {
        self.subject.trim_start().to_lowercase().starts_with("re:")
    }

    /// Whether this message answers to the given external identity, by
    /// UID or by Message-ID.
    #[must_use]
    pub fn matches_email_id(&self, email_id: &str) -> bool {
        if self.message_id.as_deref() == Some(email_id) {
            return true;
        }
        email_id == self.uid.to_string() || email_id == format!("uid-{}", self.uid)
    }
}
