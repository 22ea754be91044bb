//! Protocol-facing value types.

use std::fmt;

/// Server-assigned unique message identifier.
///
/// Stable within a session; not durable across server-side renumbering
/// (UIDVALIDITY changes), so callers needing a durable identity fall back
/// to the Message-ID header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Uid(pub u32);

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Search criteria vocabulary for a sync pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchCriteria {
    /// Every message in the folder (full refresh).
    All,
    /// Messages without the `\Seen` flag (incremental check).
    Unseen,
}

impl SearchCriteria {
    /// The protocol keyword for this criterion.
    #[must_use]
    pub const fn as_imap(self) -> &'static str {
        match self {
            Self::All => "ALL",
            Self::Unseen => "UNSEEN",
        }
    }
}

/// Status of a selected mailbox.
#[derive(Debug, Clone, Copy, Default)]
pub struct MailboxStatus {
    /// Number of messages in the mailbox.
    pub exists: u32,
    /// Number of messages with the `\Recent` flag, when reported.
    pub recent: u32,
}
