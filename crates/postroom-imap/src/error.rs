//! Error types for the IMAP client.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur during IMAP operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error during network operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS handshake or encryption error.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Invalid DNS name for TLS.
    #[error("Invalid DNS name: {0}")]
    InvalidDnsName(#[from] rustls::pki_types::InvalidDnsNameError),

    /// Connection phase did not complete within the configured timeout.
    #[error("Connection timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// Authentication failed or timed out.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The requested folder does not exist or access was denied.
    #[error("Folder error: {0}")]
    Folder(String),

    /// Bulk fetch did not complete within its deadline. Partial results
    /// are discarded by the caller.
    #[error("Fetch timed out after {0:?}")]
    FetchTimeout(Duration),

    /// Server returned NO for a command.
    #[error("Server returned NO: {0}")]
    No(String),

    /// Server returned BAD for a command.
    #[error("Server returned BAD: {0}")]
    Bad(String),

    /// Server sent BYE (disconnecting).
    #[error("Server sent BYE: {0}")]
    Bye(String),

    /// An I/O round-trip exceeded the session timeout.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Protocol violation or unexpected data.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl Error {
    /// True when the error means the session transport is no longer usable.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Io(_)
                | Self::Tls(_)
                | Self::ConnectTimeout(_)
                | Self::Bye(_)
                | Self::Timeout(_)
                | Self::FetchTimeout(_)
        )
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
