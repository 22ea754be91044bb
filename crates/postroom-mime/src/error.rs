//! Error types for MIME parsing.

use std::string::FromUtf8Error;

/// Result type alias for MIME operations.
pub type Result<T> = std::result::Result<T, Error>;

/// MIME parse error types.
///
/// A parse error marks a single message as malformed; it never aborts a
/// whole sync pass.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Input was empty.
    #[error("Empty message")]
    Empty,

    /// The header block could not be parsed.
    #[error("Invalid header block: {0}")]
    InvalidHeader(String),

    /// Invalid transfer encoding payload.
    #[error("Invalid encoding: {0}")]
    InvalidEncoding(String),

    /// Base64 decode error.
    #[error("Base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    /// UTF-8 decode error.
    #[error("UTF-8 decode error: {0}")]
    Utf8Decode(#[from] FromUtf8Error),

    /// Multipart message declared a boundary that never occurs in the body.
    #[error("Multipart boundary {0:?} not found in body")]
    BoundaryNotFound(String),

    /// Content-Type declared multipart but carried no boundary parameter.
    #[error("Missing boundary in multipart message")]
    MissingBoundary,
}
