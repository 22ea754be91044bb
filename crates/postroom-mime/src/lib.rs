//! # postroom-mime
//!
//! Pure MIME message parsing for the postroom ingestion pipeline.
//!
//! This crate turns raw message bytes into structured metadata with no I/O
//! and no side effects:
//!
//! - **Headers**: case-insensitive access, RFC 5322 unfolding, RFC 2047
//!   encoded-word decoding
//! - **Bodies**: full plain-text extraction (multipart/alternative aware)
//!   plus capped previews
//! - **Attachments**: metadata-only scans, with content decoded lazily on
//!   request
//!
//! ```ignore
//! use postroom_mime::Message;
//!
//! let message = Message::parse(raw_bytes)?;
//! let subject = message.subject().unwrap_or_else(|| "(no subject)".into());
//! for info in message.attachments() {
//!     println!("{} ({}, {} bytes)", info.filename, info.content_type, info.size);
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod error;
mod header;
mod message;

pub mod encoding;

pub use error::{Error, Result};
pub use header::Headers;
pub use message::{AttachmentInfo, Message, Part, TransferEncoding};
