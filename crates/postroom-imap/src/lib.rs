//! # postroom-imap
//!
//! Minimal stateful IMAP client for the postroom ingestion pipeline.
//!
//! The remote protocol is session-bound, so every operation follows the
//! explicit sequence connect → select → search → fetch → logout, with an
//! independent timeout at each phase:
//!
//! ```ignore
//! use postroom_imap::{Config, Credentials, SearchCriteria, Session};
//!
//! let config = Config::new("imap.example.com");
//! let mut session = Session::connect(&config, &credentials).await?;
//! session.select("INBOX").await?;
//! let uids = session.uid_search(SearchCriteria::Unseen).await?;
//! let bodies = session.uid_fetch_raw(&uids, fetch_timeout).await?;
//! session.logout().await?;
//! ```
//!
//! Sessions must never be leaked across retries; callers are expected to
//! close on every exit path and reconnect fresh.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod config;
mod error;
mod session;
mod types;

pub use config::{Config, ConfigBuilder, Credentials};
pub use error::{Error, Result};
pub use session::Session;
pub use types::{MailboxStatus, SearchCriteria, Uid};
