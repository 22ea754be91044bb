//! Key-value store with per-key expiry.
//!
//! Used both as a cache and, through set-if-absent with TTL, as the
//! mutual-exclusion primitive for cross-invocation leases. The store is an
//! injected capability constructed once per process and passed explicitly
//! to each component.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use std::time::Duration;

use crate::Result;

/// Key-value store capability with per-key expiry.
pub trait KeyValueStore: Send + Sync {
    /// Gets a value; expired entries read as absent.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>>> + Send;

    /// Sets a value, optionally with a TTL. Overwrites unconditionally.
    fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Sets a value with TTL only when the key is absent or expired.
    ///
    /// Returns true when this call won the key. This is the
    /// set-if-absent-with-TTL primitive leases are built on.
    fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Deletes a key. Deleting an absent key is a no-op.
    fn del(&self, key: &str) -> impl Future<Output = Result<()>> + Send;
}
