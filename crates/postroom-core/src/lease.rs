//! Cross-invocation leases.
//!
//! A lease is a cache entry with a TTL acting as a mutual-exclusion marker
//! across independently-invoked, stateless processes. Acquire with
//! set-if-absent, always release, and tolerate TTL self-expiry when a
//! holder crashes: the system accepts a false "in progress" for at most
//! the lease TTL.

use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};

use crate::Result;
use crate::store::KeyValueStore;

/// Lease key for a running sync pass. The exact name matters for interop.
pub const SYNC_IN_PROGRESS: &str = "sync_in_progress";

/// Lease key for a running attachment drain. The exact name matters for
/// interop.
pub const PROCESSING_ATTACHMENTS: &str = "processing_attachments";

/// Cache key recording when the last sync pass completed.
pub const LAST_SYNC_TIMESTAMP: &str = "last_sync_timestamp";

/// Runs `guarded` under the named lease, releasing on every exit path.
///
/// Returns `Ok(None)` without polling `guarded` when the lease is already
/// held — expected concurrent-invocation behavior, not an error. The
/// release runs whether the guarded future resolves to success or failure;
/// only a crash skips it, and then the TTL self-expires the key.
///
/// # Errors
///
/// Returns an error if the store fails while acquiring.
pub async fn with_lease<S, F, T>(
    store: &S,
    key: &str,
    ttl: Duration,
    guarded: F,
) -> Result<Option<T>>
where
    S: KeyValueStore,
    F: Future<Output = T>,
{
    let holder_stamp = Utc::now().to_rfc3339();
    if !store.set_if_absent(key, &holder_stamp, ttl).await? {
        debug!(key, "lease already held, skipping");
        return Ok(None);
    }

    let result = guarded.await;

    if let Err(e) = store.del(key).await {
        // The TTL still bounds how long the stale lease can block others.
        warn!(key, error = %e, "failed to release lease, waiting on TTL expiry");
    }

    Ok(Some(result))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn test_lease_released_after_success() {
        let store = MemoryStore::new();

        let ran = with_lease(&store, SYNC_IN_PROGRESS, TTL, async { 42 })
            .await
            .unwrap();
        assert_eq!(ran, Some(42));

        // Key must be absent after the call returns.
        assert_eq!(store.get(SYNC_IN_PROGRESS).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_lease_released_after_guarded_failure() {
        let store = MemoryStore::new();

        let ran: Option<std::result::Result<(), &str>> =
            with_lease(&store, SYNC_IN_PROGRESS, TTL, async { Err("boom") })
                .await
                .unwrap();
        assert_eq!(ran, Some(Err("boom")));
        assert_eq!(store.get(SYNC_IN_PROGRESS).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_held_lease_short_circuits() {
        let store = MemoryStore::new();
        store
            .set_if_absent(SYNC_IN_PROGRESS, "other-holder", TTL)
            .await
            .unwrap();

        let mut touched = false;
        let ran = with_lease(&store, SYNC_IN_PROGRESS, TTL, async {
            touched = true;
        })
        .await
        .unwrap();

        assert!(ran.is_none());
        assert!(!touched, "guarded future must not run under a held lease");

        // The other holder's lease is left in place.
        assert_eq!(
            store.get(SYNC_IN_PROGRESS).await.unwrap(),
            Some("other-holder".to_string())
        );
    }

    #[tokio::test]
    async fn test_sequential_passes_both_run() {
        let store = MemoryStore::new();

        let first = with_lease(&store, SYNC_IN_PROGRESS, TTL, async { 1 })
            .await
            .unwrap();
        let second = with_lease(&store, SYNC_IN_PROGRESS, TTL, async { 2 })
            .await
            .unwrap();

        assert_eq!(first, Some(1));
        assert_eq!(second, Some(2));
    }
}
