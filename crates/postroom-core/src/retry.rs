//! Bounded retry with linear backoff for external-system calls.

use std::time::Duration;

use tracing::warn;

/// Classifies whether an error is worth retrying.
pub trait Retryable {
    /// True for transient failures: transport-level errors and
    /// 404/5xx-class responses. Application-level rejections return false
    /// and surface immediately.
    fn is_retryable(&self) -> bool;
}

/// Retry policy: bounded attempts with linear backoff.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the first attempt (2 retries = 3 total attempts).
    pub max_retries: u32,
    /// Base delay; attempt n waits `n * base_delay` before retrying.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    /// Backoff delay after the given (1-based) failed attempt.
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

/// Runs `op` with retries per the policy.
///
/// Non-retryable errors and exhaustion both surface the operation's own
/// typed error, which distinguishes "never got a response" from "got an
/// error response".
///
/// # Errors
///
/// Returns the last error once retries are exhausted or immediately for
/// non-retryable errors.
pub async fn with_retry<T, E, F, Fut>(policy: RetryPolicy, mut op: F) -> std::result::Result<T, E>
where
    E: Retryable + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
{
    let mut attempt: u32 = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt <= policy.max_retries => {
                let delay = policy.delay_after(attempt);
                warn!(attempt, ?delay, error = %e, "retrying after transient failure");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct FakeError {
        retryable: bool,
    }

    impl std::fmt::Display for FakeError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "fake error")
        }
    }

    impl Retryable for FakeError {
        fn is_retryable(&self) -> bool {
            self.retryable
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_succeeds_on_first_attempt() {
        let calls = AtomicU32::new(0);
        let result: std::result::Result<u32, FakeError> = with_retry(fast_policy(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(7) }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_two_failures_then_success_within_budget() {
        let calls = AtomicU32::new(0);
        let result: std::result::Result<u32, FakeError> = with_retry(fast_policy(), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(FakeError { retryable: true })
                } else {
                    Ok(9)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 9);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_error() {
        let calls = AtomicU32::new(0);
        let result: std::result::Result<u32, FakeError> = with_retry(fast_policy(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(FakeError { retryable: true }) }
        })
        .await;

        assert!(result.is_err());
        // 1 attempt + 2 retries.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_surfaces_immediately() {
        let calls = AtomicU32::new(0);
        let result: std::result::Result<u32, FakeError> = with_retry(fast_policy(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(FakeError { retryable: false }) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_linear_backoff_delays() {
        let policy = RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(1000),
        };
        assert_eq!(policy.delay_after(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_after(2), Duration::from_millis(2000));
    }
}
