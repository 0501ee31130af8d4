//! Retry with exponential backoff for transient navigation errors.
//!
//! Transient conditions (network failures, timeouts, 429s and 5xx statuses)
//! are retried up to a configured number of attempts. Everything else is
//! propagated immediately; the scrape boundary turns it into an unavailable
//! observation.

use std::future::Future;
use std::time::Duration;

use crate::engine::RetryPolicy;
use crate::error::ScrapeError;

/// Returns `true` if `err` represents a transient condition that should be
/// retried after a backoff delay.
fn is_retriable(err: &ScrapeError) -> bool {
    match err {
        ScrapeError::Http(_) | ScrapeError::Timeout { .. } => true,
        ScrapeError::Status { status, .. } => *status == 429 || *status >= 500,
        ScrapeError::Browser(_)
        | ScrapeError::InvalidUrl { .. }
        | ScrapeError::NoDocument
        | ScrapeError::Closed => false,
    }
}

/// Backoff before the n-th retry (1-based): `min(max, initial * 2^(n-1))`.
pub(crate) fn backoff_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(62);
    let secs = policy
        .initial_delay_secs
        .saturating_mul(1u64 << exponent)
        .min(policy.max_delay_secs);
    Duration::from_secs(secs)
}

/// Executes `operation` with exponential backoff retries on transient errors.
///
/// The operation runs at most `policy.max_attempts` times; non-retriable
/// errors and the final retriable error are returned as-is.
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<T, ScrapeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ScrapeError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1u32;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !is_retriable(&err) || attempt >= max_attempts {
                    return Err(err);
                }
                let delay = backoff_delay(policy, attempt);
                tracing::warn!(
                    attempt,
                    max_attempts,
                    delay_secs = delay.as_secs(),
                    error = %err,
                    "transient navigation error — retrying after backoff"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::*;

    fn no_wait_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_delay_secs: 0,
            max_delay_secs: 0,
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_delay_secs: 1,
            max_delay_secs: 300,
        };
        assert_eq!(backoff_delay(&policy, 1), Duration::from_secs(1));
        assert_eq!(backoff_delay(&policy, 2), Duration::from_secs(2));
        assert_eq!(backoff_delay(&policy, 3), Duration::from_secs(4));
        assert_eq!(backoff_delay(&policy, 9), Duration::from_secs(256));
        assert_eq!(backoff_delay(&policy, 10), Duration::from_secs(300));
        assert_eq!(backoff_delay(&policy, 62), Duration::from_secs(300));
    }

    #[tokio::test]
    async fn succeeds_immediately_on_first_try() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(&no_wait_policy(5), || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok::<u32, ScrapeError>(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_timeouts_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(&no_wait_policy(5), || {
            let c = Arc::clone(&c);
            async move {
                let n = c.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(ScrapeError::Timeout {
                        url: "https://example.pl".to_owned(),
                    })
                } else {
                    Ok::<u32, ScrapeError>(99)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 99);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausts_attempts_on_persistent_server_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(&no_wait_policy(3), || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<u32, ScrapeError>(ScrapeError::Status {
                    status: 503,
                    url: "https://example.pl".to_owned(),
                })
            }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(result, Err(ScrapeError::Status { status: 503, .. })));
    }

    #[tokio::test]
    async fn does_not_retry_client_errors() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(&no_wait_policy(5), || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<u32, ScrapeError>(ScrapeError::Status {
                    status: 404,
                    url: "https://example.pl/missing".to_owned(),
                })
            }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(ScrapeError::Status { status: 404, .. })));
    }

    #[tokio::test]
    async fn does_not_retry_browser_errors() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(&no_wait_policy(5), || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<u32, ScrapeError>(ScrapeError::Browser("tab crashed".to_owned()))
            }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(ScrapeError::Browser(_))));
    }
}
