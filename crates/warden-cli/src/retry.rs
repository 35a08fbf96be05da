//! Caller-side retry for transient token endpoint failures.

use std::future::Future;
use std::time::{Duration, SystemTime};

use reqwest_retry::policies::ExponentialBackoff;
use reqwest_retry::{RetryDecision, RetryPolicy};
use tracing::warn;

use warden::CredentialError;

/// Exponential backoff between 500ms and 10s.
pub fn backoff(max_retries: u32) -> ExponentialBackoff {
    ExponentialBackoff::builder()
        .retry_bounds(Duration::from_millis(500), Duration::from_secs(10))
        .build_with_max_retries(max_retries)
}

/// Runs `operation` until it succeeds, fails with a non-retryable error, or
/// `policy` gives up.
///
/// # Errors
///
/// Returns the last error from `operation`.
pub async fn with_retry<T, F, Fut>(
    policy: &impl RetryPolicy,
    mut operation: F,
) -> Result<T, CredentialError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CredentialError>>,
{
    let start = SystemTime::now();
    let mut past_retries = 0;

    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() => e,
            Err(e) => return Err(e),
        };

        match policy.should_retry(start, past_retries) {
            RetryDecision::Retry { execute_after } => {
                let delay = execute_after
                    .duration_since(SystemTime::now())
                    .unwrap_or_default();
                warn!(
                    attempt = past_retries + 1,
                    delay_ms = delay.as_millis(),
                    error = %err,
                    "Transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
                past_retries += 1;
            }
            RetryDecision::DoNotRetry => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU32, Ordering};

    use warden::{CredentialManager, ManagerConfig, StoreConfig};

    use super::*;

    fn fast_backoff(max_retries: u32) -> ExponentialBackoff {
        ExponentialBackoff::builder()
            .retry_bounds(Duration::from_millis(1), Duration::from_millis(5))
            .build_with_max_retries(max_retries)
    }

    fn fixture(name: &str) -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("../warden-client/tests/fixtures")
            .join(name)
    }

    #[tokio::test]
    async fn test_non_retryable_error_is_returned_immediately() {
        let attempts = AtomicU32::new(0);

        let result = with_retry(&fast_backoff(3), || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(CredentialError::MissingToken) }
        })
        .await;

        assert!(matches!(result, Err(CredentialError::MissingToken)));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_success_after_first_attempt() {
        let attempts = AtomicU32::new(0);

        let value = with_retry(&fast_backoff(3), || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, CredentialError>(7) }
        })
        .await
        .unwrap();

        assert_eq!(value, 7);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transport_failures_exhaust_policy() {
        // Nothing listens on the discard port.
        let config = ManagerConfig::new(
            "http://127.0.0.1:9",
            fixture("client.pem"),
            fixture("client.key"),
            "svc-a",
        )
        .with_timeout_seconds(2)
        .with_store(StoreConfig::memory());
        let attempts = AtomicU32::new(0);

        let result = with_retry(&fast_backoff(2), || {
            attempts.fetch_add(1, Ordering::SeqCst);
            CredentialManager::initialize(config.clone())
        })
        .await;

        let err = result.unwrap_err();
        assert!(err.is_retryable(), "{err}");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
