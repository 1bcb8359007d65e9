//! Retry with exponential backoff for transient provider failures.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use consulta_core::defaults::{
    PROVIDER_BACKOFF_BASE_MS, PROVIDER_BACKOFF_CAP_MS, PROVIDER_MAX_ATTEMPTS,
};
use consulta_core::{Error, Result};

/// Backoff policy: `attempts` tries, delay `base * 2^n` capped at `cap`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base: Duration,
    pub cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: PROVIDER_MAX_ATTEMPTS,
            base: Duration::from_millis(PROVIDER_BACKOFF_BASE_MS),
            cap: Duration::from_millis(PROVIDER_BACKOFF_CAP_MS),
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying after the given zero-based failed attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.base.saturating_mul(1u32 << attempt.min(16));
        exp.min(self.cap)
    }
}

/// Whether this error is worth another attempt.
fn is_retryable(err: &Error) -> bool {
    matches!(err, Error::RateLimited(_) | Error::ProviderUnavailable(_))
}

/// Run `op` under the policy, retrying rate-limited and transiently
/// unavailable calls.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, op_name: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if is_retryable(&err) && attempt + 1 < policy.attempts => {
                let delay = policy.delay_for(attempt);
                warn!(
                    op = op_name,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Provider call failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            attempts: 3,
            base: Duration::from_millis(1),
            cap: Duration::from_millis(4),
        }
    }

    #[test]
    fn test_delay_doubles_and_caps() {
        let policy = RetryPolicy {
            attempts: 3,
            base: Duration::from_millis(1000),
            cap: Duration::from_millis(10_000),
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(1), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(4000));
        assert_eq!(policy.delay_for(5), Duration::from_millis(10_000));
        assert_eq!(policy.delay_for(30), Duration::from_millis(10_000));
    }

    #[tokio::test]
    async fn test_succeeds_first_try() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result = with_retry(&fast_policy(), "op", move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Error>(7)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_rate_limited_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result = with_retry(&fast_policy(), "op", move || {
            let c = c.clone();
            async move {
                let n = c.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(Error::RateLimited("429".to_string()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausts_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result: Result<u32> = with_retry(&fast_policy(), "op", move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(Error::ProviderUnavailable("down".to_string()))
            }
        })
        .await;
        assert!(matches!(result, Err(Error::ProviderUnavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_does_not_retry_invalid_input() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result: Result<u32> = with_retry(&fast_policy(), "op", move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(Error::InvalidInput("bad prompt".to_string()))
            }
        })
        .await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_does_not_retry_timeout() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result: Result<u32> = with_retry(&fast_policy(), "op", move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(Error::Timeout("deadline".to_string()))
            }
        })
        .await;
        assert!(matches!(result, Err(Error::Timeout(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
