use std::time::Duration;

use concord_core::error::SyncError;
use tracing::warn;

/// Retry policy for workflow activities (§4.5): exponential backoff starting
/// at 2s, doubling each retry, capped at 60s, up to 5 retries after the
/// initial attempt (2s/4s/8s/16s/32s, 6 attempts total) — matching Scenario 5
/// (§8): a continuously-429ing tracker call sees exactly that backoff
/// sequence before the activity gives up. Only [`SyncError::Transient`]
/// failures are retried — everything else surfaces immediately since
/// retrying a validation or auth failure cannot help.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub initial_backoff: Duration,
    pub multiplier: f64,
    pub max_backoff: Duration,
    /// Number of retries allowed after the initial attempt — 5 by default,
    /// for 6 total attempts (§4.5, §8 Scenario 5).
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_secs(2),
            multiplier: 2.0,
            max_backoff: Duration::from_secs(60),
            max_attempts: 5,
        }
    }
}

impl RetryPolicy {
    fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let scaled = self.initial_backoff.as_secs_f64() * self.multiplier.powi(attempt as i32);
        Duration::from_secs_f64(scaled.min(self.max_backoff.as_secs_f64()))
    }
}

/// Run `activity`, retrying per `policy` while the error remains
/// [`SyncError::is_retryable`]. Returns the last error once attempts are
/// exhausted or a non-retryable error is hit.
pub async fn retry_with_backoff<F, Fut, T>(policy: RetryPolicy, mut activity: F) -> Result<T, SyncError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, SyncError>>,
{
    let mut attempt = 0;
    loop {
        match activity().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < policy.max_attempts => {
                let backoff = policy.backoff_for_attempt(attempt);
                warn!(attempt, ?backoff, error = %err, "retrying after transient failure");
                tokio::time::sleep(backoff).await;
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

    #[tokio::test]
    async fn succeeds_without_retry_on_first_try() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();
        let policy = RetryPolicy {
            initial_backoff: Duration::from_millis(1),
            ..RetryPolicy::default()
        };
        let result = retry_with_backoff(policy, move || {
            let calls = calls2.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, SyncError>(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();
        let policy = RetryPolicy {
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
            ..RetryPolicy::default()
        };
        let result = retry_with_backoff(policy, move || {
            let calls = calls2.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(SyncError::Transient("flaky".into()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_fails_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();
        let result: Result<(), SyncError> = retry_with_backoff(RetryPolicy::default(), move || {
            let calls = calls2.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(SyncError::Validation("bad input".into()))
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausts_attempts_then_returns_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();
        let policy = RetryPolicy {
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            max_attempts: 3,
            ..RetryPolicy::default()
        };
        let result: Result<(), SyncError> = retry_with_backoff(policy, move || {
            let calls = calls2.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(SyncError::Transient("down".into()))
            }
        })
        .await;
        assert!(result.is_err());
        // 1 initial attempt + 3 retries.
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    /// §8 Scenario 5: a continuously-429ing tracker retries 5 times with
    /// backoff 2s/4s/8s/16s/32s before the activity fails.
    #[tokio::test]
    async fn default_policy_backs_off_2_4_8_16_32_across_five_retries() {
        let backoffs: Vec<Duration> = (0..RetryPolicy::default().max_attempts)
            .map(|attempt| RetryPolicy::default().backoff_for_attempt(attempt))
            .collect();
        assert_eq!(
            backoffs,
            vec![
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(8),
                Duration::from_secs(16),
                Duration::from_secs(32),
            ]
        );

        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();
        let policy = RetryPolicy {
            initial_backoff: Duration::from_micros(1),
            max_backoff: Duration::from_micros(32),
            ..RetryPolicy::default()
        };
        let result: Result<(), SyncError> = retry_with_backoff(policy, move || {
            let calls = calls2.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(SyncError::Transient("rate limited".into()))
            }
        })
        .await;
        assert!(result.is_err());
        // 1 initial attempt + 5 retries.
        assert_eq!(calls.load(Ordering::SeqCst), 6);
    }
}
