// Retry with backoff under a deadline; non-recoverable failures short-circuit.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{Instant, sleep, timeout_at};

use crate::error::Recoverable;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Pure delay strategy: `(attempt, base_delay) -> delay`.
pub type BackoffFn = fn(u32, Duration) -> Duration;

#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff: BackoffFn,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_RETRY_DELAY,
            max_delay: MAX_RETRY_DELAY,
            backoff: exponential_backoff,
        }
    }
}

impl RetryConfig {
    /// Delay before the retry following `attempt` (0-based), capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        (self.backoff)(attempt, self.base_delay).min(self.max_delay)
    }
}

/// `base * 2^attempt`, capped at [`MAX_RETRY_DELAY`].
pub fn exponential_backoff(attempt: u32, base_delay: Duration) -> Duration {
    let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
    base_delay
        .checked_mul(factor)
        .unwrap_or(MAX_RETRY_DELAY)
        .min(MAX_RETRY_DELAY)
}

/// `base * (attempt + 1)`, capped at [`MAX_RETRY_DELAY`].
pub fn linear_backoff(attempt: u32, base_delay: Duration) -> Duration {
    base_delay
        .checked_mul(attempt.saturating_add(1))
        .unwrap_or(MAX_RETRY_DELAY)
        .min(MAX_RETRY_DELAY)
}

#[derive(Debug, Error)]
pub enum RetryError<E>
where
    E: std::error::Error + 'static,
{
    /// The deadline passed while the operation or a backoff wait was in flight.
    #[error("operation canceled during retry after {attempts} attempt(s): deadline exceeded")]
    Canceled {
        attempts: u32,
        #[source]
        last: Option<E>,
    },

    #[error("operation failed with non-recoverable error: {0}")]
    NonRecoverable(#[source] E),

    #[error("operation failed after {retries} retries: {source}")]
    Exhausted {
        retries: u32,
        #[source]
        source: E,
    },
}

impl<E> RetryError<E>
where
    E: std::error::Error + 'static,
{
    /// The last underlying failure, if the operation got far enough to produce one.
    pub fn cause(&self) -> Option<&E> {
        match self {
            RetryError::Canceled { last, .. } => last.as_ref(),
            RetryError::NonRecoverable(e) => Some(e),
            RetryError::Exhausted { source, .. } => Some(source),
        }
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, RetryError::Canceled { .. })
    }
}

/// Runs `operation` until it succeeds, fails non-recoverably, runs out of
/// retries, or `deadline` passes. Makes at most `max_retries + 1` calls.
pub async fn with_retry<T, E, F, Fut>(
    deadline: Instant,
    config: &RetryConfig,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::error::Error + Recoverable + 'static,
{
    let mut attempt = 0u32;
    loop {
        let err = match timeout_at(deadline, operation()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => e,
            Err(_) => {
                return Err(RetryError::Canceled {
                    attempts: attempt + 1,
                    last: None,
                });
            }
        };

        if !err.is_recoverable() {
            return Err(RetryError::NonRecoverable(err));
        }
        if attempt >= config.max_retries {
            return Err(RetryError::Exhausted {
                retries: config.max_retries,
                source: err,
            });
        }

        let delay = config.delay_for(attempt);
        tracing::debug!(
            attempt = attempt + 1,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "retrying after recoverable failure"
        );
        if timeout_at(deadline, sleep(delay)).await.is_err() {
            return Err(RetryError::Canceled {
                attempts: attempt + 1,
                last: Some(err),
            });
        }
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, RuntimeError};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
            backoff: exponential_backoff,
        }
    }

    fn far_deadline() -> Instant {
        Instant::now() + Duration::from_secs(3600)
    }

    #[test]
    fn exponential_backoff_doubles_and_caps() {
        let base = Duration::from_secs(1);
        assert_eq!(exponential_backoff(0, base), Duration::from_secs(1));
        assert_eq!(exponential_backoff(1, base), Duration::from_secs(2));
        assert_eq!(exponential_backoff(3, base), Duration::from_secs(8));
        assert_eq!(exponential_backoff(10, base), MAX_RETRY_DELAY);
        assert_eq!(exponential_backoff(64, base), MAX_RETRY_DELAY);
    }

    #[test]
    fn linear_backoff_grows_by_base_and_caps() {
        let base = Duration::from_secs(1);
        assert_eq!(linear_backoff(0, base), Duration::from_secs(1));
        assert_eq!(linear_backoff(2, base), Duration::from_secs(3));
        assert_eq!(linear_backoff(100, base), MAX_RETRY_DELAY);
    }

    #[test]
    fn delay_for_respects_config_cap() {
        let config = RetryConfig {
            max_delay: Duration::from_secs(5),
            ..RetryConfig::default()
        };
        assert_eq!(config.delay_for(0), Duration::from_secs(1));
        assert_eq!(config.delay_for(4), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_third_call_after_two_failures() {
        let calls = AtomicU32::new(0);
        let result = with_retry(far_deadline(), &fast(3), || async {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 3 {
                Err(RuntimeError::new("start", ErrorKind::OperationTimeout))
            } else {
                Ok(n)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn always_failing_reports_exhausted_after_max_retries() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(far_deadline(), &fast(2), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(RuntimeError::new(
                "stop",
                ErrorKind::ConnectionFailed("refused".into()),
            ))
        })
        .await;
        let err = result.unwrap_err();
        assert!(matches!(err, RetryError::Exhausted { retries: 2, .. }));
        assert!(err.to_string().contains("after 2 retries"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn non_recoverable_failure_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(far_deadline(), &fast(5), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(RuntimeError::service(
                "start",
                "ark",
                ErrorKind::ServiceNotFound("ark".into()),
            ))
        })
        .await;
        assert!(matches!(result, Err(RetryError::NonRecoverable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_during_backoff_is_reported_as_canceled() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig {
            max_retries: 5,
            base_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(10),
            backoff: linear_backoff,
        };
        let deadline = Instant::now() + Duration::from_secs(1);
        let result: Result<(), _> = with_retry(deadline, &config, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(RuntimeError::new("list", ErrorKind::OperationTimeout))
        })
        .await;
        let err = result.unwrap_err();
        assert!(err.is_canceled());
        assert!(err.cause().is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_during_operation_is_reported_as_canceled() {
        let deadline = Instant::now() + Duration::from_millis(50);
        let result: Result<(), RetryError<RuntimeError>> =
            with_retry(deadline, &fast(3), || async {
                sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        let err = result.unwrap_err();
        assert!(matches!(err, RetryError::Canceled { last: None, .. }));
    }
}
