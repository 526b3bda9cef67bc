//! Retry strategies.
//!
//! A retry strategy re-executes one send-and-decode attempt under a policy.
//! Only transport failures (`Transport`, `Timeout`) are retried; everything
//! else, including malformed responses, is returned after the first attempt.

use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use rand::Rng;
use tracing::{debug, warn};
use trible_common::{Response, Result};

/// One attempt of the operation being retried.
pub type Attempt<'a> = dyn Fn() -> BoxFuture<'a, Result<Response>> + Send + Sync + 'a;

/// Re-executes an attempt until it succeeds, fails terminally or the policy
/// gives up. On exhaustion the last error is returned.
#[async_trait]
pub trait RetryStrategy: Send + Sync {
    async fn do_retry<'a>(&self, operation: &'a Attempt<'a>) -> Result<Response>;
}

/// Shared attempt loop.
///
/// `delay_for(n)` is the pause after the `n`-th failed attempt (0-indexed).
async fn run_attempts<'a, D>(
    strategy: &str,
    max_attempts: u32,
    delay_for: D,
    operation: &'a Attempt<'a>,
) -> Result<Response>
where
    D: Fn(u32) -> Duration + Send + Sync,
{
    let max_attempts = max_attempts.max(1);

    for attempt in 0..max_attempts {
        match operation().await {
            Ok(response) => {
                if attempt > 0 {
                    debug!("Operation succeeded after {} attempts", attempt + 1);
                }
                return Ok(response);
            }
            Err(e) => {
                if !e.is_retryable() {
                    debug!("Error is not retryable: {}", e);
                    return Err(e);
                }

                if attempt + 1 >= max_attempts {
                    if max_attempts > 1 {
                        warn!(
                            "All {} {} attempts exhausted. Last error: {}",
                            max_attempts, strategy, e
                        );
                    }
                    return Err(e);
                }

                let delay = delay_for(attempt);
                warn!(
                    "Attempt {}/{} failed: {}. Retrying in {:?}",
                    attempt + 1,
                    max_attempts,
                    e,
                    delay
                );

                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    unreachable!("Retry loop should have returned")
}

/// Exactly one attempt.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRetry;

#[async_trait]
impl RetryStrategy for NoRetry {
    async fn do_retry<'a>(&self, operation: &'a Attempt<'a>) -> Result<Response> {
        operation().await
    }
}

/// Up to `max_attempts` attempts back to back.
#[derive(Debug, Clone, Copy)]
pub struct FixedCountRetry {
    pub max_attempts: u32,
}

impl FixedCountRetry {
    pub fn new(max_attempts: u32) -> Self {
        Self { max_attempts }
    }
}

#[async_trait]
impl RetryStrategy for FixedCountRetry {
    async fn do_retry<'a>(&self, operation: &'a Attempt<'a>) -> Result<Response> {
        run_attempts("FIXED_COUNT", self.max_attempts, |_| Duration::ZERO, operation).await
    }
}

/// Up to `max_attempts` attempts with a fixed pause between them.
#[derive(Debug, Clone, Copy)]
pub struct FixedIntervalRetry {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl FixedIntervalRetry {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }
}

#[async_trait]
impl RetryStrategy for FixedIntervalRetry {
    async fn do_retry<'a>(&self, operation: &'a Attempt<'a>) -> Result<Response> {
        let interval = self.interval;
        run_attempts("FIXED_INTERVAL", self.max_attempts, move |_| interval, operation).await
    }
}

/// Up to `max_attempts` attempts with exponentially growing pauses.
#[derive(Debug, Clone, Copy)]
pub struct ExponentialBackoffRetry {
    pub max_attempts: u32,
    /// Pause after the first failure
    pub base_delay: Duration,
    /// Cap applied before and after jitter
    pub max_delay: Duration,
    /// Multiply each pause by a random factor in [0.5, 1.5)
    pub jitter: bool,
}

impl ExponentialBackoffRetry {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            jitter: true,
        }
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Pause after the `attempt`-th failure (0-indexed).
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        // base * 2^attempt, capped
        let multiplier = 2f64.powi(attempt.min(63) as i32);
        let delay_secs = self.base_delay.as_secs_f64() * multiplier;
        let capped_secs = delay_secs.min(self.max_delay.as_secs_f64());

        let final_secs = if self.jitter {
            let jitter_factor = rand::rng().random_range(0.5..1.5);
            (capped_secs * jitter_factor).min(self.max_delay.as_secs_f64())
        } else {
            capped_secs
        };

        Duration::from_secs_f64(final_secs)
    }
}

#[async_trait]
impl RetryStrategy for ExponentialBackoffRetry {
    async fn do_retry<'a>(&self, operation: &'a Attempt<'a>) -> Result<Response> {
        run_attempts(
            "EXPONENTIAL_BACKOFF",
            self.max_attempts,
            |attempt| self.calculate_delay(attempt),
            operation,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use trible_common::{RemoteException, TribleError};

    /// Counts calls and fails the first `failures` of them with `error`.
    async fn run_counting(
        strategy: &dyn RetryStrategy,
        failures: u32,
        error: fn() -> TribleError,
    ) -> (Result<Response>, u32) {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let operation = move || {
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                if n < failures {
                    Err(error())
                } else {
                    Ok(Response::success(json!(n + 1)))
                }
            }
            .boxed()
        };
        let result = strategy.do_retry(&operation).await;
        (result, calls.load(Ordering::SeqCst))
    }

    fn transport_error() -> TribleError {
        TribleError::Transport("connection reset".to_string())
    }

    #[tokio::test]
    async fn test_no_retry_single_attempt() {
        let (result, calls) = run_counting(&NoRetry, u32::MAX, transport_error).await;
        assert!(matches!(result, Err(TribleError::Transport(_))));
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_fixed_count_bound() {
        let (result, calls) = run_counting(&FixedCountRetry::new(3), u32::MAX, transport_error).await;
        assert!(matches!(result, Err(TribleError::Transport(_))));
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn test_fixed_count_succeeds_on_third_attempt() {
        let (result, calls) = run_counting(&FixedCountRetry::new(3), 2, transport_error).await;
        assert_eq!(result.unwrap().data, json!(3));
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn test_timeouts_are_retried() {
        let (result, calls) = run_counting(&FixedCountRetry::new(4), 3, || TribleError::Timeout(10)).await;
        assert!(result.is_ok());
        assert_eq!(calls, 4);
    }

    #[tokio::test]
    async fn test_non_retryable_errors_stop_immediately() {
        let errors: [fn() -> TribleError; 3] = [
            || TribleError::ProtocolDecode("invalid magic byte".to_string()),
            || TribleError::Business(RemoteException::new("IllegalState", "nope")),
            || TribleError::IllegalArgument("bad".to_string()),
        ];

        for error in errors {
            let strategy = FixedCountRetry::new(5);
            let (result, calls) = run_counting(&strategy, u32::MAX, error).await;
            assert!(result.is_err());
            assert_eq!(calls, 1, "{:?} should not be retried", error());
        }
    }

    #[tokio::test]
    async fn test_business_response_is_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let operation = move || {
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Response::failure("ArithmeticException", "/ by zero"))
            }
            .boxed()
        };
        let response = FixedCountRetry::new(3).do_retry(&operation).await.unwrap();
        assert!(response.exception.is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_interval_waits_between_attempts() {
        let strategy = FixedIntervalRetry::new(3, Duration::from_millis(100));
        let start = tokio::time::Instant::now();
        let (result, calls) = run_counting(&strategy, u32::MAX, transport_error).await;
        assert!(result.is_err());
        assert_eq!(calls, 3);
        assert!(start.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exponential_backoff_succeeds_after_failures() {
        let strategy = ExponentialBackoffRetry::new(4, Duration::from_millis(10), Duration::from_secs(1))
            .with_jitter(false);
        let start = tokio::time::Instant::now();
        let (result, calls) = run_counting(&strategy, 3, transport_error).await;
        assert_eq!(result.unwrap().data, json!(4));
        assert_eq!(calls, 4);
        // 10 + 20 + 40
        assert!(start.elapsed() >= Duration::from_millis(70));
    }

    #[test]
    fn test_delay_calculation_no_jitter() {
        let strategy = ExponentialBackoffRetry::new(5, Duration::from_secs(1), Duration::from_secs(60))
            .with_jitter(false);
        assert_eq!(strategy.calculate_delay(0), Duration::from_secs(1));
        assert_eq!(strategy.calculate_delay(1), Duration::from_secs(2));
        assert_eq!(strategy.calculate_delay(2), Duration::from_secs(4));
    }

    #[test]
    fn test_delay_capped_at_max() {
        let strategy = ExponentialBackoffRetry::new(20, Duration::from_secs(1), Duration::from_secs(10))
            .with_jitter(false);
        assert_eq!(strategy.calculate_delay(10), Duration::from_secs(10));
        assert_eq!(strategy.calculate_delay(1000), Duration::from_secs(10));
    }

    #[test]
    fn test_delay_with_jitter_stays_in_range() {
        let strategy = ExponentialBackoffRetry::new(5, Duration::from_secs(2), Duration::from_secs(60));
        for _ in 0..100 {
            let delay = strategy.calculate_delay(0);
            assert!(delay >= Duration::from_secs(1), "{delay:?}");
            assert!(delay < Duration::from_secs(3), "{delay:?}");
        }
    }
}
