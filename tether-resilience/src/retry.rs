//! Retry policy and executor

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

use crate::backoff::{BackoffCalculator, BackoffStrategy};

/// Retry policy configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,

    /// Initial delay between retries
    #[serde(with = "humantime_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,

    /// Backoff strategy
    pub backoff_strategy: BackoffStrategy,

    /// Whether to add jitter to retry delays
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_strategy: BackoffStrategy::Exponential { base: 2.0 },
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Constant delay between attempts, no jitter. `retries` counts the
    /// attempts after the first one.
    pub fn fixed(retries: u32, delay: Duration) -> Self {
        Self {
            max_attempts: retries.saturating_add(1),
            initial_delay: delay,
            max_delay: delay,
            backoff_strategy: BackoffStrategy::Fixed,
            jitter: false,
        }
    }

    /// Doubling delay from `initial_delay` up to `max_delay`, with jitter
    pub fn exponential(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
            max_delay,
            backoff_strategy: BackoffStrategy::Exponential { base: 2.0 },
            jitter: true,
        }
    }

    /// Calculate delay for a specific attempt
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        BackoffCalculator::new(
            self.backoff_strategy.clone(),
            self.initial_delay,
            self.max_delay,
            self.jitter,
        )
        .calculate_delay(attempt)
    }
}

/// Trait for errors that can be retried
pub trait Retryable {
    /// Whether this error is retryable
    fn is_retryable(&self) -> bool;

    /// Delay requested by the error itself, overriding the policy
    fn retry_delay(&self) -> Option<Duration> {
        None
    }
}

/// Retry executor
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Execute a function with retry logic
    pub async fn execute<F, Fut, T, E>(&self, mut f: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + std::fmt::Display,
    {
        self.execute_with_hooks(|_attempt| f(), |_, _, _| {}).await
    }

    /// Execute with retry logic, calling `on_retry(failed_attempt, error, delay)`
    /// before each backoff sleep.
    pub async fn execute_with_hooks<F, Fut, T, E, H>(
        &self,
        mut f: F,
        mut on_retry: H,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + std::fmt::Display,
        H: FnMut(u32, &E, Duration),
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            debug!("Executing attempt {} of {}", attempt, max_attempts);

            match f(attempt).await {
                Ok(result) => {
                    if attempt > 1 {
                        info!("Operation succeeded after {} attempts", attempt);
                    }
                    return Ok(result);
                }
                Err(error) => {
                    if !error.is_retryable() {
                        warn!("Operation failed with non-retryable error: {}", error);
                        return Err(RetryError::NonRetryableError {
                            attempts: attempt,
                            error,
                        });
                    }

                    if attempt >= max_attempts {
                        warn!("Operation failed after {} attempts: {}", attempt, error);
                        return Err(RetryError::MaxAttemptsExceeded {
                            attempts: attempt,
                            last_error: error,
                        });
                    }

                    let delay = error
                        .retry_delay()
                        .unwrap_or_else(|| self.policy.delay_for_attempt(attempt));

                    on_retry(attempt, &error, delay);

                    warn!(
                        "Attempt {} failed: {}. Retrying in {:?}",
                        attempt, error, delay
                    );
                    sleep(delay).await;

                    attempt += 1;
                }
            }
        }
    }
}

/// Retry error types
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    /// Maximum retry attempts exceeded
    #[error("Maximum retry attempts ({attempts}) exceeded. Last error: {last_error}")]
    MaxAttemptsExceeded { attempts: u32, last_error: E },

    /// Non-retryable error encountered
    #[error("Non-retryable error after {attempts} attempt(s): {error}")]
    NonRetryableError { attempts: u32, error: E },
}

impl<E> RetryError<E> {
    /// Number of attempts made before giving up
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::MaxAttemptsExceeded { attempts, .. }
            | RetryError::NonRetryableError { attempts, .. } => *attempts,
        }
    }

    /// Get the underlying error
    pub fn into_inner(self) -> E {
        match self {
            RetryError::MaxAttemptsExceeded { last_error, .. } => last_error,
            RetryError::NonRetryableError { error, .. } => error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Clone)]
    struct TestError {
        retryable: bool,
        message: String,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}", self.message)
        }
    }

    impl Retryable for TestError {
        fn is_retryable(&self) -> bool {
            self.retryable
        }
    }

    #[derive(Debug)]
    struct Throttled(Duration);

    impl std::fmt::Display for Throttled {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "throttled for {:?}", self.0)
        }
    }

    impl Retryable for Throttled {
        fn is_retryable(&self) -> bool {
            true
        }

        fn retry_delay(&self) -> Option<Duration> {
            Some(self.0)
        }
    }

    fn transient(message: &str) -> TestError {
        TestError {
            retryable: true,
            message: message.to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_success_after_failures() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let executor = RetryExecutor::new(RetryPolicy::fixed(2, Duration::from_millis(10)));

        let result = executor
            .execute(|| {
                let count = counter_clone.fetch_add(1, Ordering::Relaxed);
                async move {
                    if count < 2 {
                        Err(transient("Temporary failure"))
                    } else {
                        Ok("Success".to_string())
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "Success");
        assert_eq!(counter.load(Ordering::Relaxed), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_max_attempts_exceeded() {
        let executor = RetryExecutor::new(RetryPolicy::fixed(1, Duration::from_millis(1)));

        let result: Result<(), RetryError<TestError>> = executor
            .execute(|| async { Err(transient("Always fails")) })
            .await;

        let err = result.unwrap_err();
        assert_eq!(err.attempts(), 2);
        assert!(matches!(err, RetryError::MaxAttemptsExceeded { .. }));
    }

    #[tokio::test]
    async fn test_non_retryable_error_stops_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();
        let executor = RetryExecutor::new(RetryPolicy::default());

        let result: Result<(), RetryError<TestError>> = executor
            .execute(|| {
                calls_clone.fetch_add(1, Ordering::Relaxed);
                async {
                    Err(TestError {
                        retryable: false,
                        message: "Non-retryable".to_string(),
                    })
                }
            })
            .await;

        assert!(matches!(
            result.unwrap_err(),
            RetryError::NonRetryableError { attempts: 1, .. }
        ));
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_retries_makes_one_attempt() {
        let executor = RetryExecutor::new(RetryPolicy::fixed(0, Duration::from_secs(1)));

        let result: Result<(), RetryError<TestError>> =
            executor.execute(|| async { Err(transient("boom")) }).await;

        assert_eq!(result.unwrap_err().attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hooks_see_each_retry_and_delay() {
        let executor = RetryExecutor::new(RetryPolicy::fixed(3, Duration::from_millis(250)));
        let mut seen = Vec::new();
        let started = tokio::time::Instant::now();

        let result = executor
            .execute_with_hooks(
                |attempt| async move {
                    if attempt < 3 {
                        Err(transient("not yet"))
                    } else {
                        Ok(attempt)
                    }
                },
                |attempt, err: &TestError, delay| {
                    seen.push((attempt, err.message.clone(), delay));
                },
            )
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(
            seen,
            vec![
                (1, "not yet".to_string(), Duration::from_millis(250)),
                (2, "not yet".to_string(), Duration::from_millis(250)),
            ]
        );
        assert!(started.elapsed() >= Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_delay_overrides_policy() {
        let executor = RetryExecutor::new(RetryPolicy::fixed(1, Duration::from_millis(10)));
        let mut delays = Vec::new();

        let result: Result<(), RetryError<Throttled>> = executor
            .execute_with_hooks(
                |_| async { Err(Throttled(Duration::from_secs(3))) },
                |_, _, delay| delays.push(delay),
            )
            .await;

        assert_eq!(result.unwrap_err().attempts(), 2);
        assert_eq!(delays, vec![Duration::from_secs(3)]);
    }

    #[test]
    fn test_exponential_policy_grows_to_cap() {
        let mut policy = RetryPolicy::exponential(6, Duration::from_millis(100), Duration::from_millis(500));
        assert!(policy.jitter);
        policy.jitter = false;

        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(5), Duration::from_millis(500));
    }
}
