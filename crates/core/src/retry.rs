//! Retry primitive with an evolving backoff interval
//!
//! Re-runs a fallible async operation on designated failure kinds, sleeping
//! between attempts. The sleep interval evolves through a caller-suppliable
//! growth function (doubling by default) and is capped by the config. Only
//! the calling task blocks during the sleep.

use std::time::{Duration, Instant};

use crate::config::RetryConfig;
use crate::error::{Error, Result};

/// How the sleep interval evolves: `(previous_ms, attempt_index) -> next_ms`
pub type DelayGrowth = fn(u64, u32) -> u64;

/// Default growth: double the delay each attempt
pub fn double_delay(previous_ms: u64, _attempt: u32) -> u64 {
    previous_ms.saturating_mul(2)
}

/// Retry a fallible async operation with the default doubling backoff
///
/// # Arguments
/// * `config` - Retry configuration
/// * `operation` - Async closure that returns `Result<T>`
/// * `is_retryable` - Closure that determines if an error should trigger retry
///
/// # Example
/// ```ignore
/// let result = retry_with_backoff(
///     &config,
///     || async { adapter.get(container, name).await },
///     Error::is_retryable,
/// ).await;
/// ```
pub async fn retry_with_backoff<T, F, Fut, R>(
    config: &RetryConfig,
    operation: F,
    is_retryable: R,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
    R: Fn(&Error) -> bool,
{
    retry_with_backoff_using(config, double_delay, None, operation, is_retryable).await
}

/// Retry with a caller-supplied delay growth function and optional deadline.
///
/// The operation is invoked at most `config.max_attempts` times, sleeping
/// between attempts (never after the last). Non-eligible failures and the
/// final attempt's outcome propagate unchanged. The deadline, if present, is
/// checked before each sleep: once past it, no further attempt is made.
pub async fn retry_with_backoff_using<T, F, Fut, R>(
    config: &RetryConfig,
    grow: DelayGrowth,
    deadline: Option<Instant>,
    mut operation: F,
    is_retryable: R,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
    R: Fn(&Error) -> bool,
{
    let mut attempt = 0;
    let mut delay_ms = config.initial_backoff_ms;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if attempt >= config.max_attempts || !is_retryable(&e) {
                    return Err(e);
                }
                if past_deadline(deadline) {
                    tracing::debug!(attempt, "deadline passed, not retrying");
                    return Err(e);
                }

                let backoff = delay_ms.min(config.max_backoff_ms);
                tracing::debug!(
                    attempt = attempt,
                    backoff_ms = backoff,
                    error = %e,
                    "Retrying after transient error"
                );

                tokio::time::sleep(Duration::from_millis(backoff)).await;
                delay_ms = grow(delay_ms, attempt);
            }
        }
    }
}

pub(crate) fn past_deadline(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|d| Instant::now() >= d)
}

/// Retry configuration builder for easy customization
#[derive(Debug, Clone)]
pub struct RetryBuilder {
    max_attempts: u32,
    initial_backoff_ms: u64,
    max_backoff_ms: u64,
}

impl RetryBuilder {
    pub fn new() -> Self {
        let defaults = RetryConfig::default();
        Self {
            max_attempts: defaults.max_attempts,
            initial_backoff_ms: defaults.initial_backoff_ms,
            max_backoff_ms: defaults.max_backoff_ms,
        }
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    pub fn initial_backoff_ms(mut self, ms: u64) -> Self {
        self.initial_backoff_ms = ms;
        self
    }

    pub fn max_backoff_ms(mut self, ms: u64) -> Self {
        self.max_backoff_ms = ms;
        self
    }

    pub fn build(self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            initial_backoff_ms: self.initial_backoff_ms,
            max_backoff_ms: self.max_backoff_ms,
        }
    }
}

impl Default for RetryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_backoff_ms: 1,
            max_backoff_ms: 10,
        }
    }

    #[test]
    fn test_double_delay() {
        assert_eq!(double_delay(100, 1), 200);
        assert_eq!(double_delay(200, 2), 400);
        assert_eq!(double_delay(u64::MAX, 3), u64::MAX);
    }

    #[test]
    fn test_retry_builder() {
        let config = RetryBuilder::new()
            .max_attempts(5)
            .initial_backoff_ms(200)
            .max_backoff_ms(20000)
            .build();

        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.initial_backoff_ms, 200);
        assert_eq!(config.max_backoff_ms, 20000);
    }

    #[tokio::test]
    async fn test_retry_success_first_attempt() {
        let config = RetryConfig::default();
        let mut calls = 0;

        let result = retry_with_backoff(
            &config,
            || {
                calls += 1;
                async { Ok::<_, Error>(42) }
            },
            |_| true,
        )
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_retry_success_after_failure() {
        let call_count = Arc::new(AtomicU32::new(0));
        let call_count_clone = call_count.clone();

        let result = retry_with_backoff(
            &fast_config(3),
            || {
                let cc = call_count_clone.clone();
                async move {
                    let count = cc.fetch_add(1, Ordering::SeqCst);
                    if count < 2 {
                        Err(Error::Unavailable("busy".to_string()))
                    } else {
                        Ok(42)
                    }
                }
            },
            Error::is_retryable,
        )
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(call_count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_exhausted_calls_at_most_max_attempts() {
        let mut calls = 0;

        let result: Result<()> = retry_with_backoff(
            &fast_config(2),
            || {
                calls += 1;
                async { Err(Error::Unavailable("always fails".to_string())) }
            },
            |_| true,
        )
        .await;

        assert!(matches!(result, Err(Error::Unavailable(_))));
        assert_eq!(calls, 2);
    }

    #[tokio::test]
    async fn test_retry_non_retryable_propagates_immediately() {
        let mut calls = 0;

        let result: Result<()> = retry_with_backoff(
            &fast_config(3),
            || {
                calls += 1;
                async { Err(Error::NotFound("not found".to_string())) }
            },
            Error::is_retryable,
        )
        .await;

        assert!(matches!(result, Err(Error::NotFound(_))));
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_custom_growth_function() {
        fn constant(previous_ms: u64, _attempt: u32) -> u64 {
            previous_ms
        }

        let mut calls = 0;
        let result: Result<()> = retry_with_backoff_using(
            &fast_config(4),
            constant,
            None,
            || {
                calls += 1;
                async { Err(Error::Unavailable("busy".to_string())) }
            },
            Error::is_retryable,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls, 4);
    }

    #[tokio::test]
    async fn test_past_deadline_stops_retrying() {
        let mut calls = 0;
        let deadline = Some(Instant::now() - Duration::from_millis(1));

        let result: Result<()> = retry_with_backoff_using(
            &fast_config(5),
            double_delay,
            deadline,
            || {
                calls += 1;
                async { Err(Error::Unavailable("busy".to_string())) }
            },
            Error::is_retryable,
        )
        .await;

        assert!(result.is_err());
        // the first attempt runs; the expired deadline forbids any sleep
        assert_eq!(calls, 1);
    }
}
