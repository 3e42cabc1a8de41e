//! Condition-gated retry
//!
//! Re-runs an entire multi-step operation until its result set satisfies a
//! caller-supplied predicate, on top of the same backoff schedule the retry
//! primitive uses. "Not yet met" is an internal outcome, not an exception;
//! it only becomes an error once the retry budget is exhausted, at which
//! point the final attempt's result travels with the error.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::RetryConfig;
use crate::error::Error;
use crate::retry::past_deadline;

/// A predicate over an operation's result set.
///
/// Conditions take the whole result by reference and answer yes or no; the
/// closure signature enforces the one-argument contract at compile time.
pub struct Condition<T: ?Sized> {
    name: Option<&'static str>,
    check: Arc<dyn Fn(&T) -> bool + Send + Sync>,
}

impl<T: ?Sized> Clone for Condition<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            check: Arc::clone(&self.check),
        }
    }
}

impl<T: ?Sized> fmt::Debug for Condition<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Condition({})", self.name.unwrap_or("<unnamed>"))
    }
}

impl<T: ?Sized> Condition<T> {
    pub fn new(check: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        Self {
            name: None,
            check: Arc::new(check),
        }
    }

    /// A condition labeled for retry diagnostics
    pub fn named(name: &'static str, check: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        Self {
            name: Some(name),
            check: Arc::new(check),
        }
    }

    pub fn check(&self, value: &T) -> bool {
        (self.check)(value)
    }

    pub fn name(&self) -> &'static str {
        self.name.unwrap_or("<unnamed>")
    }

    /// Both conditions must hold
    pub fn and(self, other: Condition<T>) -> Condition<T>
    where
        T: 'static,
    {
        Condition {
            name: self.name.or(other.name),
            check: Arc::new(move |value| (self.check)(value) && (other.check)(value)),
        }
    }
}

/// The result set never satisfied the condition within the retry budget
#[derive(Debug)]
pub struct ConditionNotMet<T> {
    /// The final attempt's result
    pub last: T,
    /// Attempts consumed
    pub attempts: u32,
}

/// Error surface of [`run_until`]
#[derive(Debug)]
pub enum GateError<T> {
    /// Retries exhausted with the predicate still false
    NotMet(ConditionNotMet<T>),
    /// The operation itself failed
    Op(Error),
}

impl<T> GateError<T> {
    /// Collapse into the taxonomy, rendering the last result set through
    /// `names_of` (object names are what gate callers inspect).
    pub fn into_error(self, names_of: impl Fn(&T) -> Vec<String>) -> Error {
        match self {
            GateError::Op(e) => e,
            GateError::NotMet(not_met) => Error::ConditionNotMet {
                attempts: not_met.attempts,
                last: names_of(&not_met.last),
            },
        }
    }
}

/// Run `operation` until `condition` holds over its result.
///
/// An unmet condition counts as an eligible failure: the *entire* operation
/// is re-run with a fresh attempt after the backoff sleep. Transient
/// operation errors (per [`Error::is_retryable`]) are retried on the same
/// budget. With no condition this is a single un-gated call. The deadline,
/// if present, is checked before every sleep.
pub async fn run_until<T, F, Fut>(
    config: &RetryConfig,
    mut operation: F,
    condition: Option<&Condition<T>>,
    deadline: Option<Instant>,
) -> Result<T, GateError<T>>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = crate::error::Result<T>>,
{
    let Some(condition) = condition else {
        return operation().await.map_err(GateError::Op);
    };

    let mut attempt = 0;
    let mut delay_ms = config.initial_backoff_ms;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => {
                if condition.check(&result) {
                    return Ok(result);
                }
                if attempt >= config.max_attempts || past_deadline(deadline) {
                    return Err(GateError::NotMet(ConditionNotMet {
                        last: result,
                        attempts: attempt,
                    }));
                }
                tracing::debug!(
                    attempt = attempt,
                    condition = condition.name(),
                    "condition not met, retrying whole operation"
                );
            }
            Err(e) => {
                if attempt >= config.max_attempts || !e.is_retryable() || past_deadline(deadline) {
                    return Err(GateError::Op(e));
                }
                tracing::debug!(attempt = attempt, error = %e, "Retrying after transient error");
            }
        }

        let backoff = delay_ms.min(config.max_backoff_ms);
        tokio::time::sleep(Duration::from_millis(backoff)).await;
        delay_ms = delay_ms.saturating_mul(2);
    }
}
