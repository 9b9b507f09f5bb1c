//! # Bounded Retry
//!
//! Exponential backoff with jitter around calls to external collaborators.
//! Each attempt runs under the configured operation timeout; the helper
//! returns either the first success or a terminal [`RetryError`].

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::RecoveryConfig;

/// Terminal outcome of a bounded retry loop
#[derive(Debug, Clone, PartialEq)]
pub enum RetryError<E> {
    /// Every attempt failed; carries the last error
    Exhausted { attempts: u32, last_error: E },
    /// The last attempt exceeded the operation timeout
    TimedOut { attempts: u32, timeout_secs: u64 },
    /// The operation reported an error that retrying cannot fix
    Aborted { attempts: u32, error: E },
}

impl<E> RetryError<E> {
    /// Number of attempts made before giving up
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. }
            | RetryError::TimedOut { attempts, .. }
            | RetryError::Aborted { attempts, .. } => *attempts,
        }
    }
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryError::Exhausted {
                attempts,
                last_error,
            } => write!(f, "gave up after {} attempts: {}", attempts, last_error),
            RetryError::TimedOut {
                attempts,
                timeout_secs,
            } => write!(
                f,
                "attempt {} timed out after {}s",
                attempts, timeout_secs
            ),
            RetryError::Aborted { attempts, error } => {
                write!(f, "non-retryable error on attempt {}: {}", attempts, error)
            }
        }
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for RetryError<E> {}

/// Calculate retry delay with exponential backoff and jitter
///
/// `attempt` is 1-based: the delay after the first failure is the base delay.
/// The exponential part is capped at `max_retry_delay_ms`, then up to 25% jitter is added.
pub fn calculate_retry_delay(attempt: u32, recovery: &RecoveryConfig) -> u64 {
    let base_delay = recovery.base_retry_delay_ms as f64;
    let exponential_delay = base_delay * (2.0_f64).powf(attempt.saturating_sub(1) as f64);
    let delay = exponential_delay.min(recovery.max_retry_delay_ms as f64) as u64;
    let jitter_range = delay / 4;
    let jitter = if jitter_range == 0 {
        0
    } else {
        rand::random::<u64>() % jitter_range
    };
    delay + jitter
}

/// Run `operation` until it succeeds, at most `recovery.max_retries` times in total.
///
/// Errors for which `is_retryable` returns false stop the loop immediately.
pub async fn retry_with_backoff<T, E, F, Fut, R>(
    operation_name: &str,
    recovery: &RecoveryConfig,
    is_retryable: R,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
    E: fmt::Display,
{
    let max_attempts = recovery.max_retries.max(1);
    let timeout = Duration::from_secs(recovery.operation_timeout_secs);
    let mut attempt = 0;

    loop {
        attempt += 1;

        let failure = match tokio::time::timeout(timeout, operation(attempt)).await {
            Ok(Ok(value)) => {
                if attempt > 1 {
                    debug!(
                        operation = %operation_name,
                        attempt = %attempt,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(value);
            }
            Ok(Err(err)) => {
                if !is_retryable(&err) {
                    return Err(RetryError::Aborted {
                        attempts: attempt,
                        error: err,
                    });
                }
                if attempt >= max_attempts {
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        last_error: err,
                    });
                }
                err.to_string()
            }
            Err(_) => {
                if attempt >= max_attempts {
                    return Err(RetryError::TimedOut {
                        attempts: attempt,
                        timeout_secs: recovery.operation_timeout_secs,
                    });
                }
                format!("timed out after {}s", recovery.operation_timeout_secs)
            }
        };

        let delay_ms = calculate_retry_delay(attempt, recovery);
        warn!(
            operation = %operation_name,
            attempt = %attempt,
            max_attempts = %max_attempts,
            "Attempt failed: {failure}. Retrying in {delay_ms}ms"
        );

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }
}
