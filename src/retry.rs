//! Retry logic with exponential backoff
//!
//! Every pipeline stage call goes through [`with_retry`]. Errors classify
//! themselves through [`IsRetryable`]; transient failures are retried with
//! exponential backoff (optionally jittered) until `max_attempts` calls have
//! been made, permanent failures are returned immediately.
//!
//! # Example
//!
//! ```no_run
//! use profile_extract::retry::{IsRetryable, with_retry};
//! use profile_extract::config::RetryConfig;
//!
//! #[derive(Debug)]
//! enum MyError {
//!     Transient,
//!     Permanent,
//! }
//!
//! impl std::fmt::Display for MyError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{:?}", self)
//!     }
//! }
//!
//! impl IsRetryable for MyError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, MyError::Transient)
//!     }
//! }
//!
//! # async fn example() -> Result<(), MyError> {
//! let config = RetryConfig::default();
//! let attempted = with_retry(&config, || async {
//!     // Your operation here
//!     Ok::<_, MyError>(())
//! })
//! .await;
//! attempted.result?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::{FetchError, ModelError, ReduceError, is_transient_status};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (timeouts, rate limiting, connection resets, 5xx) return `true`.
/// Permanent failures (404, malformed content, schema-invalid model output) return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for FetchError {
    fn is_retryable(&self) -> bool {
        match self {
            FetchError::Timeout(_) | FetchError::Connect(_) => true,
            FetchError::Status { status, .. } => is_transient_status(*status),
            // Truncated bodies usually mean the connection dropped mid-transfer
            FetchError::Body(_) => true,
            FetchError::InvalidUrl { .. } | FetchError::Transport(_) => false,
        }
    }
}

impl IsRetryable for ReduceError {
    fn is_retryable(&self) -> bool {
        // Reducing the same bytes again yields the same result
        false
    }
}

impl IsRetryable for ModelError {
    fn is_retryable(&self) -> bool {
        match self {
            ModelError::Timeout(_) | ModelError::RateLimited { .. } | ModelError::Transport(_) => {
                true
            }
            ModelError::Api { status, .. } => is_transient_status(*status),
            ModelError::MissingCredentials(_) | ModelError::InvalidOutput(_) => false,
        }
    }
}

/// Result of an operation run under the retry policy
#[derive(Debug)]
pub struct Attempted<T, E> {
    /// Final result: the first success, or the last error
    pub result: Result<T, E>,
    /// Number of calls made (at least 1)
    pub attempts: u32,
}

/// Execute an async operation with exponential backoff retry logic
///
/// # Arguments
///
/// * `config` - Retry configuration (max attempts, delays, backoff multiplier, jitter)
/// * `operation` - Async closure that returns `Result<T, E>` where `E` implements [`IsRetryable`]
///
/// # Returns
///
/// The successful result or the last error, together with the number of calls made.
/// `config.max_attempts` bounds the total number of calls; a value of 0 is
/// treated as 1.
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Attempted<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempts = 0;

    loop {
        attempts += 1;
        match operation().await {
            Ok(value) => {
                if attempts > 1 {
                    tracing::info!(attempts, "Operation succeeded after retry");
                }
                return Attempted {
                    result: Ok(value),
                    attempts,
                };
            }
            Err(e) if e.is_retryable() && attempts < max_attempts => {
                let delay = retry_delay(config, attempts);

                tracing::warn!(
                    error = %e,
                    attempt = attempts,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Operation failed, retrying"
                );

                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::warn!(
                        error = %e,
                        attempts,
                        "Operation failed after all retry attempts exhausted"
                    );
                } else {
                    tracing::debug!(error = %e, "Operation failed with non-retryable error");
                }
                return Attempted {
                    result: Err(e),
                    attempts,
                };
            }
        }
    }
}

/// Delay to wait after the given (1-based) failed attempt, before jitter
///
/// `initial_delay * multiplier^(attempt - 1)`, capped at `max_delay`.
pub fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
    let secs = config.initial_delay.as_secs_f64() * config.backoff_multiplier.powi(exponent);
    if !secs.is_finite() || secs >= config.max_delay.as_secs_f64() {
        return config.max_delay;
    }
    Duration::from_secs_f64(secs)
}

/// Sleep before the next attempt: backoff plus optional jitter, never above `max_delay`
fn retry_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let delay = backoff_delay(config, attempt);
    if config.jitter {
        add_jitter(delay).min(config.max_delay)
    } else {
        delay
    }
}

/// Add random jitter to a delay to prevent thundering herd
///
/// Jitter is uniformly distributed between 0% and 100% of the delay,
/// so the jittered delay lands between `delay` and `2 * delay` before the
/// `max_delay` cap in [`retry_delay`].
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}
