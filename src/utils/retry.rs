//! Retry utilities for resilient operations
//!
//! Exponential backoff used by the per-source limiter. `max_retries`
//! counts total attempts: a policy with `max_retries = 3` calls the
//! operation at most three times, sleeping `base`, then `2 * base`
//! between attempts.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    pub max_retries: u32,

    /// Delay before the second attempt
    pub base_delay: Duration,

    /// Cap on any single backoff delay
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1500),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Create a new retry configuration with custom max attempts
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// Create a retry configuration with custom delays
    pub fn with_delays(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
            backoff_multiplier: 2.0,
        }
    }

    /// Total attempts this policy allows (never less than one)
    pub fn attempts(&self) -> u32 {
        self.max_retries.max(1)
    }

    /// Delay to sleep before `attempt` (1-based)
    ///
    /// The first attempt runs immediately; attempt `n >= 2` waits
    /// `base * multiplier^(n-2)`, capped at `max_delay`.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }

        let factor = self.backoff_multiplier.powi((attempt - 2) as i32);
        let secs = self.base_delay.as_secs_f64() * factor;
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }

        Duration::from_secs_f64(secs)
    }
}

/// Final error after the retry loop gave up
#[derive(Debug)]
pub struct RetryExhausted<E> {
    /// Attempts actually made
    pub attempts: u32,

    /// Error returned by the last attempt
    pub error: E,
}

/// Execute an operation with retry logic, using a custom retry predicate
///
/// Errors rejected by `should_retry` end the loop immediately. Returns
/// the value of the first successful attempt, or the last error together
/// with the number of attempts made.
///
/// # Example
///
/// ```no_run
/// use jobscout::utils::retry::{with_retry_if, RetryConfig};
///
/// # async fn example() {
/// let config = RetryConfig::new(3);
/// let result = with_retry_if(
///     &config,
///     || async { Err::<(), _>("connection reset") },
///     |e| e.contains("reset"),
/// )
/// .await;
/// assert_eq!(result.unwrap_err().attempts, 3);
/// # }
/// ```
pub async fn with_retry_if<T, E, F, Fut, P>(
    config: &RetryConfig,
    mut operation: F,
    should_retry: P,
) -> Result<T, RetryExhausted<E>>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let max_attempts = config.attempts();
    let mut attempt = 1;

    loop {
        if attempt > 1 {
            let delay = config.delay_before(attempt);
            debug!(
                attempt = attempt,
                delay_ms = delay.as_millis() as u64,
                "Retrying operation after delay"
            );
            tokio::time::sleep(delay).await;
        }

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    debug!(attempt = attempt, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) => {
                if !should_retry(&e) {
                    warn!(attempt = attempt, error = %e, "Non-retryable error encountered");
                    return Err(RetryExhausted { attempts: attempt, error: e });
                }

                if attempt >= max_attempts {
                    warn!(
                        attempt = attempt,
                        max_retries = config.max_retries,
                        error = %e,
                        "Operation failed, giving up"
                    );
                    return Err(RetryExhausted { attempts: attempt, error: e });
                }

                warn!(
                    attempt = attempt,
                    max_retries = config.max_retries,
                    error = %e,
                    "Operation failed, will retry"
                );
                attempt += 1;
            }
        }
    }
}

/// Execute an operation, retrying every error
pub async fn with_retry<T, E, F, Fut>(
    config: &RetryConfig,
    operation: F,
) -> Result<T, RetryExhausted<E>>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    with_retry_if(config, operation, |_| true).await
}
