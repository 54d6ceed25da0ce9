//! Per-source request pacing and retry
//!
//! Every request a source issues goes through its [`SourceLimiter`]:
//!
//! 1. a per-source gate serializes requests, so concurrent callers of the
//!    same source never bypass its pacing;
//! 2. a governor pacer enforces the minimum inter-request interval (plus
//!    optional jitter);
//! 3. failures the [`FetchError`] marks retryable are retried with
//!    exponential backoff until `max_retries` attempts were made.
//!
//! Backoff sleeps happen outside the gate.

use std::future::Future;
use std::num::NonZeroU32;
use std::time::Duration;

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Jitter, Quota, RateLimiter,
};
use tokio::sync::Mutex;

use crate::config::{ScraperConfig, MAX_DELAY_SECONDS};
use crate::utils::error::FetchError;
use crate::utils::retry::{with_retry_if, RetryConfig, RetryExhausted};

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Pacing and retry settings for one source
#[derive(Debug, Clone)]
pub struct LimiterPolicy {
    /// Minimum delay between two requests of the source (zero disables pacing)
    pub min_interval: Duration,

    /// Uniform random extra delay, up to this bound
    pub jitter: Duration,

    /// Retry/backoff policy for failed searches
    pub retry: RetryConfig,
}

impl Default for LimiterPolicy {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_secs(3),
            jitter: Duration::from_millis(500),
            retry: RetryConfig::default(),
        }
    }
}

impl LimiterPolicy {
    /// No pacing; backoff only
    pub fn unpaced(retry: RetryConfig) -> Self {
        Self {
            min_interval: Duration::ZERO,
            jitter: Duration::ZERO,
            retry,
        }
    }

    /// Policy for `source`, applying its overrides on top of the shared settings
    pub fn for_source(config: &ScraperConfig, source: &str) -> Self {
        let overrides = config.overrides.get(source);
        let rate_limit = overrides
            .and_then(|o| o.rate_limit_seconds)
            .unwrap_or(config.rate_limit_seconds);
        let max_retries = overrides
            .and_then(|o| o.max_retries)
            .unwrap_or(config.max_retries);

        Self {
            min_interval: secs(rate_limit),
            jitter: secs(config.jitter_seconds),
            retry: RetryConfig::with_delays(
                max_retries,
                secs(config.backoff_base_seconds),
                secs(config.backoff_max_seconds),
            ),
        }
    }
}

/// Non-positive and NaN map to zero; anything longer than a day is capped
fn secs(value: f64) -> Duration {
    if value > 0.0 {
        Duration::try_from_secs_f64(value.min(MAX_DELAY_SECONDS)).unwrap_or(Duration::ZERO)
    } else {
        Duration::ZERO
    }
}

/// Pacing gate and retry driver for one source
pub struct SourceLimiter {
    source: String,
    policy: LimiterPolicy,
    pacer: Option<DirectLimiter>,
    gate: Mutex<()>,
}

impl SourceLimiter {
    pub fn new(source: impl Into<String>, policy: LimiterPolicy) -> Self {
        let pacer = Quota::with_period(policy.min_interval)
            .map(|quota| RateLimiter::direct(quota.allow_burst(NonZeroU32::MIN)));

        Self {
            source: source.into(),
            policy,
            pacer,
            gate: Mutex::new(()),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn policy(&self) -> &LimiterPolicy {
        &self.policy
    }

    /// Wait until the source may issue its next request
    async fn pace(&self) {
        let Some(pacer) = &self.pacer else {
            return;
        };

        if self.policy.jitter.is_zero() {
            pacer.until_ready().await;
        } else {
            pacer
                .until_ready_with_jitter(Jitter::up_to(self.policy.jitter))
                .await;
        }
    }

    /// Run one logical request with pacing and retry
    ///
    /// `operation` is invoked once per attempt. On exhaustion the last
    /// error is returned with the number of attempts made; it is never
    /// fatal to the caller's run.
    pub async fn call<T, F, Fut>(&self, mut operation: F) -> Result<T, RetryExhausted<FetchError>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        with_retry_if(
            &self.policy.retry,
            || {
                let attempt = operation();
                async move {
                    let _turn = self.gate.lock().await;
                    self.pace().await;
                    let result = attempt.await;
                    if let Err(e) = &result {
                        tracing::debug!(
                            source = %self.source,
                            kind = e.kind(),
                            error = %e,
                            "Request failed"
                        );
                    }
                    result
                }
            },
            FetchError::is_retryable,
        )
        .await
    }
}

impl std::fmt::Debug for SourceLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceLimiter")
            .field("source", &self.source)
            .field("policy", &self.policy)
            .finish()
    }
}
