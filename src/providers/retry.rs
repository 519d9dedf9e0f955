//! Retry policy, backoff calculation, and the shared retry loop.
//!
//! [`RetryHandler`] decides *whether* another attempt is allowed;
//! [`with_retry()`] owns the loop that applies the backoff delay, the
//! per-call timeout, and rate-limit cooldowns. Every provider network
//! call (completion, embedding, health probe) goes through `with_retry()`,
//! keeping the policy in a single place.

use std::future::Future;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use super::rate_limit::RateLimiter;
use crate::telemetry;
use crate::{HuginnError, Result};

/// Cooldown applied when a provider rate-limits us without a wait hint.
pub const DEFAULT_RATE_LIMIT_WAIT: Duration = Duration::from_secs(60);

/// Configuration for retry behaviour.
///
/// Uses exponential backoff: `base_delay * 2^attempt`, capped at
/// `max_delay`.
///
/// ```rust
/// # use huginn::RetryConfig;
/// # use std::time::Duration;
/// let config = RetryConfig::new()
///     .max_retries(5)
///     .base_delay(Duration::from_millis(200));
/// assert_eq!(config.delay_for_attempt(2), Duration::from_millis(800));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the initial request).
    /// 1 = no retry. Default: 3.
    pub max_retries: u32,
    /// Delay before the first retry. Default: 1s.
    #[serde(rename = "base_delay_ms", with = "millis")]
    pub base_delay: Duration,
    /// Maximum delay between retries (caps exponential growth). Default: 30s.
    #[serde(rename = "max_delay_ms", with = "millis")]
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a config that disables retries (single attempt).
    pub fn disabled() -> Self {
        Self {
            max_retries: 1,
            ..Self::default()
        }
    }

    /// Set maximum attempts (including the initial request).
    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    /// Set the delay before the first retry.
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set the maximum delay between retries.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Delay to wait after the given attempt (0-indexed) fails.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt));
        delay.min(self.max_delay)
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// Bounded-attempt retry policy for one provider.
///
/// The error kind never changes the decision: every failure is retried
/// until the attempt budget runs out. Rate limits are the exception, and
/// they are handled by [`with_retry()`] before the handler is consulted.
#[derive(Debug, Clone)]
pub struct RetryHandler {
    provider: String,
    config: RetryConfig,
}

impl RetryHandler {
    pub fn new(provider: impl Into<String>, config: RetryConfig) -> Self {
        Self {
            provider: provider.into(),
            config,
        }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Whether a failed `attempt` (0-indexed) may be followed by another.
    pub fn should_retry(&self, attempt: u32, _error: Option<&HuginnError>) -> bool {
        attempt + 1 < self.config.max_retries
    }

    /// Backoff to apply after `attempt` fails.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.config.delay_for_attempt(attempt)
    }

    /// Record a retry. Has no effect beyond logging and metrics.
    pub fn log_retry(&self, operation: &str, attempt: u32, reason: &HuginnError) {
        metrics::counter!(telemetry::RETRIES_TOTAL,
            "provider" => self.provider.clone(),
            "operation" => operation.to_owned(),
        )
        .increment(1);
        warn!(
            provider = %self.provider,
            operation,
            attempt = attempt + 1,
            max_retries = self.config.max_retries,
            transient = reason.is_transient(),
            error = %reason,
            "retrying provider call"
        );
    }
}

/// Run `f` with timeout, retry, and rate-limit handling.
///
/// - every attempt is bounded by `timeout`; an elapsed timeout counts as an
///   ordinary failure
/// - a rate-limit error starts a cooldown on `limiter` and returns at once
/// - any other error is retried while [`RetryHandler::should_retry`] allows,
///   sleeping the exponential backoff in between
pub(crate) async fn with_retry<F, Fut, T>(
    handler: &RetryHandler,
    limiter: &RateLimiter,
    operation: &str,
    timeout: Duration,
    f: F,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        let err = match tokio::time::timeout(timeout, f()).await {
            Ok(Ok(result)) => return Ok(result),
            Ok(Err(e)) => e,
            Err(_) => HuginnError::Timeout(timeout),
        };

        if err.is_rate_limit() {
            let wait = err.retry_after().unwrap_or(DEFAULT_RATE_LIMIT_WAIT);
            limiter.set_rate_limit(wait, &handler.provider);
            return Err(err);
        }

        if !handler.should_retry(attempt, Some(&err)) {
            return Err(err);
        }

        handler.log_retry(operation, attempt, &err);
        tokio::time::sleep(handler.delay_for_attempt(attempt)).await;
        attempt += 1;
    }
}
