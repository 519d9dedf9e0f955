//! Per-provider rate-limit cooldown and availability cache.
//!
//! A [`RateLimiter`] never touches the network. It records two things for
//! its owning provider:
//!
//! - a cooldown deadline set when the provider signals a rate limit
//!   (HTTP 429); until that instant the provider is unavailable
//! - the last health-probe result and when it was taken, so probes are
//!   not repeated on every request
//!
//! Time is read from [`tokio::time::Instant`], so tests can pause and
//! advance the clock.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::telemetry;

#[derive(Debug, Default)]
struct LimiterState {
    reset_at: Option<Instant>,
    availability: Option<bool>,
    availability_at: Option<Instant>,
}

/// Cooldown and availability-cache tracking for one provider.
#[derive(Debug, Default)]
pub struct RateLimiter {
    state: Mutex<LimiterState>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, LimiterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// True while the cooldown deadline lies in the future.
    pub fn is_rate_limited(&self) -> bool {
        match self.state().reset_at {
            Some(reset_at) => Instant::now() < reset_at,
            None => false,
        }
    }

    /// Remaining cooldown, if the provider is currently rate limited.
    pub fn reset_in(&self) -> Option<Duration> {
        let reset_at = self.state().reset_at?;
        let now = Instant::now();
        (now < reset_at).then(|| reset_at - now)
    }

    /// Start a cooldown of `wait` and mark the provider unavailable.
    ///
    /// A zero `wait` clears any cooldown and marks the provider available.
    pub fn set_rate_limit(&self, wait: Duration, source: &str) {
        let now = Instant::now();
        let mut state = self.state();
        if wait.is_zero() {
            state.reset_at = None;
            state.availability = Some(true);
            state.availability_at = Some(now);
            debug!(provider = source, "rate limit cleared");
            return;
        }

        state.reset_at = Some(now + wait);
        state.availability = Some(false);
        state.availability_at = Some(now);
        metrics::counter!(telemetry::RATE_LIMITS_TOTAL, "provider" => source.to_owned())
            .increment(1);
        warn!(
            provider = source,
            wait_secs = wait.as_secs_f64(),
            "provider rate limited, cooling down"
        );
    }

    /// Cached availability if it is younger than `ttl`, else `None`.
    pub fn check_availability_cache(&self, ttl: Duration) -> Option<bool> {
        let state = self.state();
        let taken_at = state.availability_at?;
        if Instant::now().duration_since(taken_at) < ttl {
            state.availability
        } else {
            None
        }
    }

    /// Record a fresh probe result.
    pub fn update_availability_cache(&self, available: bool) {
        let mut state = self.state();
        state.availability = Some(available);
        state.availability_at = Some(Instant::now());
    }

    /// Forget the cached probe result, forcing the next check to re-probe.
    pub fn clear_availability_cache(&self) {
        let mut state = self.state();
        state.availability = None;
        state.availability_at = None;
    }
}
