use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter as GovernorLimiter};
use serde::Serialize;

type DirectRateLimiter = GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Request cadence for calls to upstream sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub requests_per_minute: u32,
    /// Minimum spacing between two consecutive requests.
    pub delay_between_requests: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_minute: 20,
            delay_between_requests: Duration::from_secs(3),
        }
    }
}

impl RateLimitConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

/// Process-wide request budget shared by every source adapter.
///
/// Cloning shares the same budget. [`RateLimiter::acquire`] waits until a
/// request may be sent.
#[derive(Clone)]
pub struct RateLimiter {
    limiter: Option<Arc<DirectRateLimiter>>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        let limiter = config
            .enabled
            .then(|| Arc::new(GovernorLimiter::direct(quota_from_config(config))));
        Self { limiter }
    }

    pub fn unlimited() -> Self {
        Self { limiter: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.limiter.is_some()
    }

    /// Take one request from the budget without waiting.
    pub fn try_acquire(&self) -> bool {
        self.limiter
            .as_ref()
            .map_or(true, |limiter| limiter.check().is_ok())
    }

    /// Wait until the budget allows one more request.
    pub async fn acquire(&self) {
        let Some(limiter) = &self.limiter else {
            return;
        };
        if limiter.check().is_ok() {
            return;
        }

        let started = Instant::now();
        limiter.until_ready().await;
        tracing::debug!(
            waited_ms = started.elapsed().as_millis() as u64,
            "rate limit budget replenished"
        );
    }
}

/// Spacing is the larger of `60s / requests_per_minute` and the configured
/// minimum delay. Without a minimum delay the whole minute's budget may burst.
fn quota_from_config(config: &RateLimitConfig) -> Quota {
    let per_minute = config.requests_per_minute.max(1);
    let window_spacing = Duration::from_secs(60) / per_minute;
    let period = window_spacing
        .max(config.delay_between_requests)
        .max(Duration::from_millis(1));

    let burst = if config.delay_between_requests.is_zero() {
        NonZeroU32::new(per_minute).unwrap_or(NonZeroU32::MIN)
    } else {
        NonZeroU32::MIN
    };

    Quota::with_period(period)
        .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
        .allow_burst(burst)
}
