//! Bounded exponential-backoff retry.
//!
//! Attempt 1 runs immediately. After a transient failure of attempt `n` the
//! policy waits `min(initial_delay * backoff_base^(n-1), max_delay)` before
//! attempt `n + 1`, up to `max_attempts` attempts in total. Permanent
//! failures are returned on first occurrence.

use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Classifies an error as worth another attempt or not.
pub trait Retryable {
    fn retryable(&self) -> bool;
}

/// Retry parameters for one unit of work.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_base: f64,
    /// Spread each delay by up to +/- 50%, never above `max_delay`.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            backoff_base: 2.0,
            jitter: false,
        }
    }
}

impl RetryPolicy {
    /// Policy that retries without waiting.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            ..Self::default()
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let seconds = self.initial_delay.as_secs_f64() * self.backoff_base.powi(exponent);
        let capped = if seconds.is_finite() {
            seconds.min(self.max_delay.as_secs_f64())
        } else {
            self.max_delay.as_secs_f64()
        };
        let delay = Duration::from_secs_f64(capped.max(0.0));

        if !self.jitter || delay.is_zero() {
            return delay;
        }

        let jitter_ms = (delay.as_millis() as f64 * 0.5) as u64;
        let offset = fastrand::u64(0..=(jitter_ms * 2));
        let total_ms = (delay.as_millis() as i64 + offset as i64 - jitter_ms as i64).max(0);
        Duration::from_millis(total_ms as u64).min(self.max_delay)
    }
}

/// What happened on one attempt, handed to the caller's hook.
#[derive(Debug)]
pub struct AttemptEvent<'a, E> {
    pub attempt: u32,
    pub max_attempts: u32,
    /// `None` when the attempt succeeded.
    pub error: Option<&'a E>,
    /// Wait before the next attempt, when one will be made.
    pub next_delay: Option<Duration>,
}

/// Terminal outcome of a failed retry loop.
#[derive(Debug, Error)]
pub enum RetryError<E: std::error::Error + 'static> {
    #[error("{0}")]
    Permanent(#[source] E),

    #[error("retries exhausted after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: E,
    },
}

impl<E: std::error::Error + 'static> RetryError<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Permanent(_) => 1,
            Self::Exhausted { attempts, .. } => *attempts,
        }
    }
}

/// Run `operation` under `policy`, reporting every attempt to `hook`.
///
/// `operation` receives the 1-based attempt number.
///
/// # Errors
/// Returns [`RetryError::Permanent`] for the first non-retryable error and
/// [`RetryError::Exhausted`] with the last error once `max_attempts`
/// transient failures have been seen.
pub async fn run_with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    mut operation: F,
    hook: &mut (dyn FnMut(&AttemptEvent<'_, E>) + Send),
) -> Result<T, RetryError<E>>
where
    E: Retryable + std::error::Error + 'static,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0_u32;

    loop {
        attempt += 1;
        let error = match operation(attempt).await {
            Ok(value) => {
                hook(&AttemptEvent {
                    attempt,
                    max_attempts,
                    error: None,
                    next_delay: None,
                });
                return Ok(value);
            }
            Err(error) => error,
        };

        if !error.retryable() {
            hook(&AttemptEvent {
                attempt,
                max_attempts,
                error: Some(&error),
                next_delay: None,
            });
            return Err(RetryError::Permanent(error));
        }

        if attempt >= max_attempts {
            hook(&AttemptEvent {
                attempt,
                max_attempts,
                error: Some(&error),
                next_delay: None,
            });
            tracing::error!(attempt, max_attempts, error = %error, "retries exhausted");
            return Err(RetryError::Exhausted {
                attempts: attempt,
                last: error,
            });
        }

        let delay = policy.delay_after(attempt);
        hook(&AttemptEvent {
            attempt,
            max_attempts,
            error: Some(&error),
            next_delay: Some(delay),
        });
        tracing::warn!(
            attempt,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "transient failure, will retry"
        );
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}
