//! Retry with exponential backoff around one provider call.
//!
//! ## Retry Strategy
//!
//! Rate limits (429) and overloads (5xx) are transient and frequent when many
//! regions are in flight. The delay before attempt `n + 1` is
//! `retry_backoff_ms * 2^(n-1)`, or the server's `Retry-After` when it sent
//! one, never longer than `max_backoff_ms`. With the defaults (500 ms base,
//! 3 attempts) the wait sequence is 500 ms → 1 s.
//!
//! ## Pool permits
//!
//! A permit from the caller's pool is held for one attempt only. Sleeping
//! between attempts happens without a permit so a backing-off call never
//! starves calls that could be making progress.

use crate::config::ParseConfig;
use crate::error::{CallError, CallFailure};
use std::future::Future;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tracing::{debug, warn};

/// How often and how patiently to retry a provider call.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Attempts including the first one. Always ≥ 1.
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    /// Decides whether an error is worth another attempt.
    pub retryable: fn(&CallError) -> bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&ParseConfig::default())
    }
}

impl From<&ParseConfig> for RetryPolicy {
    fn from(config: &ParseConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_backoff: Duration::from_millis(config.retry_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            retryable: CallError::is_retryable,
        }
    }
}

impl RetryPolicy {
    /// Delay after the `attempt`-th (1-based) failed attempt.
    pub fn backoff(&self, attempt: u32, err: &CallError) -> Duration {
        let delay = match err.retry_after_secs() {
            Some(secs) => Duration::from_secs(secs),
            None => self
                .base_backoff
                .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1))),
        };
        delay.min(self.max_backoff)
    }
}

/// A successful call and the number of attempts it took.
#[derive(Debug, Clone, PartialEq)]
pub struct Attempted<T> {
    pub value: T,
    pub attempts: u32,
}

/// Run `call` under `policy`, holding a permit from `pool` per attempt.
///
/// `call` receives the 1-based attempt number. On terminal failure the last
/// error is returned as a [`CallFailure`] tagged with `model`; a 429 that
/// survives every attempt becomes [`CallError::RateLimitExceeded`].
pub async fn call_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    pool: &Semaphore,
    model: &str,
    label: &str,
    mut call: F,
) -> Result<Attempted<T>, CallFailure>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, CallError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;

        let result = {
            let _permit = pool.acquire().await.map_err(|_| CallFailure {
                error: CallError::Transport {
                    detail: "worker pool closed".into(),
                },
                attempts: attempt - 1,
                model: model.to_string(),
            })?;
            call(attempt).await
        };

        let err = match result {
            Ok(value) => {
                if attempt > 1 {
                    debug!("{}: succeeded on attempt {}", label, attempt);
                }
                return Ok(Attempted {
                    value,
                    attempts: attempt,
                });
            }
            Err(err) => err,
        };

        if !(policy.retryable)(&err) {
            warn!("{}: attempt {} failed, not retryable: {}", label, attempt, err);
            return Err(failure(err, attempt, model));
        }

        if attempt >= max_attempts {
            warn!("{}: giving up after {} attempts: {}", label, attempt, err);
            let err = if err.is_rate_limited() {
                CallError::RateLimitExceeded {
                    attempts: attempt,
                    retry_after_secs: err.retry_after_secs(),
                }
            } else {
                err
            };
            return Err(failure(err, attempt, model));
        }

        let delay = policy.backoff(attempt, &err);
        warn!(
            "{}: retry {}/{} after {}ms: {}",
            label,
            attempt,
            max_attempts - 1,
            delay.as_millis(),
            err
        );
        sleep(delay).await;
    }
}

fn failure(error: CallError, attempts: u32, model: &str) -> CallFailure {
    CallFailure {
        error,
        attempts,
        model: model.to_string(),
    }
}
