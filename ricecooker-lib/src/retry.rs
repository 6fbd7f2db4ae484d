//! Retry with backoff for cross-context delivery.
//!
//! Both the Control Panel (bounded, linear backoff) and the Coordinator
//! (unbounded, fixed interval) go through [`retry_with_backoff`].

use log::debug;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Errors that may succeed if the same operation is attempted again later.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Delay between a failed attempt and the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay after every failure.
    Fixed(Duration),
    /// Delay after failed attempt `k` (1-based) is `k * step`.
    Linear(Duration),
}

impl Backoff {
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::Fixed(delay) => delay,
            Backoff::Linear(step) => step.saturating_mul(attempt),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// `None` retries until the operation succeeds or fails permanently.
    pub max_attempts: Option<u32>,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn bounded(max_attempts: u32, backoff: Backoff) -> Self {
        RetryPolicy {
            max_attempts: Some(max_attempts.max(1)),
            backoff,
        }
    }

    pub fn unbounded(backoff: Backoff) -> Self {
        RetryPolicy {
            max_attempts: None,
            backoff,
        }
    }

    fn exhausted(&self, attempt: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempt >= max)
    }
}

/// Run `operation` until it succeeds, returns a non-retryable error, or the
/// policy runs out of attempts. The operation receives the 1-based attempt
/// number. The last error is returned unchanged.
pub async fn retry_with_backoff<T, E, F, Fut>(policy: &RetryPolicy, mut operation: F) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + Display,
{
    let mut attempt = 1u32;
    loop {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if policy.exhausted(attempt) || !err.is_retryable() {
                    return Err(err);
                }
                let delay = policy.backoff.delay(attempt);
                debug!("Attempt {} failed ({}), retrying in {:?}", attempt, err, delay);
                tokio::time::sleep(delay).await;
                attempt = attempt.saturating_add(1);
            }
        }
    }
}
