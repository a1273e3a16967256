//! Classified outcomes and the bounded retry loop for Generator and Validator calls.

use crate::error::ProviderError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

/// Result of one call to an external collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    Success(T),
    /// Worth another attempt: timeouts, connection drops, rate limits, 5xx.
    Transient(String),
    /// Retrying cannot help.
    Permanent(String),
}

impl<T> Outcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Outcome<U> {
        match self {
            Outcome::Success(value) => Outcome::Success(f(value)),
            Outcome::Transient(message) => Outcome::Transient(message),
            Outcome::Permanent(message) => Outcome::Permanent(message),
        }
    }
}

impl<T> From<Result<T, ProviderError>> for Outcome<T> {
    fn from(result: Result<T, ProviderError>) -> Self {
        match result {
            Ok(value) => Outcome::Success(value),
            Err(err) if err.is_transient() => Outcome::Transient(err.to_string()),
            Err(err) => Outcome::Permanent(err.to_string()),
        }
    }
}

/// Why a retried call gave up.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RetryFailure {
    #[error("{0}")]
    Permanent(String),

    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },
}

/// Exponential backoff with full jitter and a fresh timeout per attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            attempt_timeout: Duration::from_secs(120),
        }
    }
}

impl RetryPolicy {
    /// Upper bound of the sleep after the given failed attempt (1-based).
    pub fn backoff_ceiling(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exp)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Full jitter: a uniform draw from `[0, ceiling]`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let ceiling = self.backoff_ceiling(attempt).as_millis() as u64;
        if ceiling == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=ceiling))
    }

    /// Run `op` until it succeeds, fails permanently, or the attempt budget is spent.
    ///
    /// `op` receives the 1-based attempt number. An attempt that outlives
    /// `attempt_timeout` counts as transient.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, RetryFailure>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Outcome<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let outcome = match timeout(self.attempt_timeout, op(attempt)).await {
                Ok(outcome) => outcome,
                Err(_) => Outcome::Transient(format!(
                    "attempt timed out after {:?}",
                    self.attempt_timeout
                )),
            };

            match outcome {
                Outcome::Success(value) => return Ok(value),
                Outcome::Permanent(message) => {
                    debug!(call = label, attempt, error = %message, "Permanent failure");
                    return Err(RetryFailure::Permanent(message));
                }
                Outcome::Transient(message) => {
                    if attempt >= max_attempts {
                        warn!(call = label, attempt, error = %message, "Retry budget exhausted");
                        return Err(RetryFailure::Exhausted {
                            attempts: attempt,
                            last: message,
                        });
                    }
                    let delay = self.backoff(attempt);
                    debug!(
                        call = label,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %message,
                        "Transient failure, retrying"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}
