// crates/quarry-server/src/resilience/retry.rs
// Bounded exponential-backoff retry for one fallible async call

use crate::error::{QuarryError, Result};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Decides whether an error is worth another attempt
pub type RetryPredicate = fn(&QuarryError) -> bool;

/// Immutable retry tuning for one call-site category
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub exponential_base: f64,
    pub retryable: RetryPredicate,
}

/// Connection refused / reset, or a 5xx before the body arrived
pub fn is_pre_first_byte(err: &QuarryError) -> bool {
    err.provider_error().is_some_and(|e| e.is_pre_first_byte())
}

/// Timeouts, network errors, rate limiting and 5xx
pub fn is_transient(err: &QuarryError) -> bool {
    err.provider_error().is_some_and(|e| e.is_transient())
}

impl RetryPolicy {
    /// Policy for opening a stream. Only failures that happen before the
    /// first byte are retried.
    pub const fn connection_establishment() -> Self {
        Self {
            max_attempts: 2,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(3),
            exponential_base: 2.0,
            retryable: is_pre_first_byte,
        }
    }

    /// Policy for non-streaming calls, retried end to end
    pub const fn full_call() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            exponential_base: 2.0,
            retryable: is_transient,
        }
    }

    /// Backoff before the retry that follows `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(32) as i32;
        let secs = self.base_delay.as_secs_f64() * self.exponential_base.powi(exp);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs.max(0.0))
    }

    pub fn is_retryable(&self, err: &QuarryError) -> bool {
        (self.retryable)(err)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or
    /// `max_attempts` is reached. The last error is returned unchanged.
    pub async fn execute<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < max_attempts && self.is_retryable(&e) => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        call = %label,
                        attempt,
                        max_attempts,
                        error = %e,
                        "Transient error, retrying in {:?}...",
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::full_call()
    }
}
