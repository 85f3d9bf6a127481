// crates/quarry-server/src/resilience/mod.rs
// Circuit breaking and retry for provider calls

mod circuit_breaker;
mod retry;

pub use circuit_breaker::{
    BreakerConfig, BreakerPair, BreakerSnapshot, CircuitBreaker, CircuitState,
};
pub use retry::{RetryPolicy, RetryPredicate, is_pre_first_byte, is_transient};

use crate::error::{QuarryError, Result};
use std::future::Future;
use std::sync::Arc;

/// A breaker and a retry policy applied together to one call category.
///
/// Order is fixed: breaker gate, then the retry loop, then outcome recording.
/// An open breaker fails fast without entering the retry loop.
#[derive(Debug, Clone)]
pub struct Guard {
    provider: String,
    breaker: Arc<CircuitBreaker>,
    policy: RetryPolicy,
}

impl Guard {
    pub fn new(provider: impl Into<String>, breaker: Arc<CircuitBreaker>, policy: RetryPolicy) -> Self {
        Self {
            provider: provider.into(),
            breaker,
            policy,
        }
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    fn admit(&self) -> Result<()> {
        if self.breaker.should_allow_request() {
            Ok(())
        } else {
            Err(QuarryError::CircuitOpen(self.breaker.name().to_string()))
        }
    }

    /// Run a complete call. Success and failure are both recorded.
    pub async fn call<T, F, Fut>(&self, label: &str, op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.admit()?;
        match self.policy.execute(label, op).await {
            Ok(value) => {
                self.breaker.record_success();
                Ok(value)
            }
            Err(e) => Err(self.settle_failure(e)),
        }
    }

    /// Run the connection phase of a stream. Only failure is recorded here;
    /// the stream itself records the outcome once it finishes.
    pub async fn connect<T, F, Fut>(&self, label: &str, op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.admit()?;
        self.policy
            .execute(label, op)
            .await
            .map_err(|e| self.settle_failure(e))
    }

    /// Record the breaker outcome of a failed call and promote an exhausted
    /// transient error to `ProviderUnavailable`.
    fn settle_failure(&self, err: QuarryError) -> QuarryError {
        if counts_against_breaker(&err) {
            self.breaker.record_failure();
        }
        let exhausted = self.policy.is_retryable(&err);
        match err {
            QuarryError::Provider { provider, source } if exhausted => {
                QuarryError::ProviderUnavailable {
                    provider,
                    attempts: self.policy.max_attempts.max(1),
                    source,
                }
            }
            other => other,
        }
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }
}

/// Provider failures trip the breaker. Parse errors and cancellation do not:
/// the provider answered, or nobody is listening.
pub fn counts_against_breaker(err: &QuarryError) -> bool {
    matches!(
        err,
        QuarryError::Provider { .. } | QuarryError::ProviderUnavailable { .. }
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn guard(threshold: u32) -> Guard {
        let breaker = Arc::new(CircuitBreaker::new(
            "test-completion",
            BreakerConfig {
                failure_threshold: threshold,
                recovery_timeout: Duration::from_secs(60),
                success_threshold: 1,
            },
        ));
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            ..RetryPolicy::full_call()
        };
        Guard::new("test", breaker, policy)
    }

    #[tokio::test]
    async fn test_success_passes_through() {
        let g = guard(2);
        let value = g.call("ok", || async { Ok(42) }).await.unwrap();
        assert_eq!(value, 42);
        assert_eq!(g.breaker().state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_exhausted_transient_becomes_unavailable() {
        let g = guard(5);
        let err = g
            .call("down", || async {
                Err::<(), _>(QuarryError::provider("test", ProviderError::Timeout))
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            QuarryError::ProviderUnavailable { attempts: 3, source: ProviderError::Timeout, .. }
        ));
        assert_eq!(g.breaker().snapshot().failure_count, 1);
    }

    #[tokio::test]
    async fn test_open_breaker_skips_retry_loop() {
        let g = guard(1);
        let _ = g
            .call("trip", || async {
                Err::<(), _>(QuarryError::provider("test", ProviderError::Timeout))
            })
            .await;
        assert_eq!(g.breaker().state(), CircuitState::Open);

        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let err = g
            .call("rejected", move || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .await
            .unwrap_err();
        assert!(matches!(err, QuarryError::CircuitOpen(name) if name == "test-completion"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_schema_errors_do_not_trip_breaker() {
        let g = guard(1);
        let err = g
            .call("parse", || async {
                Err::<(), _>(QuarryError::SchemaParse {
                    reason: "no candidate".into(),
                    raw: "{}".into(),
                })
            })
            .await
            .unwrap_err();
        assert!(matches!(err, QuarryError::SchemaParse { .. }));
        assert_eq!(g.breaker().state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_connect_does_not_record_success() {
        let g = guard(1);
        g.connect("stream-open", || async { Ok(()) }).await.unwrap();
        // Failure count untouched and no half-open bookkeeping happened
        let snap = g.breaker().snapshot();
        assert_eq!(snap.failure_count, 0);
        assert_eq!(snap.success_count, 0);
    }

    #[tokio::test]
    async fn test_terminal_provider_error_is_not_promoted() {
        let g = guard(5);
        let err = g
            .call("bad", || async {
                Err::<(), _>(QuarryError::provider(
                    "test",
                    ProviderError::Request { status: 401, body: "unauthorized".into() },
                ))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, QuarryError::Provider { .. }));
        assert_eq!(g.breaker().snapshot().failure_count, 1);
    }
}
