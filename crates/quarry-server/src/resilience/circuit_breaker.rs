// crates/quarry-server/src/resilience/circuit_breaker.rs
// Circuit breaker for provider classes: stops calling a dependency that keeps
// failing and probes it again after a cool-down.

use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Tuning for one breaker instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerConfig {
    /// Consecutive failures (while closed) that trip the circuit
    pub failure_threshold: u32,
    /// How long an open circuit rejects calls before allowing trial traffic
    pub recovery_timeout: Duration,
    /// Consecutive half-open successes needed to close again
    pub success_threshold: u32,
}

impl BreakerConfig {
    /// Streaming calls recover faster: a stream either connects or it doesn't
    pub const fn streaming() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
            success_threshold: 2,
        }
    }

    pub const fn completion() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            success_threshold: 2,
        }
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self::completion()
    }
}

/// Externally visible circuit state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Normal operation
    Closed,
    /// Tripped, calls are rejected until the recovery timeout elapses
    Open,
    /// Recovery timeout elapsed, trial calls decide whether to close
    HalfOpen,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure: Option<Instant>,
}

/// Point-in-time view for health reporting
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    /// Seconds since the last recorded failure
    pub last_failure_secs: Option<u64>,
}

/// Thread-safe tri-state circuit breaker.
///
/// One instance is shared (behind `Arc`) by every call through a provider
/// class for the lifetime of the process.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                last_failure: None,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> BreakerConfig {
        self.config
    }

    // A poisoned lock only means another caller panicked mid-update; the
    // counters are still usable.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Check whether a call may proceed.
    ///
    /// An open circuit whose recovery timeout has elapsed moves to half-open
    /// and lets the call through.
    pub fn should_allow_request(&self) -> bool {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = inner
                    .last_failure
                    .map(|t| t.elapsed() >= self.config.recovery_timeout)
                    .unwrap_or(true);
                if elapsed {
                    info!(breaker = %self.name, "Circuit half-open, allowing trial requests");
                    inner.state = CircuitState::HalfOpen;
                    inner.success_count = 0;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record a successful call
    pub fn record_success(&self) {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.failure_count = 0;
            }
            CircuitState::HalfOpen => {
                inner.success_count += 1;
                if inner.success_count >= self.config.success_threshold {
                    inner.state = CircuitState::Closed;
                    inner.failure_count = 0;
                    inner.success_count = 0;
                    info!(breaker = %self.name, "Circuit closed - service recovered");
                }
            }
            CircuitState::Open => {
                // A call admitted before the trip finished late; ignore it.
                debug!(breaker = %self.name, "Success recorded while open");
            }
        }
    }

    /// Record a failed call, which may trip the circuit
    pub fn record_failure(&self) {
        let mut inner = self.lock();
        inner.last_failure = Some(Instant::now());

        match inner.state {
            CircuitState::HalfOpen => {
                warn!(breaker = %self.name, "Trial request failed - circuit re-opened");
                inner.state = CircuitState::Open;
                inner.failure_count = self.config.failure_threshold;
                inner.success_count = 0;
            }
            CircuitState::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.config.failure_threshold {
                    warn!(
                        breaker = %self.name,
                        failures = inner.failure_count,
                        "Circuit opened - rejecting calls for {}s",
                        self.config.recovery_timeout.as_secs()
                    );
                    inner.state = CircuitState::Open;
                }
            }
            CircuitState::Open => {
                inner.failure_count += 1;
            }
        }
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.lock();
        BreakerSnapshot {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            last_failure_secs: inner.last_failure.map(|t| t.elapsed().as_secs()),
        }
    }
}

/// The two breakers guarding one provider class.
///
/// Streaming and non-streaming calls fail differently (a stream can die after
/// connecting), so they trip independently.
#[derive(Debug, Clone)]
pub struct BreakerPair {
    pub streaming: Arc<CircuitBreaker>,
    pub completion: Arc<CircuitBreaker>,
}

impl BreakerPair {
    pub fn new(class: &str, streaming: BreakerConfig, completion: BreakerConfig) -> Self {
        Self {
            streaming: Arc::new(CircuitBreaker::new(format!("{}-streaming", class), streaming)),
            completion: Arc::new(CircuitBreaker::new(format!("{}-completion", class), completion)),
        }
    }

    /// Pair with the default streaming / completion tuning
    pub fn with_defaults(class: &str) -> Self {
        Self::new(class, BreakerConfig::streaming(), BreakerConfig::completion())
    }
}
