//! Circuit Breaker Pattern
//!
//! Prevents cascading failures by temporarily blocking requests to a failing
//! endpoint. One breaker exists per registered endpoint.

use crate::domain::ports::Clock;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Circuit breaker configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Number of failures before opening the circuit
    pub failure_threshold: u32,
    /// How long the circuit stays open before a probe is allowed
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(60),
        }
    }
}

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation - requests allowed
    #[default]
    Closed,
    /// Circuit tripped - requests blocked
    Open,
    /// Testing recovery - a single probe allowed
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Outcome of [`CircuitBreaker::call`].
#[derive(Debug, thiserror::Error)]
pub enum BreakerError<E> {
    /// Rejected without invoking the wrapped function
    #[error("circuit open")]
    Open,
    /// The wrapped function's own error
    #[error("{0}")]
    Inner(E),
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    last_failure: Option<Instant>,
    /// Set while the single HALF_OPEN probe is outstanding
    probe_in_flight: bool,
    /// Bumped on every state change; permits from older generations are stale
    generation: u64,
}

impl BreakerInner {
    fn transition(&mut self, state: CircuitState) {
        self.state = state;
        self.generation = self.generation.wrapping_add(1);
    }
}

/// Per-endpoint circuit breaker.
///
/// Every check-then-transition sequence runs under one lock, so only one
/// caller can become the HALF_OPEN probe.
pub struct CircuitBreaker {
    endpoint_id: String,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Create a closed circuit breaker.
    pub fn new(endpoint_id: impl Into<String>, config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            endpoint_id: endpoint_id.into(),
            config,
            clock,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure: None,
                probe_in_flight: false,
                generation: 0,
            }),
        }
    }

    pub fn endpoint_id(&self) -> &str {
        &self.endpoint_id
    }

    pub fn config(&self) -> CircuitBreakerConfig {
        self.config
    }

    /// Run `f` through the breaker.
    ///
    /// Returns `f`'s value on success. On failure the breaker state is updated
    /// and the original error is returned as [`BreakerError::Inner`]. When the
    /// circuit is open `f` is never invoked and [`BreakerError::Open`] is
    /// returned instead.
    ///
    /// An outcome only affects the breaker if no transition happened while the
    /// call was in flight.
    pub async fn call<F, Fut, T, E>(&self, f: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut permit = self.acquire().ok_or(BreakerError::Open)?;

        let result = f().await;
        permit.finished = true;
        match result {
            Ok(value) => {
                self.on_success(&permit);
                Ok(value)
            }
            Err(e) => {
                self.on_failure(&permit);
                Err(BreakerError::Inner(e))
            }
        }
    }

    /// Admit a call, moving OPEN to HALF_OPEN once the cooldown has elapsed.
    fn acquire(&self) -> Option<CallPermit<'_>> {
        let mut inner = self.inner.lock();
        let trial = match inner.state {
            CircuitState::Closed => false,
            CircuitState::Open => {
                let expired = inner
                    .last_failure
                    .map_or(true, |t| self.clock.now().saturating_duration_since(t) > self.config.cooldown);
                if !expired {
                    return None;
                }
                inner.transition(CircuitState::HalfOpen);
                inner.probe_in_flight = true;
                tracing::info!("circuit breaker for {} transitioning to half-open", self.endpoint_id);
                true
            }
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    return None;
                }
                inner.probe_in_flight = true;
                true
            }
        };
        Some(CallPermit {
            breaker: self,
            generation: inner.generation,
            trial,
            finished: false,
        })
    }

    fn on_success(&self, permit: &CallPermit<'_>) {
        let mut inner = self.inner.lock();
        if inner.generation != permit.generation {
            return;
        }
        match inner.state {
            CircuitState::Closed => inner.failure_count = 0,
            CircuitState::HalfOpen if permit.trial => {
                inner.transition(CircuitState::Closed);
                inner.failure_count = 0;
                inner.probe_in_flight = false;
                tracing::info!("circuit breaker for {} closed (recovered)", self.endpoint_id);
            }
            CircuitState::HalfOpen | CircuitState::Open => {}
        }
    }

    fn on_failure(&self, permit: &CallPermit<'_>) {
        let mut inner = self.inner.lock();
        if inner.generation != permit.generation {
            return;
        }
        let now = self.clock.now();

        match inner.state {
            CircuitState::Closed => {
                inner.failure_count = inner.failure_count.saturating_add(1);
                if inner.failure_count >= self.config.failure_threshold {
                    inner.transition(CircuitState::Open);
                    inner.last_failure = Some(now);
                    tracing::warn!(
                        "circuit breaker for {} opened after {} failures",
                        self.endpoint_id,
                        inner.failure_count
                    );
                }
            }
            CircuitState::HalfOpen if permit.trial => {
                inner.failure_count = inner.failure_count.saturating_add(1);
                inner.transition(CircuitState::Open);
                inner.last_failure = Some(now);
                inner.probe_in_flight = false;
                tracing::warn!(
                    "circuit breaker for {} re-opened (probe failed)",
                    self.endpoint_id
                );
            }
            CircuitState::HalfOpen | CircuitState::Open => {}
        }
    }

    /// A call was dropped before completing; free the HALF_OPEN slot it held.
    fn on_abandoned(&self, permit: &CallPermit<'_>) {
        let mut inner = self.inner.lock();
        if permit.trial && inner.generation == permit.generation {
            inner.probe_in_flight = false;
        }
    }

    /// Current state. An expired OPEN circuit still reports OPEN until the
    /// next call attempt.
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.inner.lock().failure_count
    }

    pub fn last_failure(&self) -> Option<Instant> {
        self.inner.lock().last_failure
    }

    /// Manually reset to closed.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.transition(CircuitState::Closed);
        inner.failure_count = 0;
        inner.probe_in_flight = false;
        tracing::info!("circuit breaker for {} manually reset", self.endpoint_id);
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("endpoint_id", &self.endpoint_id)
            .field("config", &self.config)
            .field("inner", &*self.inner.lock())
            .finish()
    }
}

/// Admission for one call; releases the probe slot if the call future is
/// dropped before it completes.
struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    /// Breaker generation at admission
    generation: u64,
    /// Admitted as the single HALF_OPEN trial call
    trial: bool,
    finished: bool,
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.breaker.on_abandoned(self);
        }
    }
}
