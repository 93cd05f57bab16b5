//! Circuit breaker for backend protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: backend assumed down, requests fail fast
//! - Half-Open: testing if backend recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: failure_count >= max_failures
//! Open → Half-Open: first admission check after open_timeout
//! Half-Open → Closed: a call succeeds (failure_count = 0)
//! Half-Open → Open: a call fails (open_timeout re-armed)
//! ```
//!
//! # Design Decisions
//! - Per-service circuit breaker (not global)
//! - Fail fast in Open state (no waiting for timeout)
//! - A success while Closed halves the failure count instead of zeroing it,
//!   so isolated transient errors decay without an unbroken success streak
//! - Bookkeeping sits behind one short mutex per breaker; the protected call
//!   itself never runs under the lock
//!
//! Half-Open does not limit concurrency: every call that arrives while
//! Half-Open is attempted. Under heavy load many trial calls can be in flight
//! at once, and the first failure among them reopens the circuit, so a
//! struggling backend can make the breaker flap between Open and Half-Open.

use std::fmt;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;

use crate::config::CircuitBreakerConfig;
use crate::observability::metrics;

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by [`CircuitBreaker::execute`].
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// The circuit is open; the action was not invoked.
    #[error("circuit breaker is open")]
    Open,

    /// The action ran and failed.
    #[error(transparent)]
    Inner(E),
}

impl<E> BreakerError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, BreakerError::Open)
    }
}

/// Immutable breaker settings.
#[derive(Debug, Clone, Copy)]
pub struct BreakerSettings {
    pub max_failures: u32,
    pub open_timeout: Duration,
    pub half_open_timeout: Duration,
}

impl From<&CircuitBreakerConfig> for BreakerSettings {
    fn from(config: &CircuitBreakerConfig) -> Self {
        Self {
            max_failures: config.max_failures,
            open_timeout: config.open_timeout(),
            half_open_timeout: config.half_open_timeout(),
        }
    }
}

/// Point-in-time view of a breaker, for admin and logging.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub service: String,
    pub state: CircuitState,
    pub failures: u32,
    pub max_failures: u32,
    pub open_timeout_ms: u64,
    /// Configured half-open timeout; no transition depends on it.
    pub half_open_timeout_ms: u64,
    /// Milliseconds since the last recorded failure.
    pub last_failure_ms_ago: Option<u64>,
    /// Milliseconds since the last state transition.
    pub state_age_ms: u64,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    failures: u32,
    last_failure: Option<Instant>,
    last_state_change: Instant,
}

impl Inner {
    fn transition(&mut self, to: CircuitState, now: Instant) {
        self.state = to;
        self.last_state_change = now;
    }
}

/// A three-state circuit breaker guarding one backend service.
#[derive(Debug)]
pub struct CircuitBreaker {
    service: String,
    settings: BreakerSettings,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    /// Create a closed breaker for `service`.
    pub fn new(service: impl Into<String>, settings: BreakerSettings) -> Self {
        let service = service.into();
        metrics::record_breaker_state(&service, CircuitState::Closed);
        Self {
            service,
            settings,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failures: 0,
                last_failure: None,
                last_state_change: Instant::now(),
            }),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Run `action` through the breaker.
    ///
    /// Refused calls return [`BreakerError::Open`] without invoking `action`.
    /// Otherwise an `Err` from the action counts as a failure, an `Ok` as a
    /// success, and the result is handed back unchanged. Dropping the returned
    /// future before the action completes records nothing.
    pub async fn execute<F, Fut, T, E>(&self, action: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.try_acquire() {
            metrics::record_breaker_rejection(&self.service);
            return Err(BreakerError::Open);
        }

        match action().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(err) => {
                self.record_failure();
                Err(BreakerError::Inner(err))
            }
        }
    }

    /// Admission check. May move Open → HalfOpen once the open timeout elapsed.
    pub fn try_acquire(&self) -> bool {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let now = Instant::now();
                if now.duration_since(inner.last_state_change) >= self.settings.open_timeout {
                    inner.transition(CircuitState::HalfOpen, now);
                    drop(inner);
                    tracing::info!(service = %self.service, "Circuit half-open, allowing trial calls");
                    metrics::record_breaker_state(&self.service, CircuitState::HalfOpen);
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record a successful call.
    pub fn record_success(&self) {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.failures /= 2;
            }
            CircuitState::HalfOpen => {
                inner.failures = 0;
                inner.transition(CircuitState::Closed, Instant::now());
                drop(inner);
                tracing::info!(service = %self.service, "Circuit closed, backend recovered");
                metrics::record_breaker_state(&self.service, CircuitState::Closed);
            }
            // A call admitted before the circuit reopened; it does not close it.
            CircuitState::Open => {}
        }
    }

    /// Record a failed call.
    pub fn record_failure(&self) {
        let mut inner = self.lock();
        let now = Instant::now();
        inner.failures = inner.failures.saturating_add(1);
        inner.last_failure = Some(now);

        let opened = match inner.state {
            CircuitState::Closed if inner.failures >= self.settings.max_failures => true,
            CircuitState::HalfOpen => true,
            _ => false,
        };

        if opened {
            let from = inner.state;
            let failures = inner.failures;
            inner.transition(CircuitState::Open, now);
            drop(inner);
            tracing::warn!(
                service = %self.service,
                from = %from,
                failures,
                open_timeout = ?self.settings.open_timeout,
                "Circuit opened"
            );
            metrics::record_breaker_state(&self.service, CircuitState::Open);
        }
    }

    /// Force the breaker closed with zero failures.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.failures = 0;
        inner.transition(CircuitState::Closed, Instant::now());
        drop(inner);
        tracing::info!(service = %self.service, "Circuit manually reset");
        metrics::record_breaker_state(&self.service, CircuitState::Closed);
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn failures(&self) -> u32 {
        self.lock().failures
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.lock();
        let now = Instant::now();
        BreakerSnapshot {
            service: self.service.clone(),
            state: inner.state,
            failures: inner.failures,
            max_failures: self.settings.max_failures,
            open_timeout_ms: self.settings.open_timeout.as_millis() as u64,
            half_open_timeout_ms: self.settings.half_open_timeout.as_millis() as u64,
            last_failure_ms_ago: inner
                .last_failure
                .map(|at| now.duration_since(at).as_millis() as u64),
            state_age_ms: now.duration_since(inner.last_state_change).as_millis() as u64,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("circuit breaker mutex poisoned")
    }
}
