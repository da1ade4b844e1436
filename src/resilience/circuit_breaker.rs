//! Circuit breaker for dependency protection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: dependency assumed down, calls fail fast
//! - Half-Open: testing if dependency recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: failure_count >= failure_threshold
//! Open → Half-Open: recovery_timeout elapsed since the last failure (checked on next call)
//! Half-Open → Closed: success_threshold consecutive probe successes
//! Half-Open → Open: any probe failure
//! ```
//!
//! # Design Decisions
//! - Decide and record each run in one critical section under the breaker's mutex
//! - Fail fast in Open state; the wrapped operation is never constructed
//! - Single probe in Half-Open; concurrent probe attempts are rejected as if Open
//! - Every error from the operation counts as a failure
//! - Each transition starts a new generation; outcomes of calls admitted in
//!   an earlier generation are discarded

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;

use crate::config::BreakerConfig;
use crate::observability::metrics;

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a guarded call.
///
/// `Open` is returned without running the operation; `Operation` carries
/// the operation's own error untouched.
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    #[error("circuit breaker '{name}' is open, retry after {retry_after:?}")]
    Open { name: String, retry_after: Duration },

    #[error("{0}")]
    Operation(E),
}

impl<E> BreakerError<E> {
    /// True if the breaker rejected the call without invoking the operation.
    pub fn is_open(&self) -> bool {
        matches!(self, BreakerError::Open { .. })
    }

    /// The operation's own error, if the operation ran and failed.
    pub fn into_operation(self) -> Option<E> {
        match self {
            BreakerError::Operation(e) => Some(e),
            BreakerError::Open { .. } => None,
        }
    }
}

/// Read-only view of a breaker.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub recovery_timeout_secs: u64,
    pub last_failure_time: Option<DateTime<Utc>>,
    pub last_success_time: Option<DateTime<Utc>>,
    pub probe_in_flight: bool,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    /// Monotonic stamp used for the recovery decision.
    last_failure: Option<Instant>,
    last_failure_at: Option<DateTime<Utc>>,
    last_success_at: Option<DateTime<Utc>>,
    probe_in_flight: bool,
    /// Bumped on every state change.
    generation: u64,
}

/// A per-dependency circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                last_failure: None,
                last_failure_at: None,
                last_success_at: None,
                probe_in_flight: false,
                generation: 0,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Current state as stored. An expired Open state is only moved to
    /// Half-Open by the next call.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Run `operation` through the breaker.
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let permit = match self.admit() {
            Ok(permit) => permit,
            Err(retry_after) => {
                tracing::debug!(breaker = %self.name, ?retry_after, "Call rejected, circuit open");
                metrics::record_breaker_rejection(&self.name);
                return Err(BreakerError::Open {
                    name: self.name.clone(),
                    retry_after,
                });
            }
        };

        match operation().await {
            Ok(value) => {
                permit.complete(true);
                Ok(value)
            }
            Err(e) => {
                permit.complete(false);
                Err(BreakerError::Operation(e))
            }
        }
    }

    /// Snapshot the breaker without mutating it.
    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.lock();
        BreakerSnapshot {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            failure_threshold: self.config.failure_threshold,
            success_threshold: self.config.success_threshold,
            recovery_timeout_secs: self.config.recovery_timeout_secs,
            last_failure_time: inner.last_failure_at,
            last_success_time: inner.last_success_at,
            probe_in_flight: inner.probe_in_flight,
        }
    }

    /// Force the breaker closed and clear its counters.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.failure_count = 0;
        inner.success_count = 0;
        if inner.state == CircuitState::Closed {
            new_generation(&mut inner);
        } else {
            self.transition(&mut inner, CircuitState::Closed);
        }
        tracing::info!(breaker = %self.name, "Circuit reset");
    }

    /// Force the breaker open; the recovery timeout starts now.
    pub fn force_open(&self) {
        let mut inner = self.lock();
        inner.last_failure = Some(Instant::now());
        inner.last_failure_at = Some(Utc::now());
        inner.success_count = 0;
        if inner.state == CircuitState::Open {
            new_generation(&mut inner);
        } else {
            self.transition(&mut inner, CircuitState::Open);
        }
        tracing::warn!(breaker = %self.name, "Circuit force-opened");
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        // State stays consistent even if a holder panicked; each write is a plain field store.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Decide whether a call may proceed. `Err` carries the retry hint.
    fn admit(&self) -> Result<Permit<'_>, Duration> {
        let now = Instant::now();
        let recovery = self.config.recovery_timeout();
        let mut inner = self.lock();

        if inner.state == CircuitState::Open {
            let elapsed = inner
                .last_failure
                .map(|at| now.saturating_duration_since(at))
                .unwrap_or(recovery);
            if elapsed < recovery {
                return Err(recovery - elapsed);
            }
            self.transition(&mut inner, CircuitState::HalfOpen);
        }

        if inner.state == CircuitState::HalfOpen {
            if inner.probe_in_flight {
                return Err(Duration::ZERO);
            }
            inner.probe_in_flight = true;
            return Ok(Permit::new(self, true, inner.generation));
        }

        Ok(Permit::new(self, false, inner.generation))
    }

    fn record(&self, success: bool, probe: bool, generation: u64) {
        let mut inner = self.lock();
        if generation != inner.generation {
            tracing::debug!(
                breaker = %self.name,
                success,
                state = %inner.state,
                "Discarding outcome of a call admitted before the last transition"
            );
            return;
        }
        if probe {
            inner.probe_in_flight = false;
        }

        if success {
            inner.failure_count = 0;
            inner.last_success_at = Some(Utc::now());
            match inner.state {
                CircuitState::HalfOpen => {
                    inner.success_count += 1;
                    if inner.success_count >= self.config.success_threshold {
                        inner.success_count = 0;
                        self.transition(&mut inner, CircuitState::Closed);
                    }
                }
                CircuitState::Closed => inner.success_count = 0,
                CircuitState::Open => {}
            }
        } else {
            inner.failure_count = inner.failure_count.saturating_add(1);
            inner.last_failure = Some(Instant::now());
            inner.last_failure_at = Some(Utc::now());
            inner.success_count = 0;
            match inner.state {
                CircuitState::HalfOpen => self.transition(&mut inner, CircuitState::Open),
                CircuitState::Closed if inner.failure_count >= self.config.failure_threshold => {
                    self.transition(&mut inner, CircuitState::Open)
                }
                _ => {}
            }
        }
    }

    fn release_probe(&self, generation: u64) {
        let mut inner = self.lock();
        if inner.generation == generation {
            inner.probe_in_flight = false;
        }
    }

    fn transition(&self, inner: &mut BreakerInner, to: CircuitState) {
        let from = inner.state;
        inner.state = to;
        new_generation(inner);
        if to == CircuitState::HalfOpen {
            inner.success_count = 0;
        }

        match to {
            CircuitState::Open => tracing::warn!(
                breaker = %self.name,
                %from,
                failure_count = inner.failure_count,
                "Circuit opened"
            ),
            _ => tracing::info!(breaker = %self.name, %from, to = %to, "Circuit state changed"),
        }
        metrics::record_breaker_transition(&self.name, to.as_str());
    }
}

/// Invalidate every outstanding permit, including the probe slot.
fn new_generation(inner: &mut BreakerInner) {
    inner.generation = inner.generation.wrapping_add(1);
    inner.probe_in_flight = false;
}

/// Admission for one call. A probe permit dropped without an outcome
/// (the caller's future was cancelled) frees the half-open probe slot.
struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    probe: bool,
    generation: u64,
    completed: bool,
}

impl<'a> Permit<'a> {
    fn new(breaker: &'a CircuitBreaker, probe: bool, generation: u64) -> Self {
        Self {
            breaker,
            probe,
            generation,
            completed: false,
        }
    }

    fn complete(mut self, success: bool) {
        self.completed = true;
        self.breaker.record(success, self.probe, self.generation);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if self.probe && !self.completed {
            self.breaker.release_probe(self.generation);
        }
    }
}
