//! Circuit breaker for resource protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: resource assumed down, requests fail fast
//! - Half-Open: probing whether the resource recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive_failures >= max_failures
//! Open → Half-Open: reset_timeout elapsed, on the next allow_request()
//! Half-Open → Closed: half_open_successes >= half_open_success_threshold
//! Half-Open → Open: any probe fails
//! ```
//!
//! # Design Decisions
//! - One breaker per protected resource, owned by the caller (no global state)
//! - Every read-decide-mutate sequence runs under a single mutex
//! - `state()` is a pure read; only `allow_request()` moves Open → Half-Open
//! - Half-open probes are unbounded unless `half_open_max_probes` is set
//! - `acquire()` ties a probe slot to a `Permit`; dropping the permit
//!   returns the slot, so abandoned calls cannot wedge the breaker

use serde::Serialize;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::config::CircuitBreakerConfig;
use crate::error::{CallError, CircuitOpenError};
use crate::observability::metrics;

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
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

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of a breaker, for health and metrics collaborators.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerStats {
    pub name: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub half_open_successes: u32,
    pub probes_in_flight: u32,
    pub times_opened: u64,
    pub half_open_transitions: u64,
    pub rejected_requests: u64,
    /// Milliseconds since the last state transition, if any.
    pub since_transition_ms: Option<u64>,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    half_open_successes: u32,
    probes_in_flight: u32,
    last_transition: Option<Instant>,
    times_opened: u64,
    half_open_transitions: u64,
    rejected_requests: u64,
}

impl Inner {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            half_open_successes: 0,
            probes_in_flight: 0,
            last_transition: None,
            times_opened: 0,
            half_open_transitions: 0,
            rejected_requests: 0,
        }
    }
}

/// Consecutive-failure circuit breaker.
///
/// Share it across tasks with `Arc<CircuitBreaker>`.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    max_failures: u32,
    reset_timeout: Duration,
    half_open_success_threshold: u32,
    half_open_max_probes: u32,
    inner: Mutex<Inner>,
    state_tx: watch::Sender<CircuitState>,
}

impl CircuitBreaker {
    /// Create a breaker. Thresholds below 1 are raised to 1.
    pub fn new(name: impl Into<String>, config: &CircuitBreakerConfig) -> Self {
        let (state_tx, _) = watch::channel(CircuitState::Closed);
        Self {
            name: name.into(),
            max_failures: config.max_failures.max(1),
            reset_timeout: config.reset_timeout(),
            half_open_success_threshold: config.half_open_success_threshold.max(1),
            half_open_max_probes: config.half_open_max_probes,
            inner: Mutex::new(Inner::new()),
            state_tx,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn reset_timeout(&self) -> Duration {
        self.reset_timeout
    }

    // The protected data is plain counters, so a panic elsewhere never
    // leaves it in a state worth refusing to read.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Decide whether a new attempt may start.
    ///
    /// The first caller after `reset_timeout` moves the breaker to half-open
    /// and is admitted as the canary probe. A half-open admission holds a
    /// probe slot until the next `record_*` call; use
    /// [`acquire`](Self::acquire) to tie the slot to the caller instead.
    pub fn allow_request(&self) -> bool {
        self.admit().is_some()
    }

    /// Like [`allow_request`](Self::allow_request) but returns the typed
    /// rejection.
    pub fn try_acquire(&self) -> Result<(), CircuitOpenError> {
        self.admit().map(|_| ()).ok_or_else(|| self.open_error())
    }

    /// Admit one call and return a permit that records its outcome.
    ///
    /// A half-open probe slot is released by the first outcome recorded
    /// through the permit, or when the permit is dropped.
    pub fn acquire(&self) -> Result<Permit<'_>, CircuitOpenError> {
        match self.admit() {
            Some(probe) => Ok(Permit {
                breaker: self,
                probe,
            }),
            None => Err(self.open_error()),
        }
    }

    fn open_error(&self) -> CircuitOpenError {
        CircuitOpenError {
            name: self.name.clone(),
        }
    }

    /// `None` when rejected; otherwise the half-open generation of the probe
    /// slot taken, if one was.
    fn admit(&self) -> Option<Option<u64>> {
        let mut inner = self.lock();
        let admitted = match inner.state {
            CircuitState::Closed => Some(None),
            CircuitState::Open => {
                let cooled_down = inner
                    .last_transition
                    .map_or(true, |at| at.elapsed() > self.reset_timeout);
                if cooled_down {
                    self.transition(&mut inner, CircuitState::HalfOpen);
                    inner.probes_in_flight = 1;
                    Some(Some(inner.half_open_transitions))
                } else {
                    None
                }
            }
            CircuitState::HalfOpen => {
                if self.half_open_max_probes == 0
                    || inner.probes_in_flight < self.half_open_max_probes
                {
                    inner.probes_in_flight += 1;
                    Some(Some(inner.half_open_transitions))
                } else {
                    None
                }
            }
        };

        if admitted.is_none() {
            inner.rejected_requests += 1;
            metrics::record_breaker_rejection(&self.name);
            tracing::debug!(breaker = %self.name, state = %inner.state, "Request rejected by circuit breaker");
        }
        admitted
    }

    /// Feed one attempt outcome into the state machine.
    pub fn record_result<T, E>(&self, outcome: &Result<T, E>) {
        match outcome {
            Ok(_) => self.record_success(),
            Err(_) => self.record_failure(),
        }
    }

    /// Record a success. While half-open this also frees one probe slot.
    pub fn record_success(&self) {
        self.on_success(Slot::Any);
    }

    pub fn record_failure(&self) {
        self.on_failure();
    }

    fn on_success(&self, slot: Slot) {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures = 0;
            }
            CircuitState::HalfOpen => {
                release_probe(&mut inner, slot);
                inner.half_open_successes += 1;
                if inner.half_open_successes >= self.half_open_success_threshold {
                    self.transition(&mut inner, CircuitState::Closed);
                }
            }
            // Outcome of a call admitted before the circuit opened.
            CircuitState::Open => {}
        }
    }

    fn on_failure(&self) {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
                if inner.consecutive_failures >= self.max_failures {
                    self.transition(&mut inner, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => {
                self.transition(&mut inner, CircuitState::Open);
            }
            CircuitState::Open => {}
        }
    }

    fn abandon_probe(&self, generation: u64) {
        let mut inner = self.lock();
        if inner.state == CircuitState::HalfOpen {
            release_probe(&mut inner, Slot::Held(generation));
            tracing::debug!(breaker = %self.name, "Half-open probe abandoned");
        }
    }

    /// Current state. Never performs the time-based Open → Half-Open move.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    pub fn stats(&self) -> BreakerStats {
        let inner = self.lock();
        BreakerStats {
            name: self.name.clone(),
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            half_open_successes: inner.half_open_successes,
            probes_in_flight: inner.probes_in_flight,
            times_opened: inner.times_opened,
            half_open_transitions: inner.half_open_transitions,
            rejected_requests: inner.rejected_requests,
            since_transition_ms: inner
                .last_transition
                .map(|at| at.elapsed().as_millis() as u64),
        }
    }

    /// Watch state transitions. The receiver starts at the current state.
    pub fn subscribe(&self) -> watch::Receiver<CircuitState> {
        self.state_tx.subscribe()
    }

    /// Force the breaker closed and clear all counters.
    pub fn reset(&self) {
        let mut inner = self.lock();
        let previous = inner.state;
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.half_open_successes = 0;
        inner.probes_in_flight = 0;
        inner.last_transition = None;

        if previous != CircuitState::Closed {
            tracing::info!(breaker = %self.name, from = %previous, "Circuit breaker reset");
            metrics::record_breaker_transition(&self.name, CircuitState::Closed);
            self.state_tx.send_replace(CircuitState::Closed);
        }
    }

    /// Run `op` behind the gate and record its outcome.
    pub async fn call<T, E, F, Fut>(&self, op: F) -> Result<T, CallError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut permit = self.acquire().map_err(CallError::Rejected)?;
        let result = op().await;
        permit.record_result(&result);
        result.map_err(CallError::Failed)
    }

    fn transition(&self, inner: &mut Inner, to: CircuitState) {
        let from = inner.state;
        inner.state = to;
        inner.last_transition = Some(Instant::now());

        match to {
            CircuitState::Open => {
                inner.times_opened += 1;
                inner.probes_in_flight = 0;
                tracing::warn!(
                    breaker = %self.name,
                    from = %from,
                    consecutive_failures = inner.consecutive_failures,
                    reset_timeout = ?self.reset_timeout,
                    "Circuit opened"
                );
            }
            CircuitState::HalfOpen => {
                inner.half_open_transitions += 1;
                inner.half_open_successes = 0;
                inner.probes_in_flight = 0;
                tracing::debug!(breaker = %self.name, "Circuit half-open, admitting probe");
            }
            CircuitState::Closed => {
                inner.consecutive_failures = 0;
                inner.half_open_successes = 0;
                inner.probes_in_flight = 0;
                tracing::info!(breaker = %self.name, from = %from, "Circuit closed");
            }
        }

        metrics::record_breaker_transition(&self.name, to);
        self.state_tx.send_replace(to);
    }
}

/// Which probe slot an outcome may release.
#[derive(Debug, Clone, Copy)]
enum Slot {
    /// Recorded without a permit: frees any slot.
    Any,
    /// Slot taken in the given half-open generation.
    Held(u64),
    /// Admitted outside half-open, or slot already released.
    Unowned,
}

fn release_probe(inner: &mut Inner, slot: Slot) {
    let owned = match slot {
        Slot::Any => true,
        Slot::Held(generation) => generation == inner.half_open_transitions,
        Slot::Unowned => false,
    };
    if owned {
        inner.probes_in_flight = inner.probes_in_flight.saturating_sub(1);
    }
}

/// Admission from [`CircuitBreaker::acquire`].
///
/// Outcomes recorded through the permit only release the probe slot this
/// permit took, so a call admitted while closed cannot free a half-open
/// slot. Dropping an unrecorded permit releases its slot.
#[must_use = "dropping a permit abandons the admitted call"]
#[derive(Debug)]
pub struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    probe: Option<u64>,
}

impl Permit<'_> {
    /// True if this permit holds a half-open probe slot.
    pub fn is_probe(&self) -> bool {
        self.probe.is_some()
    }

    pub fn record_success(&mut self) {
        let slot = self.take_slot();
        self.breaker.on_success(slot);
    }

    pub fn record_failure(&mut self) {
        self.probe = None;
        self.breaker.on_failure();
    }

    pub fn record_result<T, E>(&mut self, outcome: &Result<T, E>) {
        match outcome {
            Ok(_) => self.record_success(),
            Err(_) => self.record_failure(),
        }
    }

    fn take_slot(&mut self) -> Slot {
        match self.probe.take() {
            Some(generation) => Slot::Held(generation),
            None => Slot::Unowned,
        }
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if let Some(generation) = self.probe.take() {
            self.breaker.abandon_probe(generation);
        }
    }
}
