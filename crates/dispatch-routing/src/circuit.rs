//! Circuit breaker guarding the routing pipeline.
//!
//! One shared instance per engine. While closed, consecutive failures are
//! counted and reaching the threshold opens the circuit. An open circuit
//! rejects everything until the recovery timeout elapses, then admits a
//! limited number of concurrent trials. Enough consecutive trial successes
//! close it again and any trial failure reopens it.

use dispatch_core::CircuitConfig;
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Breaker phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CircuitPhase {
    /// Requests flow normally
    Closed,
    /// Requests are rejected
    Open,
    /// Limited trial requests probe for recovery
    HalfOpen,
}

impl fmt::Display for CircuitPhase {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        };
        write!(formatter, "{name}")
    }
}

/// Mutable breaker state.
#[derive(Debug, Clone)]
pub struct CircuitState {
    /// Current phase
    pub phase: CircuitPhase,
    /// Consecutive failures while closed
    pub failure_count: u32,
    /// Consecutive trial successes while half-open
    pub success_count: u32,
    /// Most recent recorded failure
    pub last_failure_at: Option<Instant>,
    opened_at: Option<Instant>,
    generation: u64,
    trials_in_flight: u32,
    times_opened: u64,
    times_half_opened: u64,
    times_closed: u64,
    rejected: u64,
}

impl Default for CircuitState {
    fn default() -> Self {
        Self {
            phase: CircuitPhase::Closed,
            failure_count: 0,
            success_count: 0,
            last_failure_at: None,
            opened_at: None,
            generation: 0,
            trials_in_flight: 0,
            times_opened: 0,
            times_half_opened: 0,
            times_closed: 0,
            rejected: 0,
        }
    }
}

/// Point-in-time view of the breaker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CircuitSnapshot {
    /// Current phase
    pub phase: CircuitPhase,
    /// Consecutive failures while closed
    pub failure_count: u32,
    /// Consecutive trial successes while half-open
    pub success_count: u32,
    /// Transitions into `Open`
    pub times_opened: u64,
    /// Transitions into `HalfOpen`
    pub times_half_opened: u64,
    /// Transitions back into `Closed`
    pub times_closed: u64,
    /// Requests turned away
    pub rejected: u64,
    /// Seconds since the last recorded failure
    pub seconds_since_last_failure: Option<f64>,
}

/// How a request was admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermitKind {
    /// Closed circuit, run normally
    Allowed,
    /// Half-open trial slot
    Trial,
    /// Circuit open or trial slots taken
    Rejected,
}

/// Admission for one request.
///
/// Hand it back through [`CircuitBreaker::record_success`] or
/// [`CircuitBreaker::record_failure`]. Dropping it unrecorded frees a held
/// trial slot without counting an outcome.
#[must_use]
#[derive(Debug)]
pub struct Permit<'breaker> {
    breaker: &'breaker CircuitBreaker,
    kind: PermitKind,
    generation: u64,
    settled: bool,
}

impl Permit<'_> {
    /// How the request was admitted.
    pub fn kind(&self) -> PermitKind {
        self.kind
    }

    /// Whether the request may run.
    pub fn is_admitted(&self) -> bool {
        self.kind != PermitKind::Rejected
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.abandon(self.kind, self.generation);
        }
    }
}

/// Error from [`CircuitBreaker::call`].
#[derive(Debug, Error)]
pub enum CircuitBreakerError<E> {
    /// The breaker rejected the call
    #[error("circuit breaker is open")]
    Open,
    /// The wrapped operation failed
    #[error("{0}")]
    Inner(E),
}

/// Three-phase circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    success_threshold: u32,
    recovery_timeout: Duration,
    half_open_max_trials: u32,
    state: Mutex<CircuitState>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(&CircuitConfig::default())
    }
}

impl CircuitBreaker {
    /// Creates a closed breaker.
    pub fn new(config: &CircuitConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold.max(1),
            success_threshold: config.success_threshold.max(1),
            recovery_timeout: Duration::from_millis(config.recovery_timeout_ms),
            half_open_max_trials: config.half_open_max_trials.max(1),
            state: Mutex::new(CircuitState::default()),
        }
    }

    /// Current phase, after applying any due recovery transition.
    pub fn phase(&self) -> CircuitPhase {
        let mut state = self.state.lock();
        self.advance(&mut state, Instant::now());
        state.phase
    }

    /// Asks to run one request.
    pub fn acquire(&self) -> Permit<'_> {
        let mut state = self.state.lock();
        self.advance(&mut state, Instant::now());
        let kind = match state.phase {
            CircuitPhase::Closed => PermitKind::Allowed,
            CircuitPhase::HalfOpen if state.trials_in_flight < self.half_open_max_trials => {
                state.trials_in_flight += 1;
                debug!(trials = state.trials_in_flight, "circuit trial admitted");
                PermitKind::Trial
            }
            CircuitPhase::HalfOpen | CircuitPhase::Open => {
                state.rejected += 1;
                PermitKind::Rejected
            }
        };
        Permit {
            breaker: self,
            kind,
            generation: state.generation,
            settled: false,
        }
    }

    /// Records a successful request admitted with `permit`.
    ///
    /// Permits issued before the last phase change are ignored.
    pub fn record_success(&self, mut permit: Permit<'_>) {
        permit.settled = true;
        let mut state = self.state.lock();
        if permit.generation != state.generation {
            debug!(kind = ?permit.kind, "stale permit outcome ignored");
            return;
        }
        match (permit.kind, state.phase) {
            (PermitKind::Allowed, CircuitPhase::Closed) => state.failure_count = 0,
            (PermitKind::Trial, CircuitPhase::HalfOpen) => {
                state.trials_in_flight = state.trials_in_flight.saturating_sub(1);
                state.success_count += 1;
                debug!(
                    successes = state.success_count,
                    threshold = self.success_threshold,
                    "circuit trial succeeded"
                );
                if state.success_count >= self.success_threshold {
                    Self::close(&mut state);
                }
            }
            _ => {}
        }
    }

    /// Records a failed request admitted with `permit`.
    ///
    /// Permits issued before the last phase change are ignored.
    pub fn record_failure(&self, mut permit: Permit<'_>) {
        permit.settled = true;
        let now = Instant::now();
        let mut state = self.state.lock();
        if permit.generation != state.generation {
            debug!(kind = ?permit.kind, "stale permit outcome ignored");
            return;
        }
        match (permit.kind, state.phase) {
            (PermitKind::Allowed, CircuitPhase::Closed) => {
                state.last_failure_at = Some(now);
                state.failure_count += 1;
                debug!(
                    failures = state.failure_count,
                    threshold = self.failure_threshold,
                    "pipeline failure recorded"
                );
                if state.failure_count >= self.failure_threshold {
                    Self::open(&mut state, now);
                }
            }
            (PermitKind::Trial, CircuitPhase::HalfOpen) => {
                state.last_failure_at = Some(now);
                state.trials_in_flight = state.trials_in_flight.saturating_sub(1);
                warn!("circuit trial failed, reopening");
                Self::open(&mut state, now);
            }
            _ => {}
        }
    }

    /// Frees the trial slot of a permit dropped without an outcome.
    fn abandon(&self, kind: PermitKind, generation: u64) {
        if kind != PermitKind::Trial {
            return;
        }
        let mut state = self.state.lock();
        if state.generation == generation && state.phase == CircuitPhase::HalfOpen {
            state.trials_in_flight = state.trials_in_flight.saturating_sub(1);
            debug!(trials = state.trials_in_flight, "circuit trial abandoned");
        }
    }

    /// Runs `operation` through the breaker.
    ///
    /// # Errors
    /// Returns `Open` without polling `operation` when the breaker rejects
    /// the call, or `Inner` with the operation's own error.
    pub async fn call<Fut, T, E>(&self, operation: Fut) -> Result<T, CircuitBreakerError<E>>
    where
        Fut: Future<Output = Result<T, E>>,
    {
        let permit = self.acquire();
        if !permit.is_admitted() {
            return Err(CircuitBreakerError::Open);
        }
        match operation.await {
            Ok(value) => {
                self.record_success(permit);
                Ok(value)
            }
            Err(error) => {
                self.record_failure(permit);
                Err(CircuitBreakerError::Inner(error))
            }
        }
    }

    /// Forces the breaker closed.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.trials_in_flight = 0;
        Self::close(&mut state);
        state.failure_count = 0;
    }

    /// Counters and phase.
    pub fn snapshot(&self) -> CircuitSnapshot {
        let now = Instant::now();
        let mut state = self.state.lock();
        self.advance(&mut state, now);
        CircuitSnapshot {
            phase: state.phase,
            failure_count: state.failure_count,
            success_count: state.success_count,
            times_opened: state.times_opened,
            times_half_opened: state.times_half_opened,
            times_closed: state.times_closed,
            rejected: state.rejected,
            seconds_since_last_failure: state
                .last_failure_at
                .map(|at| now.saturating_duration_since(at).as_secs_f64()),
        }
    }

    fn advance(&self, state: &mut CircuitState, now: Instant) {
        if state.phase != CircuitPhase::Open {
            return;
        }
        let due = state
            .opened_at
            .is_none_or(|opened| now.saturating_duration_since(opened) >= self.recovery_timeout);
        if due {
            info!("circuit half-open, admitting trials");
            state.phase = CircuitPhase::HalfOpen;
            state.generation += 1;
            state.success_count = 0;
            state.trials_in_flight = 0;
            state.times_half_opened += 1;
        }
    }

    fn open(state: &mut CircuitState, now: Instant) {
        info!(failures = state.failure_count, "circuit opened");
        state.phase = CircuitPhase::Open;
        state.generation += 1;
        state.opened_at = Some(now);
        state.success_count = 0;
        state.times_opened += 1;
    }

    fn close(state: &mut CircuitState) {
        if state.phase != CircuitPhase::Closed {
            info!("circuit closed");
            state.times_closed += 1;
            state.generation += 1;
        }
        state.phase = CircuitPhase::Closed;
        state.failure_count = 0;
        state.success_count = 0;
        state.opened_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    fn breaker(recovery_timeout_ms: u64) -> CircuitBreaker {
        CircuitBreaker::new(&CircuitConfig {
            failure_threshold: 3,
            recovery_timeout_ms,
            success_threshold: 2,
            half_open_max_trials: 1,
            fallback_confidence: 0.5,
        })
    }

    fn fail(breaker: &CircuitBreaker, times: usize) {
        for _ in 0..times {
            let permit = breaker.acquire();
            breaker.record_failure(permit);
        }
    }

    #[test]
    fn test_opens_after_threshold() {
        let breaker = breaker(60_000);
        fail(&breaker, 2);
        assert_eq!(breaker.phase(), CircuitPhase::Closed);
        fail(&breaker, 1);
        assert_eq!(breaker.phase(), CircuitPhase::Open);
        assert_eq!(breaker.acquire().kind(), PermitKind::Rejected);
        assert_eq!(breaker.snapshot().rejected, 1);
    }

    #[test]
    fn test_success_resets_consecutive_failures() {
        let breaker = breaker(60_000);
        fail(&breaker, 2);
        breaker.record_success(breaker.acquire());
        fail(&breaker, 2);
        assert_eq!(breaker.phase(), CircuitPhase::Closed);
        assert_eq!(breaker.snapshot().failure_count, 2);
    }

    #[test]
    fn test_half_open_admits_limited_trials() {
        let breaker = breaker(10);
        fail(&breaker, 3);
        sleep(Duration::from_millis(20));

        let trial = breaker.acquire();
        assert_eq!(trial.kind(), PermitKind::Trial);
        assert_eq!(breaker.acquire().kind(), PermitKind::Rejected);
        assert_eq!(breaker.phase(), CircuitPhase::HalfOpen);
        breaker.record_success(trial);
    }

    #[test]
    fn test_dropped_trial_frees_slot() {
        let breaker = breaker(10);
        fail(&breaker, 3);
        sleep(Duration::from_millis(20));

        let trial = breaker.acquire();
        assert_eq!(trial.kind(), PermitKind::Trial);
        drop(trial);

        let retry = breaker.acquire();
        assert_eq!(retry.kind(), PermitKind::Trial);
        breaker.record_success(retry);
        breaker.record_success(breaker.acquire());
        assert_eq!(breaker.phase(), CircuitPhase::Closed);
    }

    #[test]
    fn test_stale_permits_do_not_count_as_trials() {
        let breaker = breaker(10);
        let slow_success = breaker.acquire();
        let slow_failure = breaker.acquire();
        fail(&breaker, 3);
        sleep(Duration::from_millis(20));

        let trial = breaker.acquire();
        assert_eq!(breaker.phase(), CircuitPhase::HalfOpen);
        breaker.record_success(slow_success);
        breaker.record_failure(slow_failure);

        let snapshot = breaker.snapshot();
        assert_eq!(snapshot.phase, CircuitPhase::HalfOpen);
        assert_eq!(snapshot.success_count, 0);
        assert_eq!(breaker.acquire().kind(), PermitKind::Rejected);

        breaker.record_success(trial);
        assert_eq!(breaker.snapshot().success_count, 1);
    }

    #[test]
    fn test_stale_trial_does_not_release_new_slot() {
        let breaker = breaker(10);
        fail(&breaker, 3);
        sleep(Duration::from_millis(20));

        let first = breaker.acquire();
        assert_eq!(first.kind(), PermitKind::Trial);
        breaker.reset();
        fail(&breaker, 3);
        sleep(Duration::from_millis(20));
        let current = breaker.acquire();
        assert_eq!(current.kind(), PermitKind::Trial);
        drop(first);
        assert_eq!(breaker.acquire().kind(), PermitKind::Rejected);
        breaker.record_success(current);
    }

    #[test]
    fn test_trial_successes_close_circuit() {
        let breaker = breaker(10);
        fail(&breaker, 3);
        sleep(Duration::from_millis(20));

        breaker.record_success(breaker.acquire());
        assert_eq!(breaker.phase(), CircuitPhase::HalfOpen);
        breaker.record_success(breaker.acquire());
        assert_eq!(breaker.phase(), CircuitPhase::Closed);

        let snapshot = breaker.snapshot();
        assert_eq!(
            (snapshot.times_opened, snapshot.times_half_opened, snapshot.times_closed),
            (1, 1, 1)
        );
    }

    #[test]
    fn test_trial_failure_reopens() {
        let breaker = breaker(10);
        fail(&breaker, 3);
        sleep(Duration::from_millis(20));

        let permit = breaker.acquire();
        assert_eq!(permit.kind(), PermitKind::Trial);
        breaker.record_failure(permit);
        assert_eq!(breaker.snapshot().phase, CircuitPhase::Open);
        assert_eq!(breaker.snapshot().times_opened, 2);
    }

    #[test]
    fn test_reset_closes() {
        let breaker = breaker(60_000);
        fail(&breaker, 3);
        breaker.reset();
        assert_eq!(breaker.acquire().kind(), PermitKind::Allowed);
    }

    #[tokio::test]
    async fn test_call_skips_operation_when_open() {
        let breaker = breaker(60_000);
        for _ in 0..3 {
            let result: Result<(), _> = breaker.call(async { Err::<(), _>("boom") }).await;
            assert!(matches!(result, Err(CircuitBreakerError::Inner("boom"))));
        }

        let mut polled = false;
        let result = breaker
            .call(async {
                polled = true;
                Ok::<_, &str>(1)
            })
            .await;
        assert!(matches!(result, Err(CircuitBreakerError::Open)));
        assert!(!polled);
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(CircuitPhase::HalfOpen.to_string(), "half_open");
    }
}
