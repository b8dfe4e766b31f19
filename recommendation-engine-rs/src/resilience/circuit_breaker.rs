//! Per-strategy circuit breaker
//!
//! Closed -> Open after `failure_threshold` consecutive failures.
//! Open -> HalfOpen lazily, on the first admission check after the cool-down.
//! HalfOpen admits exactly one trial call; its outcome closes or reopens.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use metrics::counter;
use recommender_types::BreakerConfig;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Circuit breaker status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls flow normally
    Closed,
    /// Calls are rejected until the cool-down elapses
    Open,
    /// One trial call decides the next state
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

/// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens
    pub failure_threshold: u32,

    /// How long the circuit stays open before a trial is allowed
    pub cool_down: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cool_down: Duration::from_secs(60),
        }
    }
}

impl From<&BreakerConfig> for CircuitBreakerConfig {
    fn from(config: &BreakerConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold.max(1),
            cool_down: config.cool_down(),
        }
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

/// A thread-safe circuit breaker; all transitions happen under one lock
#[derive(Debug)]
pub struct CircuitBreaker {
    name: &'static str,
    inner: Mutex<BreakerState>,
    total_failures: AtomicUsize,
    total_successes: AtomicUsize,
    total_rejections: AtomicUsize,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(name: &'static str, config: CircuitBreakerConfig) -> Self {
        Self {
            name,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                trial_in_flight: false,
            }),
            total_failures: AtomicUsize::new(0),
            total_successes: AtomicUsize::new(0),
            total_rejections: AtomicUsize::new(0),
            config,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        // A panic while holding the lock cannot leave the state half-written,
        // every transition is a set of plain field stores.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Ask to run a call. Returns false when the circuit rejects it.
    pub fn try_acquire(&self) -> bool {
        let mut inner = self.lock();
        let admitted = match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let cooled = inner
                    .opened_at
                    .map(|at| at.elapsed() >= self.config.cool_down)
                    .unwrap_or(true);
                if cooled {
                    inner.state = CircuitState::HalfOpen;
                    inner.trial_in_flight = true;
                    info!(breaker = self.name, "Circuit breaker transitioning to half-open");
                    counter!("recommender_breaker_transitions_total", 1, "strategy" => self.name, "to" => "half_open");
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    false
                } else {
                    inner.trial_in_flight = true;
                    true
                }
            }
        };

        if !admitted {
            self.total_rejections.fetch_add(1, Ordering::Relaxed);
            debug!(breaker = self.name, state = inner.state.as_str(), "Call rejected by circuit breaker");
        }
        admitted
    }

    /// Record a completed call
    pub fn record_success(&self) {
        self.total_successes.fetch_add(1, Ordering::Relaxed);
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures = 0;
            }
            CircuitState::HalfOpen => {
                self.close(&mut inner);
            }
            CircuitState::Open => {
                // Late result of a call admitted before the circuit opened
                debug!(breaker = self.name, "Success received while open, ignoring");
            }
        }
    }

    /// Record a failed call
    pub fn record_failure(&self) {
        self.total_failures.fetch_add(1, Ordering::Relaxed);
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
                if inner.consecutive_failures >= self.config.failure_threshold {
                    self.open(&mut inner);
                }
            }
            CircuitState::HalfOpen => {
                inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
                self.open(&mut inner);
            }
            CircuitState::Open => {
                debug!(breaker = self.name, "Failure received while open, ignoring");
            }
        }
    }

    /// Open the circuit regardless of its failure count
    pub fn force_open(&self) {
        let mut inner = self.lock();
        if inner.state != CircuitState::Open {
            self.open(&mut inner);
        }
    }

    /// Return to closed with cleared counters
    pub fn reset(&self) {
        let mut inner = self.lock();
        self.close(&mut inner);
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.lock();
        BreakerSnapshot {
            strategy: self.name,
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            open_for_ms: inner.opened_at.map(|at| at.elapsed().as_millis() as u64),
            total_failures: self.total_failures.load(Ordering::Relaxed),
            total_successes: self.total_successes.load(Ordering::Relaxed),
            total_rejections: self.total_rejections.load(Ordering::Relaxed),
        }
    }

    fn open(&self, inner: &mut BreakerState) {
        warn!(
            breaker = self.name,
            consecutive_failures = inner.consecutive_failures,
            cool_down_ms = self.config.cool_down.as_millis() as u64,
            "Circuit breaker opened"
        );
        inner.state = CircuitState::Open;
        inner.opened_at = Some(Instant::now());
        inner.trial_in_flight = false;
        counter!("recommender_breaker_transitions_total", 1, "strategy" => self.name, "to" => "open");
    }

    fn close(&self, inner: &mut BreakerState) {
        if inner.state != CircuitState::Closed {
            info!(breaker = self.name, "Circuit breaker closed");
            counter!("recommender_breaker_transitions_total", 1, "strategy" => self.name, "to" => "closed");
        }
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
        inner.trial_in_flight = false;
    }
}

/// Point-in-time view of a breaker
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub strategy: &'static str,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub open_for_ms: Option<u64>,
    pub total_failures: usize,
    pub total_successes: usize,
    pub total_rejections: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn breaker(threshold: u32, cool_down_ms: u64) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            CircuitBreakerConfig {
                failure_threshold: threshold,
                cool_down: Duration::from_millis(cool_down_ms),
            },
        )
    }

    #[test]
    fn test_circuit_closed_initially() {
        let cb = breaker(3, 1000);
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.try_acquire());
    }

    #[test]
    fn test_circuit_opens_after_threshold() {
        let cb = breaker(3, 60_000);

        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);

        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.try_acquire());
        assert_eq!(cb.snapshot().total_rejections, 1);
    }

    #[test]
    fn test_success_resets_consecutive_count() {
        let cb = breaker(3, 60_000);
        cb.record_failure();
        cb.record_failure();
        cb.record_success();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.consecutive_failures(), 1);
    }

    #[test]
    fn test_half_open_admits_single_trial() {
        let cb = breaker(1, 20);
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);

        thread::sleep(Duration::from_millis(40));

        assert!(cb.try_acquire());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert!(!cb.try_acquire());

        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.try_acquire());
    }

    #[test]
    fn test_failed_trial_reopens() {
        let cb = breaker(1, 20);
        cb.record_failure();
        thread::sleep(Duration::from_millis(40));

        assert!(cb.try_acquire());
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.try_acquire());
    }

    #[test]
    fn test_force_open_and_reset() {
        let cb = breaker(3, 60_000);
        cb.force_open();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(cb.snapshot().open_for_ms.is_some());

        cb.reset();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.consecutive_failures(), 0);
    }
}
