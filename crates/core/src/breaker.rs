//! Per-dependency circuit breaker.
//!
//! One `CircuitBreaker` instance guards one logical dependency (GitHub, the
//! model endpoint) and is shared across concurrent runs behind an `Arc`. Only
//! transient failures count toward the threshold; a permanent error says
//! nothing about the dependency's health.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::{ApiError, ApiResult};

/// Observable breaker state, mainly for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

/// Closed → Open after `failure_threshold` consecutive transient failures;
/// Open fails fast for `cooldown`, then admits a single half-open probe.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    cooldown: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            name: name.into(),
            failure_threshold: failure_threshold.max(1),
            cooldown,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ask permission to perform a call. `Err(ServiceUnavailable)` means the
    /// breaker is open (or a half-open probe is already in flight) and the
    /// call must not be attempted.
    pub fn try_acquire(&self) -> ApiResult<()> {
        let mut inner = self.lock();
        match inner.state {
            BreakerState::Closed => Ok(()),
            BreakerState::Open => {
                let elapsed = inner.opened_at.map(|t| t.elapsed()).unwrap_or(Duration::ZERO);
                if elapsed >= self.cooldown {
                    inner.state = BreakerState::HalfOpen;
                    tracing::info!(breaker = %self.name, "circuit half-open, admitting probe");
                    Ok(())
                } else {
                    Err(ApiError::unavailable(format!(
                        "{} circuit open, retry in {:?}",
                        self.name,
                        self.cooldown - elapsed
                    )))
                }
            }
            BreakerState::HalfOpen => Err(ApiError::unavailable(format!(
                "{} circuit half-open, probe in flight",
                self.name
            ))),
        }
    }

    /// Record a successful call. Closes the circuit from any state.
    pub fn record_success(&self) {
        let mut inner = self.lock();
        if inner.state != BreakerState::Closed {
            tracing::info!(breaker = %self.name, "circuit closed");
        }
        inner.state = BreakerState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
    }

    /// Record a permanent failure. The dependency answered, so a half-open
    /// probe counts as proof of recovery and closes the circuit; closed-state
    /// counters are left alone because a permanent error says nothing about
    /// availability.
    pub fn record_permanent(&self) {
        let mut inner = self.lock();
        if inner.state == BreakerState::HalfOpen {
            inner.state = BreakerState::Closed;
            inner.consecutive_failures = 0;
            inner.opened_at = None;
            tracing::info!(
                breaker = %self.name,
                "probe answered with a permanent error, circuit closed"
            );
        }
    }

    /// Record a transient failure. Callers report permanent errors through
    /// [`CircuitBreaker::record_permanent`] instead.
    pub fn record_failure(&self) {
        let mut inner = self.lock();
        match inner.state {
            BreakerState::HalfOpen => {
                // Failed probe re-opens the circuit for another cooldown.
                inner.state = BreakerState::Open;
                inner.opened_at = Some(Instant::now());
                tracing::warn!(breaker = %self.name, "probe failed, circuit re-opened");
            }
            BreakerState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.failure_threshold {
                    inner.state = BreakerState::Open;
                    inner.opened_at = Some(Instant::now());
                    tracing::warn!(
                        breaker = %self.name,
                        failures = inner.consecutive_failures,
                        "failure threshold reached, circuit opened"
                    );
                }
            }
            BreakerState::Open => {}
        }
    }

    pub fn state(&self) -> BreakerState {
        self.lock().state
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerInner> {
        // A poisoned lock only means another thread panicked mid-update; the
        // counters are still usable.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, cooldown_ms: u64) -> CircuitBreaker {
        CircuitBreaker::new("test", threshold, Duration::from_millis(cooldown_ms))
    }

    #[test]
    fn test_opens_after_threshold() {
        let b = breaker(3, 1_000);
        for _ in 0..2 {
            b.record_failure();
            assert_eq!(b.state(), BreakerState::Closed);
        }
        b.record_failure();
        assert_eq!(b.state(), BreakerState::Open);
        assert!(matches!(
            b.try_acquire(),
            Err(ApiError::ServiceUnavailable(_))
        ));
    }

    #[test]
    fn test_success_resets_consecutive_count() {
        let b = breaker(3, 1_000);
        b.record_failure();
        b.record_failure();
        b.record_success();
        b.record_failure();
        b.record_failure();
        assert_eq!(b.state(), BreakerState::Closed);
    }

    #[test]
    fn test_half_open_probe_after_cooldown() {
        let b = breaker(1, 10);
        b.record_failure();
        assert_eq!(b.state(), BreakerState::Open);

        std::thread::sleep(Duration::from_millis(20));
        assert!(b.try_acquire().is_ok());
        assert_eq!(b.state(), BreakerState::HalfOpen);
        // Second caller is rejected while the probe is in flight.
        assert!(b.try_acquire().is_err());

        b.record_success();
        assert_eq!(b.state(), BreakerState::Closed);
        assert!(b.try_acquire().is_ok());
    }

    #[test]
    fn test_permanent_probe_outcome_closes() {
        let b = breaker(1, 10);
        b.record_failure();
        std::thread::sleep(Duration::from_millis(20));
        assert!(b.try_acquire().is_ok());
        assert_eq!(b.state(), BreakerState::HalfOpen);

        // A permanent answer resolves the probe; later calls go through.
        b.record_permanent();
        assert_eq!(b.state(), BreakerState::Closed);
        assert!(b.try_acquire().is_ok());
    }

    #[test]
    fn test_permanent_in_closed_keeps_failure_count() {
        let b = breaker(2, 1_000);
        b.record_failure();
        b.record_permanent();
        b.record_failure();
        assert_eq!(b.state(), BreakerState::Open);
    }

    #[test]
    fn test_failed_probe_reopens() {
        let b = breaker(1, 10);
        b.record_failure();
        std::thread::sleep(Duration::from_millis(20));
        assert!(b.try_acquire().is_ok());
        b.record_failure();
        assert_eq!(b.state(), BreakerState::Open);
        assert!(b.try_acquire().is_err());
    }
}
