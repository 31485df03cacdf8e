//! Circuit breaker (spec.md §4.A "Circuit breaker").
//!
//! Three states, one direction of travel per observation: `Closed` degrades to
//! `Open` on sustained failure, `Open` probes via `HalfOpen`, and `HalfOpen` either
//! recovers to `Closed` or snaps back to `Open` on a single failure.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Circuit breaker state, exposed for observability and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    opened_at: Option<Instant>,
}

/// Configuration for the breaker's thresholds.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub max_failures: u32,
    pub open_timeout: Duration,
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self { max_failures: 5, open_timeout: Duration::from_secs(30), success_threshold: 2 }
    }
}

/// A three-state circuit breaker guarding `AddRateLimited` admission.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    #[must_use]
    pub const fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                opened_at: None,
            }),
        }
    }

    /// Current externally-observable state, accounting for the `Open` → `HalfOpen`
    /// timeout transition (a single admission probe moves it the rest of the way).
    #[must_use]
    pub fn state(&self) -> CircuitState {
        let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        self.maybe_half_open(&mut inner);
        inner.state
    }

    fn maybe_half_open(&self, inner: &mut Inner) {
        if inner.state == CircuitState::Open {
            if let Some(opened_at) = inner.opened_at {
                if opened_at.elapsed() >= self.config.open_timeout {
                    inner.state = CircuitState::HalfOpen;
                    inner.consecutive_successes = 0;
                }
            }
        }
    }

    /// Whether admission should be allowed right now. `HalfOpen` allows exactly one
    /// concurrent probe by the caller's convention (queue admission is already
    /// serialized per key, so a single `allow` call models the probe correctly).
    #[must_use]
    pub fn allow(&self) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        self.maybe_half_open(&mut inner);
        !matches!(inner.state, CircuitState::Open)
    }

    /// Records a successful operation.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.consecutive_failures = 0;
        match inner.state {
            CircuitState::Closed => {}
            CircuitState::HalfOpen => {
                inner.consecutive_successes += 1;
                if inner.consecutive_successes >= self.config.success_threshold {
                    inner.state = CircuitState::Closed;
                    inner.consecutive_successes = 0;
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Records a failed operation, possibly opening (or re-opening) the breaker.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.consecutive_successes = 0;
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.max_failures {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                inner.consecutive_failures = self.config.max_failures;
            }
            CircuitState::Open => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_max_failures() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig { max_failures: 3, ..Default::default() });
        assert!(cb.allow());
        cb.record_failure();
        cb.record_failure();
        assert!(cb.allow());
        cb.record_failure();
        assert!(!cb.allow());
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn half_open_closes_after_success_threshold() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig {
            max_failures: 1,
            open_timeout: Duration::from_millis(0),
            success_threshold: 2,
        });
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_failure_reopens() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig {
            max_failures: 1,
            open_timeout: Duration::from_mins(1),
            success_threshold: 2,
        });
        cb.record_failure();
        // Force the Open -> HalfOpen transition without waiting out a real timeout.
        cb.inner.lock().unwrap().state = CircuitState::HalfOpen;
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
    }
}
