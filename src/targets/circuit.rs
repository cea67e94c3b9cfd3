//! Per-`(service, target)` circuit breaker (SPEC_FULL.md §10), state machine
//! lifted from `_teacher_ref/circuit/breaker.rs::CircuitBreaker` with the
//! same closed/open/half-open transitions and failure-rate trip condition.

use std::time::{Duration, Instant};

use parking_lot::RwLock;

use crate::config::circuit::CircuitBreakerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

struct Stats {
    total: u32,
    failed: u32,
    window_start: Instant,
}

impl Stats {
    fn new() -> Self {
        Self { total: 0, failed: 0, window_start: Instant::now() }
    }

    fn reset(&mut self) {
        self.total = 0;
        self.failed = 0;
        self.window_start = Instant::now();
    }

    fn failure_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.failed as f64 / self.total as f64) * 100.0
        }
    }
}

struct Inner {
    state: BreakerState,
    stats: Stats,
    opened_at: Option<Instant>,
    half_open_requests: u32,
}

/// Tracks closed/open/half-open transitions for one target. Callers check
/// [`CircuitBreaker::allow`] before dispatching and report the outcome with
/// [`CircuitBreaker::record_success`]/[`record_failure`] afterward.
pub struct CircuitBreaker {
    inner: RwLock<Inner>,
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                state: BreakerState::Closed,
                stats: Stats::new(),
                opened_at: None,
                half_open_requests: 0,
            }),
        }
    }

    pub fn allow(&self, config: &CircuitBreakerConfig) -> bool {
        if !config.enabled {
            return true;
        }
        let mut inner = self.inner.write();
        match inner.state {
            BreakerState::Closed => {
                if inner.stats.window_start.elapsed() >= config.window {
                    inner.stats.reset();
                }
                true
            }
            BreakerState::Open => {
                let recovered = inner.opened_at.map(|t| t.elapsed() >= config.recovery_timeout).unwrap_or(false);
                if recovered {
                    inner.state = BreakerState::HalfOpen;
                    inner.half_open_requests = 0;
                    inner.stats.reset();
                    true
                } else {
                    false
                }
            }
            BreakerState::HalfOpen => {
                if inner.half_open_requests < config.half_open_max_requests {
                    inner.half_open_requests += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self, config: &CircuitBreakerConfig) {
        let mut inner = self.inner.write();
        match inner.state {
            BreakerState::Closed => inner.stats.total += 1,
            BreakerState::HalfOpen => {
                inner.stats.total += 1;
                if inner.half_open_requests >= config.half_open_max_requests {
                    inner.state = BreakerState::Closed;
                    inner.stats.reset();
                }
            }
            BreakerState::Open => {}
        }
    }

    pub fn record_failure(&self, config: &CircuitBreakerConfig) {
        let mut inner = self.inner.write();
        match inner.state {
            BreakerState::Closed => {
                inner.stats.total += 1;
                inner.stats.failed += 1;
                if inner.stats.total >= config.min_requests && inner.stats.failure_rate() >= config.failure_threshold {
                    inner.state = BreakerState::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Open;
                inner.opened_at = Some(Instant::now());
                inner.stats.reset();
            }
            BreakerState::Open => {}
        }
    }

    pub fn state(&self) -> BreakerState {
        self.inner.read().state
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}
