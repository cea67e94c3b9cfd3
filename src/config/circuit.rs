//! Per-target circuit breaker tuning (SPEC_FULL.md §10), grounded on
//! `_teacher_ref/circuit/breaker.rs::CircuitBreakerConfig`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Failure percentage (0-100) within `window` that trips the breaker.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: f64,
    /// Minimum calls observed before `failure_threshold` is evaluated.
    #[serde(default = "default_min_requests")]
    pub min_requests: u32,
    #[serde(with = "humantime_serde", default = "default_window")]
    pub window: Duration,
    #[serde(with = "humantime_serde", default = "default_recovery_timeout")]
    pub recovery_timeout: Duration,
    #[serde(default = "default_half_open_max_requests")]
    pub half_open_max_requests: u32,
}

fn default_enabled() -> bool {
    true
}
fn default_failure_threshold() -> f64 {
    50.0
}
fn default_min_requests() -> u32 {
    5
}
fn default_window() -> Duration {
    Duration::from_secs(60)
}
fn default_recovery_timeout() -> Duration {
    Duration::from_secs(30)
}
fn default_half_open_max_requests() -> u32 {
    3
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            failure_threshold: default_failure_threshold(),
            min_requests: default_min_requests(),
            window: default_window(),
            recovery_timeout: default_recovery_timeout(),
            half_open_max_requests: default_half_open_max_requests(),
        }
    }
}
