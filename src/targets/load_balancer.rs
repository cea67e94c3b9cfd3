//! Load-balancing disciplines (§4.3).
//!
//! The round-robin/random/hash strategies are adapted from
//! `_teacher_ref/gateway/load_balancer.rs`; BestResponseTime and its
//! weighted variant, and Sticky balancing, are new since the teacher's
//! load balancer does not carry them.

use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use parking_lot::RwLock;

use crate::config::service::LoadBalancingAlgo;
use crate::config::target::Target;
use crate::context::Rng;

use super::sticky;

/// EWMA smoothing factor for BestResponseTime averages.
const RESPONSE_TIME_ALPHA: f64 = 0.2;

/// Per-service load-balancing runtime state. Targets come and go with
/// config reloads, so state is keyed by target id and simply accumulates
/// fresh entries; stale entries for removed targets are harmless since
/// they're never looked up again.
#[derive(Default)]
pub struct LoadBalancerState {
    round_robin_counter: AtomicUsize,
    response_avg_ms: DashMap<String, RwLock<f64>>,
}

impl LoadBalancerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an observed response time for `target_id`, updating its EWMA.
    pub fn record_response_time(&self, target_id: &str, duration_ms: f64) {
        let mut avg = self
            .response_avg_ms
            .entry(target_id.to_string())
            .or_insert_with(|| RwLock::new(duration_ms))
            .write();
        *avg = *avg * (1.0 - RESPONSE_TIME_ALPHA) + duration_ms * RESPONSE_TIME_ALPHA;
    }

    fn avg_for(&self, target_id: &str) -> f64 {
        self.response_avg_ms
            .get(target_id)
            .map(|e| *e.read())
            .unwrap_or(0.0)
    }

    fn has_been_measured(&self, target_id: &str) -> bool {
        self.response_avg_ms.contains_key(target_id)
    }
}

/// Expand `targets` so each appears `weight` times, preserving order.
fn expand_by_weight<'a>(targets: &[&'a Target]) -> Vec<&'a Target> {
    let mut expanded = Vec::new();
    for t in targets {
        for _ in 0..t.weight.max(1) {
            expanded.push(*t);
        }
    }
    expanded
}

impl LoadBalancerState {
    fn round_robin<'a>(&self, targets: &[&'a Target]) -> &'a Target {
        let expanded = expand_by_weight(targets);
        let idx = self.round_robin_counter.fetch_add(1, Ordering::Relaxed);
        expanded[idx % expanded.len()]
    }

    fn random<'a>(&self, targets: &[&'a Target], rng: &dyn Rng) -> &'a Target {
        let expanded = expand_by_weight(targets);
        let idx = (rng.next_u64() as usize) % expanded.len();
        expanded[idx]
    }

    fn sticky<'a>(&self, targets: &[&'a Target], session_id: &str) -> &'a Target {
        let idx = sticky::select_index(session_id, targets.len());
        targets[idx]
    }

    /// Pick the target with the lowest EWMA average response time. Any
    /// target with no recorded measurement yet is treated as having the
    /// lowest possible average, guaranteeing every target is tried at
    /// least once within the first `|targets|` calls. Ties are broken by
    /// round-robin.
    fn best_response_time<'a>(&self, targets: &[&'a Target]) -> &'a Target {
        let unmeasured: Vec<&&Target> = targets.iter().filter(|t| !self.has_been_measured(&t.id)).collect();
        if !unmeasured.is_empty() {
            let idx = self.round_robin_counter.fetch_add(1, Ordering::Relaxed);
            return unmeasured[idx % unmeasured.len()];
        }

        let min_avg = targets
            .iter()
            .map(|t| self.avg_for(&t.id))
            .fold(f64::INFINITY, f64::min);

        let tied: Vec<&&Target> = targets
            .iter()
            .filter(|t| (self.avg_for(&t.id) - min_avg).abs() < f64::EPSILON)
            .collect();

        let idx = self.round_robin_counter.fetch_add(1, Ordering::Relaxed);
        tied[idx % tied.len()]
    }

    fn weighted_best_response_time<'a>(&self, targets: &[&'a Target], ratio: f64, rng: &dyn Rng) -> &'a Target {
        let roll = (rng.next_u64() % 1_000_000) as f64 / 1_000_000.0;
        if roll < ratio {
            return self.best_response_time(targets);
        }

        // Uniform among "the others": every target that is not the current
        // best-response pick, falling back to the full set if that would
        // be empty (single-target services).
        let best = self.best_response_time(targets);
        let others: Vec<&&Target> = targets.iter().filter(|t| t.id != best.id).collect();
        if others.is_empty() {
            return best;
        }
        let idx = (rng.next_u64() as usize) % others.len();
        others[idx]
    }
}

/// Select one target from `targets` (already predicate-filtered, never
/// empty) under `algo`. `session_id` and `client_ip` feed Sticky and
/// IpAddressHash respectively.
pub fn select<'a>(
    state: &LoadBalancerState,
    targets: &[&'a Target],
    algo: &LoadBalancingAlgo,
    session_id: &str,
    client_ip: &str,
    rng: &dyn Rng,
) -> &'a Target {
    debug_assert!(!targets.is_empty());
    match algo {
        LoadBalancingAlgo::RoundRobin => state.round_robin(targets),
        LoadBalancingAlgo::Random => state.random(targets, rng),
        LoadBalancingAlgo::Sticky => state.sticky(targets, session_id),
        LoadBalancingAlgo::IpAddressHash => state.sticky(targets, client_ip),
        LoadBalancingAlgo::BestResponseTime => state.best_response_time(targets),
        LoadBalancingAlgo::WeightedBestResponseTime { ratio } => {
            state.weighted_best_response_time(targets, *ratio, rng)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::target::{Predicate, Scheme};
    use crate::context::ThreadRng;

    fn target(id: &str, weight: u32) -> Target {
        Target { id: id.into(), host: "h".into(), port: 80, scheme: Scheme::Http, weight, ip_address: None, predicate: Predicate::AllMatch }
    }

    #[test]
    fn round_robin_respects_weight_expansion() {
        let t1 = target("a", 3);
        let t2 = target("b", 2);
        let t3 = target("c", 1);
        let targets = vec![&t1, &t2, &t3];
        let state = LoadBalancerState::new();

        let mut counts = std::collections::HashMap::new();
        for _ in 0..60 {
            let picked = state.round_robin(&targets);
            *counts.entry(picked.id.clone()).or_insert(0) += 1;
        }
        assert_eq!(counts["a"], 30);
        assert_eq!(counts["b"], 20);
        assert_eq!(counts["c"], 10);
    }

    #[test]
    fn sticky_is_deterministic_for_fixed_session_and_set_size() {
        let t1 = target("a", 1);
        let t2 = target("b", 1);
        let t3 = target("c", 1);
        let targets = vec![&t1, &t2, &t3];
        let state = LoadBalancerState::new();

        let first = state.sticky(&targets, "session-xyz").id.clone();
        let second = state.sticky(&targets, "session-xyz").id.clone();
        assert_eq!(first, second);
    }

    #[test]
    fn best_response_time_tries_every_target_before_repeating() {
        let t1 = target("a", 1);
        let t2 = target("b", 1);
        let targets = vec![&t1, &t2];
        let state = LoadBalancerState::new();

        let mut seen = std::collections::HashSet::new();
        for _ in 0..2 {
            let picked = state.best_response_time(&targets);
            seen.insert(picked.id.clone());
        }
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn best_response_time_prefers_lower_average_once_measured() {
        let t1 = target("a", 1);
        let t2 = target("b", 1);
        let targets = vec![&t1, &t2];
        let state = LoadBalancerState::new();

        state.record_response_time("a", 10.0);
        state.record_response_time("b", 500.0);

        let picked = state.best_response_time(&targets);
        assert_eq!(picked.id, "a");
    }

    #[test]
    fn random_selection_stays_within_weighted_set() {
        let t1 = target("a", 1);
        let targets = vec![&t1];
        let state = LoadBalancerState::new();
        let rng = ThreadRng;
        let picked = state.random(&targets, &rng);
        assert_eq!(picked.id, "a");
    }
}
