//! Target selection: predicate filtering + load balancing (§4.3).

pub mod circuit;
pub mod load_balancer;
pub mod predicate;
pub mod sticky;

use dashmap::DashMap;

use crate::config::circuit::CircuitBreakerConfig;
use crate::config::service::LoadBalancingAlgo;
use crate::config::target::Target;
use crate::context::{GatewayContext, InstanceLocation};
use crate::error::PipelineError;

use circuit::CircuitBreaker;
use load_balancer::LoadBalancerState;

/// Per-service load balancer state, keyed by service id, plus a per-target
/// circuit breaker keyed by `(service_id, target_id)`. Owned by the gateway
/// for its lifetime; a config reload simply keeps using the existing state
/// (round-robin counters, response-time averages, and breaker trip state
/// all survive a target list change gracefully since they're keyed by id).
#[derive(Default)]
pub struct TargetRegistry {
    states: DashMap<String, LoadBalancerState>,
    breakers: DashMap<(String, String), CircuitBreaker>,
}

impl TargetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select one target for `service_id`, excluding `already_tried` (used
    /// by the pipeline's retry loop, §4.3: "never reusing a target within
    /// the same request") and any target whose circuit breaker is
    /// currently open.
    #[allow(clippy::too_many_arguments)]
    pub fn select<'a>(
        &self,
        service_id: &str,
        targets: &'a [Target],
        algo: &LoadBalancingAlgo,
        location: &InstanceLocation,
        session_id: &str,
        client_ip: &str,
        ctx: &GatewayContext,
        already_tried: &[String],
        circuit_breaker: &CircuitBreakerConfig,
    ) -> Result<&'a Target, PipelineError> {
        let filtered = predicate::filter_by_location(targets, location);
        let remaining: Vec<&Target> = filtered
            .into_iter()
            .filter(|t| !already_tried.iter().any(|id| id == &t.id))
            .filter(|t| self.breaker(service_id, &t.id).allow(circuit_breaker))
            .collect();

        if remaining.is_empty() {
            return Err(PipelineError::UpstreamConnect);
        }

        let state = self.states.entry(service_id.to_string()).or_insert_with(LoadBalancerState::new);
        Ok(load_balancer::select(&state, &remaining, algo, session_id, client_ip, ctx.rng.as_ref()))
    }

    /// Record an observed upstream response time for BestResponseTime-style
    /// balancing.
    pub fn record_response_time(&self, service_id: &str, target_id: &str, duration_ms: f64) {
        let state = self.states.entry(service_id.to_string()).or_insert_with(LoadBalancerState::new);
        state.record_response_time(target_id, duration_ms);
    }

    pub fn record_success(&self, service_id: &str, target_id: &str, config: &CircuitBreakerConfig) {
        self.breaker(service_id, target_id).record_success(config);
    }

    pub fn record_failure(&self, service_id: &str, target_id: &str, config: &CircuitBreakerConfig) {
        self.breaker(service_id, target_id).record_failure(config);
    }

    fn breaker(&self, service_id: &str, target_id: &str) -> dashmap::mapref::one::RefMut<'_, (String, String), CircuitBreaker> {
        let key = (service_id.to_string(), target_id.to_string());
        self.breakers.entry(key).or_insert_with(CircuitBreaker::new)
    }
}
