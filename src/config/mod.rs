//! Gateway configuration.
//!
//! A [`ConfigSnapshot`] is the read-mostly view described in §2.1: the
//! external datastore collaborator publishes a new snapshot whenever an
//! entity changes, and every request handler borrows the current one
//! through an `arc_swap::ArcSwap` without taking a lock.

pub mod apikey;
pub mod cache;
pub mod circuit;
pub mod client_config;
pub mod cors;
pub mod ip_filter;
pub mod jwt_verifier;
pub mod restrictions;
pub mod seccom;
pub mod service;
pub mod target;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use apikey::ApiKey;
pub use service::{GlobalConfig, ServiceDescriptor};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("parse error: {0}")]
    Parse(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// The full set of configuration entities the pipeline consumes, as loaded
/// from the external datastore (§3 "Ownership": config entities are owned
/// by the datastore, single writer many readers).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConfigSnapshot {
    pub services: Vec<ServiceDescriptor>,
    pub api_keys: Vec<ApiKey>,
    #[serde(default)]
    pub global: GlobalConfig,
}

impl ConfigSnapshot {
    /// Load a snapshot from a JSON document (the wire shape persisted
    /// entities use, per §6).
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Validate structural invariants before publishing a snapshot.
    pub fn validate(&self) -> Result<()> {
        for service in &self.services {
            if service.targets.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "service {} has no targets",
                    service.id
                )));
            }
            if service.root.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "service {} has an empty root path",
                    service.id
                )));
            }
        }

        // (subdomain, env, domain, root) must be unique, or partitions
        // must be disjoint; we only enforce the uniqueness half here since
        // disjointness of arbitrary regex sets is undecidable in general.
        let mut seen: HashMap<(String, String, String, String), &ServiceDescriptor> = HashMap::new();
        for service in &self.services {
            let key = (
                service.subdomain.clone(),
                service.env.clone(),
                service.domain.clone(),
                service.root.clone(),
            );
            if let Some(existing) = seen.get(&key) {
                if existing.public_patterns == service.public_patterns
                    && existing.private_patterns == service.private_patterns
                {
                    return Err(ConfigError::Invalid(format!(
                        "services {} and {} share an identical routing key with no pattern partition",
                        existing.id, service.id
                    )));
                }
            } else {
                seen.insert(key, service);
            }
        }

        Ok(())
    }

    /// Look up an API key by client id.
    pub fn api_key(&self, client_id: &str) -> Option<&ApiKey> {
        self.api_keys.iter().find(|k| k.client_id == client_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::client_config::ClientConfig;
    use super::ip_filter::IpFilteringConfig;
    use super::apikey::ApiKeyConstraints;
    use super::restrictions::RestrictionsConfig;
    use super::seccom::SecComConfig;
    use super::target::{Predicate, Scheme, Target};

    fn service(id: &str) -> ServiceDescriptor {
        ServiceDescriptor {
            id: id.into(),
            name: id.into(),
            env: "prod".into(),
            subdomain: "api".into(),
            domain: "oto.tools".into(),
            root: "/".into(),
            targets: vec![Target {
                id: "t1".into(),
                host: "upstream.local".into(),
                port: 8080,
                scheme: Scheme::Http,
                weight: 1,
                ip_address: None,
                predicate: Predicate::AllMatch,
            }],
            public_patterns: vec![],
            private_patterns: vec![],
            force_https: false,
            seccom: SecComConfig::default(),
            additional_headers: HashMap::new(),
            api_key_constraints: ApiKeyConstraints::default(),
            client_config: ClientConfig::default(),
            ip_filtering: IpFilteringConfig::default(),
            load_balancing: service::LoadBalancingAlgo::default(),
            jwt_verifier: None,
            restrictions: RestrictionsConfig::default(),
            group_id: "g".into(),
            private_app: false,
            auth_module: None,
            exposed_domain_override: None,
            circuit_breaker: super::circuit::CircuitBreakerConfig::default(),
            cache: super::cache::CacheConfig::default(),
            cors: None,
        }
    }

    #[test]
    fn validate_rejects_service_with_no_targets() {
        let mut s = service("s1");
        s.targets.clear();
        let snapshot = ConfigSnapshot { services: vec![s], ..Default::default() };
        assert!(snapshot.validate().is_err());
    }

    #[test]
    fn validate_rejects_duplicate_routing_key_with_identical_patterns() {
        let snapshot = ConfigSnapshot {
            services: vec![service("s1"), service("s2")],
            ..Default::default()
        };
        assert!(snapshot.validate().is_err());
    }

    #[test]
    fn validate_accepts_duplicate_routing_key_with_disjoint_patterns() {
        let mut s1 = service("s1");
        s1.public_patterns = vec!["^/a".into()];
        let mut s2 = service("s2");
        s2.public_patterns = vec!["^/b".into()];
        let snapshot = ConfigSnapshot { services: vec![s1, s2], ..Default::default() };
        assert!(snapshot.validate().is_ok());
    }
}
