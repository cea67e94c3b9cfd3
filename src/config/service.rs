//! Service descriptors (§3 `ServiceDescriptor`) and global defaults.

use std::collections::HashMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::apikey::ApiKeyConstraints;
use super::cache::CacheConfig;
use super::circuit::CircuitBreakerConfig;
use super::client_config::ClientConfig;
use super::cors::CorsConfig;
use super::ip_filter::IpFilteringConfig;
use super::jwt_verifier::JwtVerifierConfig;
use super::restrictions::RestrictionsConfig;
use super::seccom::SecComConfig;
use super::target::Target;

/// Load-balancing discipline applied across a service's targets (§4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoadBalancingAlgo {
    RoundRobin,
    Random,
    Sticky,
    IpAddressHash,
    BestResponseTime,
    /// `ratio` in `(0, 1]`: probability of picking the lowest-average
    /// target rather than a uniform pick among the rest.
    WeightedBestResponseTime { ratio: f64 },
}

impl Default for LoadBalancingAlgo {
    fn default() -> Self {
        Self::RoundRobin
    }
}

/// A declaratively configured virtual service (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub id: String,
    pub name: String,
    pub env: String,
    pub subdomain: String,
    pub domain: String,
    #[serde(default = "default_root")]
    pub root: String,
    pub targets: Vec<Target>,
    #[serde(default)]
    pub public_patterns: Vec<String>,
    #[serde(default)]
    pub private_patterns: Vec<String>,
    #[serde(default)]
    pub force_https: bool,
    #[serde(default)]
    pub seccom: SecComConfig,
    #[serde(default)]
    pub additional_headers: HashMap<String, String>,
    #[serde(default)]
    pub api_key_constraints: ApiKeyConstraints,
    #[serde(default)]
    pub client_config: ClientConfig,
    #[serde(default)]
    pub ip_filtering: IpFilteringConfig,
    #[serde(default)]
    pub load_balancing: LoadBalancingAlgo,
    #[serde(default)]
    pub jwt_verifier: Option<JwtVerifierConfig>,
    #[serde(default)]
    pub restrictions: RestrictionsConfig,
    /// Service group this descriptor belongs to; an API key's
    /// `authorized_group` must match this for the key to be valid here.
    pub group_id: String,
    #[serde(default)]
    pub private_app: bool,
    /// Identity backend used to establish a private-app session when this
    /// service's gate sees no valid session cookie (§4.2/§9 `authModule`).
    /// Only meaningful when `private_app` is set.
    #[serde(default)]
    pub auth_module: Option<crate::transformer::AuthModuleKind>,
    /// Override for `exposedDomain`; when absent, derived as
    /// `subdomain.domain`.
    #[serde(default)]
    pub exposed_domain_override: Option<String>,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    /// Overrides `GlobalConfig.cors` entirely when set.
    #[serde(default)]
    pub cors: Option<CorsConfig>,
}

fn default_root() -> String {
    "/".to_string()
}

impl ServiceDescriptor {
    /// `exposedDomain` derivation (§3).
    pub fn exposed_domain(&self) -> String {
        self.exposed_domain_override
            .clone()
            .unwrap_or_else(|| format!("{}.{}", self.subdomain, self.domain))
    }

    /// Number of wildcard labels in the host match, used as a router
    /// specificity tiebreaker (§4.1: "most-specific host (fewer
    /// wildcards)").
    pub fn host_wildcard_count(&self) -> usize {
        usize::from(self.subdomain == "*")
    }

    /// Public/private partition (§4.1). A path is public iff some public
    /// pattern matches and no private pattern matches.
    pub fn is_public_path(&self, path: &str) -> bool {
        let matches_any = |patterns: &[String]| {
            patterns.iter().any(|p| {
                Regex::new(p).map(|re| re.is_match(path)).unwrap_or(false)
            })
        };
        matches_any(&self.public_patterns) && !matches_any(&self.private_patterns)
    }
}

/// Site-wide defaults (§3 `GlobalConfig`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub metrics_enabled: bool,
    #[serde(default)]
    pub auto_link_to_default_group: bool,
    /// Name of the default service group new API keys attach to when
    /// `auto_link_to_default_group` is set.
    #[serde(default = "default_group")]
    pub default_group: String,
    /// Optional query-string key gating `/.well-known/otoroshi/metrics`.
    #[serde(default)]
    pub metrics_access_key: Option<String>,
    /// Site-wide CORS default; a service overrides it via
    /// `ServiceDescriptor.cors`.
    #[serde(default)]
    pub cors: CorsConfig,
}

fn default_group() -> String {
    "default".to_string()
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: true,
            auto_link_to_default_group: true,
            default_group: default_group(),
            metrics_access_key: None,
            cors: CorsConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(public: &[&str], private: &[&str]) -> ServiceDescriptor {
        ServiceDescriptor {
            id: "s1".into(),
            name: "s1".into(),
            env: "prod".into(),
            subdomain: "api".into(),
            domain: "oto.tools".into(),
            root: "/".into(),
            targets: vec![],
            public_patterns: public.iter().map(|s| s.to_string()).collect(),
            private_patterns: private.iter().map(|s| s.to_string()).collect(),
            force_https: false,
            seccom: SecComConfig::default(),
            additional_headers: HashMap::new(),
            api_key_constraints: ApiKeyConstraints::default(),
            client_config: ClientConfig::default(),
            ip_filtering: IpFilteringConfig::default(),
            load_balancing: LoadBalancingAlgo::default(),
            jwt_verifier: None,
            restrictions: RestrictionsConfig::default(),
            group_id: "g".into(),
            private_app: false,
            auth_module: None,
            exposed_domain_override: None,
            circuit_breaker: CircuitBreakerConfig::default(),
            cache: CacheConfig::default(),
            cors: None,
        }
    }

    #[test]
    fn public_pattern_without_private_override_is_public() {
        let d = descriptor(&["^/health$"], &[]);
        assert!(d.is_public_path("/health"));
        assert!(!d.is_public_path("/private"));
    }

    #[test]
    fn private_pattern_overrides_public() {
        let d = descriptor(&["^/api/.*"], &["^/api/admin"]);
        assert!(d.is_public_path("/api/users"));
        assert!(!d.is_public_path("/api/admin"));
    }

    #[test]
    fn exposed_domain_derives_from_subdomain_and_domain() {
        let d = descriptor(&[], &[]);
        assert_eq!(d.exposed_domain(), "api.oto.tools");
    }
}
