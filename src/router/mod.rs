//! Host+path routing (§4.1).
//!
//! Grounded in `_teacher_ref/gateway/router.rs`'s pattern-matching router,
//! but the matching unit here is a whole service descriptor keyed by
//! `(subdomain, env, domain, root)` rather than a single path pattern, so
//! the compiled-regex approach is replaced with the descriptor's own field
//! comparisons per the routing rule in §4.1.

use crate::config::ServiceDescriptor;
use crate::error::PipelineError;

/// Strip the port from a `Host` header value and lowercase it (hostname
/// normalization is case-insensitive, §4.1).
fn normalize_host(host: &str) -> String {
    host.split(':').next().unwrap_or(host).to_ascii_lowercase()
}

fn host_matches(service: &ServiceDescriptor, host: &str) -> bool {
    let with_env = format!("{}.{}.{}", service.subdomain, service.env, service.domain);
    let without_env = format!("{}.{}", service.subdomain, service.domain);

    let matches_pattern = |pattern: &str| -> bool {
        if service.subdomain == "*" {
            // subdomain is a wildcard label: match any single label in its
            // position, keeping the remaining domain suffix fixed.
            let suffix = pattern.splitn(2, '.').nth(1).unwrap_or("");
            host.ends_with(suffix) && host.len() > suffix.len() && !host[..host.len() - suffix.len() - 1].contains('.')
        } else {
            host == pattern
        }
    };

    matches_pattern(&with_env) || matches_pattern(&without_env)
}

/// Resolve `(host, path)` to exactly one service descriptor.
///
/// Tie-break order when several descriptors match: longest `root`, then
/// most-specific host (fewer wildcards), then earliest `id` lexicographically.
pub fn resolve<'a>(
    services: &'a [ServiceDescriptor],
    host: &str,
    path: &str,
) -> Result<&'a ServiceDescriptor, PipelineError> {
    let host = normalize_host(host);

    let mut candidates: Vec<&ServiceDescriptor> = services
        .iter()
        .filter(|s| host_matches(s, &host) && path.starts_with(s.root.as_str()))
        .collect();

    candidates.sort_by(|a, b| {
        b.root
            .len()
            .cmp(&a.root.len())
            .then(a.host_wildcard_count().cmp(&b.host_wildcard_count()))
            .then(a.id.cmp(&b.id))
    });

    candidates.into_iter().next().ok_or(PipelineError::ServiceNotFound)
}

/// Resolve a virtual host to its service, ignoring path/root. Used by the
/// `/.well-known/otoroshi/login` tail (§6), which is addressed by `host`
/// alone and isn't itself served under any service's `root`.
pub fn resolve_by_host<'a>(services: &'a [ServiceDescriptor], host: &str) -> Result<&'a ServiceDescriptor, PipelineError> {
    let host = normalize_host(host);

    let mut candidates: Vec<&ServiceDescriptor> = services.iter().filter(|s| host_matches(s, &host)).collect();

    candidates.sort_by(|a, b| a.host_wildcard_count().cmp(&b.host_wildcard_count()).then(a.id.cmp(&b.id)));

    candidates.into_iter().next().ok_or(PipelineError::ServiceNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::apikey::ApiKeyConstraints;
    use crate::config::client_config::ClientConfig;
    use crate::config::ip_filter::IpFilteringConfig;
    use crate::config::restrictions::RestrictionsConfig;
    use crate::config::seccom::SecComConfig;
    use crate::config::target::{Predicate, Scheme, Target};
    use std::collections::HashMap;

    fn service(id: &str, subdomain: &str, env: &str, domain: &str, root: &str) -> ServiceDescriptor {
        ServiceDescriptor {
            id: id.into(),
            name: id.into(),
            env: env.into(),
            subdomain: subdomain.into(),
            domain: domain.into(),
            root: root.into(),
            targets: vec![Target {
                id: "t".into(),
                host: "up".into(),
                port: 80,
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
            load_balancing: Default::default(),
            jwt_verifier: None,
            restrictions: RestrictionsConfig::default(),
            group_id: "g".into(),
            private_app: false,
            auth_module: None,
            exposed_domain_override: None,
            circuit_breaker: crate::config::circuit::CircuitBreakerConfig::default(),
            cache: crate::config::cache::CacheConfig::default(),
            cors: None,
        }
    }

    #[test]
    fn matches_without_env_prefix() {
        let services = vec![service("s1", "api", "prod", "oto.tools", "/")];
        let s = resolve(&services, "api.oto.tools", "/anything").unwrap();
        assert_eq!(s.id, "s1");
    }

    #[test]
    fn matches_with_env_prefix() {
        let services = vec![service("s1", "api", "staging", "oto.tools", "/")];
        let s = resolve(&services, "api.staging.oto.tools:443", "/x").unwrap();
        assert_eq!(s.id, "s1");
    }

    #[test]
    fn wildcard_subdomain_matches_any_label() {
        let services = vec![service("s1", "*", "prod", "oto.tools", "/")];
        let s = resolve(&services, "anything.oto.tools", "/x").unwrap();
        assert_eq!(s.id, "s1");
    }

    #[test]
    fn longest_root_wins() {
        let services = vec![
            service("general", "api", "prod", "oto.tools", "/"),
            service("specific", "api", "prod", "oto.tools", "/v2"),
        ];
        let s = resolve(&services, "api.oto.tools", "/v2/users").unwrap();
        assert_eq!(s.id, "specific");
    }

    #[test]
    fn no_match_returns_service_not_found() {
        let services = vec![service("s1", "api", "prod", "oto.tools", "/")];
        let err = resolve(&services, "other.tools", "/x").unwrap_err();
        assert_eq!(err, PipelineError::ServiceNotFound);
    }

    #[test]
    fn host_is_case_insensitive() {
        let services = vec![service("s1", "api", "prod", "oto.tools", "/")];
        let s = resolve(&services, "API.OTO.TOOLS", "/x").unwrap();
        assert_eq!(s.id, "s1");
    }
}
