//! API key entities and routing constraints (§3, §4.2.5-6).

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// Per-dimension quota limits attached to an API key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyQuotas {
    /// Calls allowed per rolling second.
    pub throttling_quota: u64,
    pub daily_quota: u64,
    pub monthly_quota: u64,
}

impl Default for ApiKeyQuotas {
    fn default() -> Self {
        Self {
            throttling_quota: u64::MAX,
            daily_quota: u64::MAX,
            monthly_quota: u64::MAX,
        }
    }
}

/// A configured API key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub client_id: String,
    pub client_secret: String,
    pub client_name: String,
    /// Service group this key is authorized against; must equal the
    /// matched service's `authorized_group`.
    pub authorized_group: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub tags: HashSet<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub quotas: ApiKeyQuotas,
}

fn default_true() -> bool {
    true
}

/// Routing matcher evaluated after an API key has been identified
/// (§4.2.6). Any combination may be configured; all configured clauses
/// must hold.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RoutingMatcher {
    #[serde(default)]
    pub one_tag_in: Vec<String>,
    #[serde(default)]
    pub all_tags_in: Vec<String>,
    #[serde(default)]
    pub one_meta_in: Vec<(String, String)>,
    #[serde(default)]
    pub all_meta_in: Vec<(String, String)>,
}

impl RoutingMatcher {
    /// Whether the given key satisfies every configured clause. A clause
    /// with an empty list is trivially satisfied.
    pub fn matches(&self, key: &ApiKey) -> bool {
        let one_tag_ok = self.one_tag_in.is_empty()
            || self.one_tag_in.iter().any(|t| key.tags.contains(t));
        let all_tags_ok = self.all_tags_in.iter().all(|t| key.tags.contains(t));
        let one_meta_ok = self.one_meta_in.is_empty()
            || self
                .one_meta_in
                .iter()
                .any(|(k, v)| key.metadata.get(k) == Some(v));
        let all_meta_ok = self
            .all_meta_in
            .iter()
            .all(|(k, v)| key.metadata.get(k) == Some(v));

        one_tag_ok && all_tags_ok && one_meta_ok && all_meta_ok
    }
}

/// Where bearer/basic/JWT credentials may be supplied and under what names
/// (§3 `ApiKeyConstraints`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyConstraints {
    #[serde(default)]
    pub routing: RoutingMatcher,
    #[serde(default = "default_true")]
    pub bearer_auth_enabled: bool,
    #[serde(default = "default_true")]
    pub basic_auth_enabled: bool,
    #[serde(default = "default_true")]
    pub custom_headers_auth_enabled: bool,
    #[serde(default = "default_client_id_header")]
    pub client_id_header_name: String,
    #[serde(default = "default_client_secret_header")]
    pub client_secret_header_name: String,
}

fn default_client_id_header() -> String {
    "Otoroshi-Client-Id".to_string()
}
fn default_client_secret_header() -> String {
    "Otoroshi-Client-Secret".to_string()
}

impl Default for ApiKeyConstraints {
    fn default() -> Self {
        Self {
            routing: RoutingMatcher::default(),
            bearer_auth_enabled: true,
            basic_auth_enabled: true,
            custom_headers_auth_enabled: true,
            client_id_header_name: default_client_id_header(),
            client_secret_header_name: default_client_secret_header(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_with(tags: &[&str], meta: &[(&str, &str)]) -> ApiKey {
        ApiKey {
            client_id: "c".into(),
            client_secret: "s".into(),
            client_name: "n".into(),
            authorized_group: "g".into(),
            enabled: true,
            tags: tags.iter().map(|s| s.to_string()).collect(),
            metadata: meta.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            quotas: ApiKeyQuotas::default(),
        }
    }

    #[test]
    fn one_tag_in_requires_at_least_one() {
        let m = RoutingMatcher { one_tag_in: vec!["user".into()], ..Default::default() };
        assert!(m.matches(&key_with(&["user", "foo"], &[])));
        assert!(!m.matches(&key_with(&["foo"], &[])));
    }

    #[test]
    fn all_tags_in_requires_every_one() {
        let m = RoutingMatcher { all_tags_in: vec!["leveled".into(), "root".into()], ..Default::default() };
        assert!(m.matches(&key_with(&["leveled", "root", "extra"], &[])));
        assert!(!m.matches(&key_with(&["leveled"], &[])));
    }

    #[test]
    fn all_meta_in_requires_every_pair() {
        let m = RoutingMatcher {
            all_meta_in: vec![("level".into(), "2".into()), ("root".into(), "true".into())],
            ..Default::default()
        };
        assert!(m.matches(&key_with(&[], &[("level", "2"), ("root", "true")])));
        assert!(!m.matches(&key_with(&[], &[("level", "2")])));
    }
}
