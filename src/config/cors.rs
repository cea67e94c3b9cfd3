//! CORS policy (SPEC_FULL.md §10), grounded on
//! `_teacher_ref/middleware/cors.rs::CorsMiddleware`'s field set. A service
//! may override the site-wide `GlobalConfig` default entirely by setting
//! `ServiceDescriptor.cors`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    #[serde(default = "default_origins")]
    pub allowed_origins: Vec<String>,
    #[serde(default = "default_methods")]
    pub allowed_methods: Vec<String>,
    #[serde(default = "default_headers")]
    pub allowed_headers: Vec<String>,
    #[serde(default)]
    pub exposed_headers: Vec<String>,
    #[serde(default)]
    pub allow_credentials: bool,
    #[serde(default = "default_max_age")]
    pub max_age: u64,
}

fn default_origins() -> Vec<String> {
    vec!["*".to_string()]
}
fn default_methods() -> Vec<String> {
    vec!["GET", "POST", "PUT", "DELETE", "PATCH", "OPTIONS"].into_iter().map(String::from).collect()
}
fn default_headers() -> Vec<String> {
    vec!["*".to_string()]
}
fn default_max_age() -> u64 {
    3600
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: default_origins(),
            allowed_methods: default_methods(),
            allowed_headers: default_headers(),
            exposed_headers: Vec::new(),
            allow_credentials: false,
            max_age: default_max_age(),
        }
    }
}

impl CorsConfig {
    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        self.allowed_origins.iter().any(|allowed| {
            if allowed == "*" {
                true
            } else if let Some(prefix) = allowed.strip_suffix('*') {
                origin.starts_with(prefix)
            } else if let Some(suffix) = allowed.strip_prefix('*') {
                origin.ends_with(suffix)
            } else {
                allowed == origin
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_origin_allows_anything() {
        assert!(CorsConfig::default().is_origin_allowed("https://example.com"));
    }

    #[test]
    fn pattern_origin_matches_subdomain_prefix() {
        let cors = CorsConfig { allowed_origins: vec!["https://*.example.com".to_string()], ..CorsConfig::default() };
        assert!(cors.is_origin_allowed("https://api.example.com"));
        assert!(!cors.is_origin_allowed("https://example.com"));
    }

    #[test]
    fn exact_origin_rejects_mismatch() {
        let cors = CorsConfig { allowed_origins: vec!["https://example.com".to_string()], ..CorsConfig::default() };
        assert!(!cors.is_origin_allowed("https://other.com"));
    }
}
