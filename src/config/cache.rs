//! Per-service response-cache opt-in (SPEC_FULL.md §10: "off by default...
//! never required for correctness of the core flow"), grounded on
//! `_teacher_ref/cache/mod.rs::ResponseCache` trimmed to a TTL-only policy.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(with = "humantime_serde", default = "default_ttl")]
    pub ttl: Duration,
    /// Only GET/HEAD are cacheable regardless of this list; further
    /// restricts which of those paths get cached when set.
    #[serde(default)]
    pub path_patterns: Vec<String>,
}

fn default_ttl() -> Duration {
    Duration::from_secs(30)
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { enabled: false, ttl: default_ttl(), path_patterns: Vec::new() }
    }
}
