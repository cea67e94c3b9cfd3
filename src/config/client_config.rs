//! Per-service HTTP client tuning (§4.5 timeout tiers, §4.3 retries).

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timeout tiers and retry budget for calls to a service's targets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Max time to obtain the upstream response status line.
    #[serde(with = "humantime_serde")]
    pub call_timeout: Duration,
    /// Max idle gap on the response body stream.
    #[serde(with = "humantime_serde")]
    pub idle_timeout: Duration,
    /// Max total time from dispatch to body completion.
    #[serde(with = "humantime_serde")]
    pub call_and_stream_timeout: Duration,
    /// Per-request upper bound across all retries.
    #[serde(with = "humantime_serde")]
    pub global_timeout: Duration,
    /// Number of additional targets to try on a retryable failure.
    #[serde(default = "default_retries")]
    pub retries: u32,
}

fn default_retries() -> u32 {
    1
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(60),
            call_and_stream_timeout: Duration::from_secs(120),
            global_timeout: Duration::from_secs(30),
            retries: default_retries(),
        }
    }
}
