//! Upstream target descriptors (§3 `Target`).

use serde::{Deserialize, Serialize};

/// Wire scheme used to reach a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }
}

/// Instance placement predicate used to filter targets to the ones reachable
/// (or preferred) from this instance's `(region, zone)` (§4.3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Predicate {
    /// Matches every instance.
    AllMatch,
    /// Matches instances whose region equals `region`.
    RegionMatch { region: String },
    /// Matches instances whose zone equals `zone`.
    ZoneMatch { zone: String },
    /// Matches instances whose region and zone both match.
    RegionAndZoneMatch { region: String, zone: String },
    /// Matches instances located on the given network, by opaque label
    /// (the core does not resolve actual network topology).
    NetworkLocation { provider: String, region: String, zone: String, dc: String },
}

impl Default for Predicate {
    fn default() -> Self {
        Self::AllMatch
    }
}

impl Predicate {
    /// Evaluate against the current instance's location.
    pub fn matches(&self, region: Option<&str>, zone: Option<&str>) -> bool {
        match self {
            Self::AllMatch => true,
            Self::RegionMatch { region: r } => region == Some(r.as_str()),
            Self::ZoneMatch { zone: z } => zone == Some(z.as_str()),
            Self::RegionAndZoneMatch { region: r, zone: z } => {
                region == Some(r.as_str()) && zone == Some(z.as_str())
            }
            Self::NetworkLocation { region: r, zone: z, .. } => {
                region == Some(r.as_str()) && zone == Some(z.as_str())
            }
        }
    }
}

/// A single upstream endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    /// Stable identifier, unique within a service's target list.
    pub id: String,
    pub host: String,
    pub port: u16,
    pub scheme: Scheme,
    /// Rotation weight; must be >= 1. A weight of 3 means the target
    /// appears 3 times in the RoundRobin rotation.
    #[serde(default = "default_weight")]
    pub weight: u32,
    /// DNS bypass: connect to this IP while keeping `Host`/SNI as `host`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub predicate: Predicate,
}

fn default_weight() -> u32 {
    1
}

impl Target {
    /// `scheme://host:port` base URI, ignoring any `ip_address` override
    /// (that override only affects the actual TCP connect, not this
    /// logical base used for Host/SNI purposes).
    pub fn base_authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The address the TCP connection should actually be opened against.
    pub fn connect_host(&self) -> &str {
        self.ip_address.as_deref().unwrap_or(&self.host)
    }
}
