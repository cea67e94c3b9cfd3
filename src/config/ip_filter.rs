//! IP allow/deny lists (§4.2.1).
//!
//! Entries accept an exact IP, a trailing-wildcard (`a.b.c.*`), or a CIDR
//! block (`a.b.c.d/n`). Matching is grounded on `ipnet`'s `IpNet`, the same
//! crate `pks-os-neon` reaches for to parse and test CIDR membership.

use std::net::IpAddr;
use std::str::FromStr;

use ipnet::IpNet;
use serde::{Deserialize, Serialize};

/// A single whitelist/blacklist entry, normalized at parse time.
#[derive(Debug, Clone)]
enum Entry {
    Exact(IpAddr),
    Cidr(IpNet),
    /// `a.b.c.*`: matched by comparing the dotted-quad prefix.
    Wildcard(String),
}

impl Entry {
    fn parse(raw: &str) -> Option<Self> {
        if raw.contains('*') {
            let prefix = raw.trim_end_matches('*').trim_end_matches('.');
            return Some(Self::Wildcard(prefix.to_string()));
        }
        if raw.contains('/') {
            return IpNet::from_str(raw).ok().map(Self::Cidr);
        }
        IpAddr::from_str(raw).ok().map(Self::Exact)
    }

    fn matches(&self, ip: &IpAddr) -> bool {
        match self {
            Self::Exact(e) => e == ip,
            Self::Cidr(net) => net.contains(ip),
            Self::Wildcard(prefix) => ip.to_string().starts_with(prefix.as_str()),
        }
    }
}

/// Raw, serde-facing configuration: two string lists.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IpFilteringConfig {
    /// If non-empty, only these entries may reach the service.
    #[serde(default)]
    pub whitelist: Vec<String>,
    /// If an incoming IP matches any of these, the request is rejected.
    #[serde(default)]
    pub blacklist: Vec<String>,
    /// When true, the client IP is taken from the leftmost
    /// `X-Forwarded-For` entry; otherwise the socket peer address is used.
    #[serde(default)]
    pub trust_xff: bool,
}

/// Compiled form of [`IpFilteringConfig`], cheap to evaluate per request.
#[derive(Debug, Clone, Default)]
pub struct IpFilter {
    whitelist: Vec<Entry>,
    blacklist: Vec<Entry>,
}

impl IpFilter {
    /// Compile a raw config, silently dropping unparsable entries (a
    /// malformed entry must not make every request bypass the filter).
    pub fn compile(config: &IpFilteringConfig) -> Self {
        Self {
            whitelist: config.whitelist.iter().filter_map(|s| Entry::parse(s)).collect(),
            blacklist: config.blacklist.iter().filter_map(|s| Entry::parse(s)).collect(),
        }
    }

    /// True if `ip` is allowed to proceed.
    pub fn is_allowed(&self, ip: &IpAddr) -> bool {
        if !self.whitelist.is_empty() && !self.whitelist.iter().any(|e| e.matches(ip)) {
            return false;
        }
        if !self.blacklist.is_empty() && self.blacklist.iter().any(|e| e.matches(ip)) {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cidr_blacklist_blocks_members_only() {
        let cfg = IpFilteringConfig {
            whitelist: vec![],
            blacklist: vec!["1.1.1.128/26".to_string()],
            ..Default::default()
        };
        let filter = IpFilter::compile(&cfg);

        assert!(!filter.is_allowed(&"1.1.1.128".parse().unwrap()));
        assert!(!filter.is_allowed(&"1.1.1.191".parse().unwrap()));
        assert!(filter.is_allowed(&"1.1.1.192".parse().unwrap()));
    }

    #[test]
    fn empty_whitelist_allows_everything_not_blacklisted() {
        let filter = IpFilter::compile(&IpFilteringConfig::default());
        assert!(filter.is_allowed(&"8.8.8.8".parse().unwrap()));
    }

    #[test]
    fn non_empty_whitelist_excludes_non_members() {
        let cfg = IpFilteringConfig {
            whitelist: vec!["10.0.0.0/8".to_string()],
            blacklist: vec![],
            ..Default::default()
        };
        let filter = IpFilter::compile(&cfg);
        assert!(filter.is_allowed(&"10.1.2.3".parse().unwrap()));
        assert!(!filter.is_allowed(&"8.8.8.8".parse().unwrap()));
    }

    #[test]
    fn wildcard_entry_matches_prefix() {
        let cfg = IpFilteringConfig {
            whitelist: vec![],
            blacklist: vec!["192.168.1.*".to_string()],
            ..Default::default()
        };
        let filter = IpFilter::compile(&cfg);
        assert!(!filter.is_allowed(&"192.168.1.42".parse().unwrap()));
        assert!(filter.is_allowed(&"192.168.2.42".parse().unwrap()));
    }
}
