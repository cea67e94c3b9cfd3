//! Path/method restriction lists (§4.2.2).

use regex::Regex;
use serde::{Deserialize, Serialize};

/// One `(method, path)` matcher. `method == "*"` matches any verb; `path`
/// is anchored as a regex over the request path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestrictionEntryConfig {
    #[serde(default = "default_any_method")]
    pub method: String,
    pub path: String,
}

fn default_any_method() -> String {
    "*".to_string()
}

/// Raw, serde-facing restriction set.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RestrictionsConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Evaluate forbidden/not-found ahead of allowed.
    #[serde(default)]
    pub allow_last: bool,
    #[serde(default)]
    pub allowed: Vec<RestrictionEntryConfig>,
    #[serde(default)]
    pub forbidden: Vec<RestrictionEntryConfig>,
    #[serde(default, rename = "notFound")]
    pub not_found: Vec<RestrictionEntryConfig>,
}

struct CompiledEntry {
    method: String,
    path: Regex,
}

impl CompiledEntry {
    fn compile(entry: &RestrictionEntryConfig) -> Option<Self> {
        let anchored = if entry.path.starts_with('^') {
            entry.path.clone()
        } else {
            format!("^{}", entry.path)
        };
        Regex::new(&anchored).ok().map(|path| Self {
            method: entry.method.clone(),
            path,
        })
    }

    fn matches(&self, method: &str, path: &str) -> bool {
        (self.method == "*" || self.method.eq_ignore_ascii_case(method)) && self.path.is_match(path)
    }
}

/// Verdict of evaluating a restriction set against one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestrictionVerdict {
    /// No entry matched in a way that decides the outcome; continue to the
    /// next access-gate stage.
    Continue,
    /// Explicit allow.
    Allowed,
    /// `forbidden` matched: 403.
    Forbidden,
    /// `notFound` matched: 404.
    NotFound,
}

/// Compiled restriction set, cheap to evaluate per request.
#[derive(Default)]
pub struct Restrictions {
    enabled: bool,
    allow_last: bool,
    allowed: Vec<CompiledEntry>,
    forbidden: Vec<CompiledEntry>,
    not_found: Vec<CompiledEntry>,
}

impl Restrictions {
    /// Compile from the serde config, dropping entries with invalid regex.
    pub fn compile(config: &RestrictionsConfig) -> Self {
        Self {
            enabled: config.enabled,
            allow_last: config.allow_last,
            allowed: config.allowed.iter().filter_map(CompiledEntry::compile).collect(),
            forbidden: config.forbidden.iter().filter_map(CompiledEntry::compile).collect(),
            not_found: config.not_found.iter().filter_map(CompiledEntry::compile).collect(),
        }
    }

    /// Evaluate the ordered checks of §4.2.2.
    pub fn evaluate(&self, method: &str, path: &str) -> RestrictionVerdict {
        if !self.enabled {
            return RestrictionVerdict::Continue;
        }

        let check_allowed = || self.allowed.iter().any(|e| e.matches(method, path));
        let check_forbidden = || self.forbidden.iter().any(|e| e.matches(method, path));
        let check_not_found = || self.not_found.iter().any(|e| e.matches(method, path));

        if self.allow_last {
            if check_forbidden() {
                RestrictionVerdict::Forbidden
            } else if check_not_found() {
                RestrictionVerdict::NotFound
            } else if check_allowed() {
                RestrictionVerdict::Allowed
            } else {
                RestrictionVerdict::Continue
            }
        } else if check_allowed() {
            RestrictionVerdict::Allowed
        } else if check_forbidden() {
            RestrictionVerdict::Forbidden
        } else if check_not_found() {
            RestrictionVerdict::NotFound
        } else {
            RestrictionVerdict::Continue
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(method: &str, path: &str) -> RestrictionEntryConfig {
        RestrictionEntryConfig { method: method.to_string(), path: path.to_string() }
    }

    #[test]
    fn allow_first_short_circuits_before_forbidden() {
        let cfg = RestrictionsConfig {
            enabled: true,
            allow_last: false,
            allowed: vec![entry("*", "/public/.*")],
            forbidden: vec![entry("*", "/public/secret")],
            not_found: vec![],
        };
        let r = Restrictions::compile(&cfg);
        assert_eq!(r.evaluate("GET", "/public/secret"), RestrictionVerdict::Allowed);
    }

    #[test]
    fn allow_last_checks_forbidden_first() {
        let cfg = RestrictionsConfig {
            enabled: true,
            allow_last: true,
            allowed: vec![entry("*", "/public/.*")],
            forbidden: vec![entry("*", "/public/secret")],
            not_found: vec![],
        };
        let r = Restrictions::compile(&cfg);
        assert_eq!(r.evaluate("GET", "/public/secret"), RestrictionVerdict::Forbidden);
    }

    #[test]
    fn disabled_restrictions_always_continue() {
        let r = Restrictions::compile(&RestrictionsConfig::default());
        assert_eq!(r.evaluate("GET", "/anything"), RestrictionVerdict::Continue);
    }
}
