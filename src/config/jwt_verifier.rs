//! JWT verifier configuration (§4.2.4).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::seccom::AlgoSettings;

/// Where to look for the bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TokenLocation {
    InHeader { name: String },
    InQueryParam { name: String },
    InCookie { name: String },
}

/// Claim-level verification beyond signature checking.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct VerificationSettings {
    /// Claim name -> required exact value.
    #[serde(default)]
    pub equality_fields: HashMap<String, String>,
    /// Claim name -> value that must be present in the claim's array.
    #[serde(default)]
    pub array_fields: HashMap<String, String>,
}

/// A configured JWT verifier attached to a service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtVerifierConfig {
    pub enabled: bool,
    /// When true, a request with no token at all is rejected (400) even if
    /// it would otherwise be public.
    #[serde(default)]
    pub strict: bool,
    pub source: TokenLocation,
    pub algo: AlgoSettings,
    #[serde(default)]
    pub verification: VerificationSettings,
}

impl Default for JwtVerifierConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            strict: false,
            source: TokenLocation::InHeader { name: "Authorization".to_string() },
            algo: AlgoSettings::Hs { secret: String::new() },
            verification: VerificationSettings::default(),
        }
    }
}
