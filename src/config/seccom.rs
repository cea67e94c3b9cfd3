//! Secure-communication exchange configuration (§3, §4.4).

use std::time::Duration;

use jsonwebtoken::Algorithm;
use serde::{Deserialize, Serialize};

/// Protocol version governing whether a state-response token is validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecComVersion {
    /// No response-token validation.
    V1,
    /// Validates the upstream's signed state-response token.
    V2,
}

/// Shape of the claim/info token sent to the upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecComInfoTokenVersion {
    /// Flat fields matching the v1 wire shape.
    Legacy,
    /// Nested `{apikey, user, ...}` shape.
    Latest,
}

/// Signing algorithm and key material shared between issuer and verifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "algo", rename_all = "UPPERCASE")]
pub enum AlgoSettings {
    /// HMAC with the given shared secret.
    Hs { secret: String },
    /// RSA, PEM-encoded keys.
    Rs { public_pem: String, private_pem: Option<String> },
    /// ECDSA, PEM-encoded keys.
    Es { public_pem: String, private_pem: Option<String> },
}

impl AlgoSettings {
    /// The `jsonwebtoken::Algorithm` this setting signs/verifies with.
    pub fn algorithm(&self) -> Algorithm {
        match self {
            Self::Hs { .. } => Algorithm::HS256,
            Self::Rs { .. } => Algorithm::RS256,
            Self::Es { .. } => Algorithm::ES256,
        }
    }
}

/// Overridable header names for the state/claim/state-response exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecComHeaders {
    #[serde(default = "default_state_header")]
    pub state_request_name: String,
    #[serde(default = "default_claim_header")]
    pub claim_request_name: String,
    #[serde(default = "default_state_resp_header")]
    pub state_response_name: String,
}

fn default_state_header() -> String {
    "Otoroshi-State".to_string()
}
fn default_claim_header() -> String {
    "Otoroshi-Claim".to_string()
}
fn default_state_resp_header() -> String {
    "Otoroshi-State-Resp".to_string()
}

impl Default for SecComHeaders {
    fn default() -> Self {
        Self {
            state_request_name: default_state_header(),
            claim_request_name: default_claim_header(),
            state_response_name: default_state_resp_header(),
        }
    }
}

/// Full secure-communication configuration for one service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecComConfig {
    pub enforce: bool,
    pub send_state_challenge: bool,
    pub send_info_token: bool,
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
    pub version: SecComVersion,
    pub info_token_version: SecComInfoTokenVersion,
    pub settings: AlgoSettings,
    #[serde(default)]
    pub headers: SecComHeaders,
}

impl Default for SecComConfig {
    fn default() -> Self {
        Self {
            enforce: false,
            send_state_challenge: true,
            send_info_token: false,
            ttl: Duration::from_secs(30),
            version: SecComVersion::V1,
            info_token_version: SecComInfoTokenVersion::Legacy,
            settings: AlgoSettings::Hs { secret: String::new() },
            headers: SecComHeaders::default(),
        }
    }
}
