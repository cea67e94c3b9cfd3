//! State, claim/info, and state-response token shapes and signing (§4.4).

use std::time::Duration;

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::config::apikey::ApiKey;
use crate::config::seccom::{AlgoSettings, SecComInfoTokenVersion};
use crate::privateapp::PrivateAppsUser;

#[derive(Debug, Serialize, Deserialize)]
pub struct StateClaims {
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
    pub state: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StateRespClaims {
    #[serde(rename = "state-resp")]
    pub state_resp: String,
    pub iat: i64,
    pub exp: i64,
}

fn encoding_key(algo: &AlgoSettings) -> Result<EncodingKey, String> {
    match algo {
        AlgoSettings::Hs { secret } => Ok(EncodingKey::from_secret(secret.as_bytes())),
        AlgoSettings::Rs { private_pem, .. } => {
            let pem = private_pem.as_ref().ok_or("missing RS private key")?;
            EncodingKey::from_rsa_pem(pem.as_bytes()).map_err(|e| e.to_string())
        }
        AlgoSettings::Es { private_pem, .. } => {
            let pem = private_pem.as_ref().ok_or("missing ES private key")?;
            EncodingKey::from_ec_pem(pem.as_bytes()).map_err(|e| e.to_string())
        }
    }
}

fn decoding_key(algo: &AlgoSettings) -> Result<DecodingKey, String> {
    match algo {
        AlgoSettings::Hs { secret } => Ok(DecodingKey::from_secret(secret.as_bytes())),
        AlgoSettings::Rs { public_pem, .. } => {
            DecodingKey::from_rsa_pem(public_pem.as_bytes()).map_err(|e| e.to_string())
        }
        AlgoSettings::Es { public_pem, .. } => {
            DecodingKey::from_ec_pem(public_pem.as_bytes()).map_err(|e| e.to_string())
        }
    }
}

/// Issue the state token: returns the raw `state` value (to later check
/// against the upstream's state-response) and the signed JWT to send.
pub fn issue_state_token(algo: &AlgoSettings, ttl: Duration, now_secs: i64) -> Result<(String, String), String> {
    let state = Uuid::new_v4().to_string();
    let claims = StateClaims {
        jti: Uuid::new_v4().to_string(),
        iat: now_secs,
        exp: now_secs + ttl.as_secs() as i64,
        state: state.clone(),
    };
    let key = encoding_key(algo)?;
    let token = encode(&Header::new(algo.algorithm()), &claims, &key).map_err(|e| e.to_string())?;
    Ok((state, token))
}

/// Issue the claim/info token describing the caller (§4.4's Legacy/Latest shapes).
pub fn issue_claim_token(
    algo: &AlgoSettings,
    version: SecComInfoTokenVersion,
    api_key: Option<&ApiKey>,
    user: Option<&PrivateAppsUser>,
    issuer: &str,
    audience: &str,
    ttl: Duration,
    now_secs: i64,
) -> Result<String, String> {
    let jti = Uuid::new_v4().to_string();
    let exp = now_secs + ttl.as_secs() as i64;

    let claims: Value = match version {
        SecComInfoTokenVersion::Legacy => json!({
            "email": user.map(|u| u.email.clone()),
            "name": user.map(|u| u.name.clone()).or_else(|| api_key.map(|k| k.client_name.clone())),
            "app_metadata": api_key.map(|k| &k.metadata),
            "user_metadata": user.map(|u| &u.profile),
            "iss": issuer,
            "sub": api_key.map(|k| k.client_id.clone()),
            "aud": audience,
            "exp": exp,
            "iat": now_secs,
            "jti": jti,
        }),
        SecComInfoTokenVersion::Latest => json!({
            "access_type": if api_key.is_some() { "apikey" } else { "user" },
            "apikey": api_key.map(|k| json!({
                "clientId": k.client_id,
                "clientName": k.client_name,
                "metadata": k.metadata,
                "tags": k.tags,
            })),
            "user": user.map(|u| json!({
                "name": u.name,
                "email": u.email,
                "profile": u.profile,
            })),
            "iss": issuer,
            "sub": api_key.map(|k| k.client_id.clone()).or_else(|| user.map(|u| u.random_id.clone())),
            "aud": audience,
            "exp": exp,
            "iat": now_secs,
            "jti": jti,
        }),
    };

    let key = encoding_key(algo)?;
    encode(&Header::new(algo.algorithm()), &claims, &key).map_err(|e| e.to_string())
}

/// Decode and validate an inbound state-response token (V2 only). Checks
/// signature, `state-resp == expected_state`, non-expiry relative to
/// `now_secs`, and that the declared lifetime does not exceed `ttl` (§4.4
/// "declared expiry exceeds secComTtl"). Expiry is checked against the
/// caller-supplied clock rather than the library's own, so the whole
/// pipeline can be driven by [`crate::context::Clock`] in tests.
pub fn verify_state_response(
    algo: &AlgoSettings,
    token: &str,
    expected_state: &str,
    ttl: Duration,
    now_secs: i64,
) -> Result<(), String> {
    let key = decoding_key(algo)?;
    let mut validation = Validation::new(algo.algorithm());
    validation.validate_exp = false;
    validation.set_required_spec_claims(&["exp", "iat"]);

    let data = decode::<StateRespClaims>(token, &key, &validation).map_err(|e| e.to_string())?;

    if data.claims.exp <= now_secs {
        return Err("token expired".to_string());
    }
    if data.claims.state_resp != expected_state {
        return Err("state mismatch".to_string());
    }
    if data.claims.exp - data.claims.iat > ttl.as_secs() as i64 {
        return Err("declared lifetime exceeds ttl".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn algo() -> AlgoSettings {
        AlgoSettings::Hs { secret: "shared-secret".into() }
    }

    fn sign_state_resp(state: &str, iat: i64, exp: i64) -> String {
        let claims = StateRespClaims { state_resp: state.to_string(), iat, exp };
        let key = encoding_key(&algo()).unwrap();
        encode(&Header::new(algo().algorithm()), &claims, &key).unwrap()
    }

    #[test]
    fn state_token_round_trips_through_response_validation() {
        let (state, _token) = issue_state_token(&algo(), Duration::from_secs(10), 1_000).unwrap();
        let response = sign_state_resp(&state, 1_000, 1_010);
        assert!(verify_state_response(&algo(), &response, &state, Duration::from_secs(10), 1_005).is_ok());
    }

    #[test]
    fn declared_expiry_beyond_ttl_is_rejected() {
        let response = sign_state_resp("s1", 1_000, 1_020);
        let err = verify_state_response(&algo(), &response, "s1", Duration::from_secs(10), 1_005).unwrap_err();
        assert!(err.contains("ttl"));
    }

    #[test]
    fn mismatched_state_is_rejected() {
        let response = sign_state_resp("other", 1_000, 1_010);
        assert!(verify_state_response(&algo(), &response, "expected", Duration::from_secs(10), 1_005).is_err());
    }

    #[test]
    fn expired_response_is_rejected() {
        let response = sign_state_resp("s1", 1_000, 1_010);
        let err = verify_state_response(&algo(), &response, "s1", Duration::from_secs(10), 1_011).unwrap_err();
        assert!(err.contains("expired"));
    }
}
