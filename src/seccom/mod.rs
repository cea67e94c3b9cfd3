//! Secure-communication exchange (§4.4): state/claim token issuance and
//! state-response validation, modeled as an explicit state machine.

pub mod replay_cache;
pub mod tokens;

use std::time::Duration;

pub use replay_cache::ReplayCache;

use crate::config::apikey::ApiKey;
use crate::config::seccom::SecComConfig;
use crate::config::service::ServiceDescriptor;
use crate::error::PipelineError;
use crate::privateapp::PrivateAppsUser;

/// Per-call secure-communication state machine (§4.4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecComStatus {
    Ready,
    TokensIssued,
    Sent,
    Awaiting,
    Verified,
    Rejected,
    Timeout,
    Reported,
}

/// Outbound headers to attach to the upstream request, and the `state`
/// value to check the response against (empty if not engaged).
pub struct OutboundTokens {
    pub headers: Vec<(String, String)>,
    pub state: Option<String>,
}

/// Issue the outbound state/claim headers for one upstream attempt. Returns
/// `OutboundTokens` with an empty header list if secure communication is
/// not enforced for this service.
pub fn issue_outbound(
    service: &ServiceDescriptor,
    api_key: Option<&ApiKey>,
    user: Option<&PrivateAppsUser>,
    issuer: &str,
    audience: &str,
    now_secs: i64,
) -> Result<OutboundTokens, PipelineError> {
    let seccom = &service.seccom;
    if !seccom.enforce {
        return Ok(OutboundTokens { headers: vec![], state: None });
    }

    let mut headers = Vec::new();
    let mut state = None;

    if seccom.send_state_challenge {
        let (s, token) = tokens::issue_state_token(&seccom.settings, seccom.ttl, now_secs)
            .map_err(|_| PipelineError::Internal)?;
        headers.push((seccom.headers.state_request_name.clone(), token));
        state = Some(s);
    }

    if seccom.send_info_token {
        let claim = tokens::issue_claim_token(
            &seccom.settings,
            seccom.info_token_version,
            api_key,
            user,
            issuer,
            audience,
            seccom.ttl,
            now_secs,
        )
        .map_err(|_| PipelineError::Internal)?;
        headers.push((seccom.headers.claim_request_name.clone(), claim));
    }

    Ok(OutboundTokens { headers, state })
}

/// Validate the upstream's state-response header, when required (§4.4: "V2
/// only; V1 does not validate a response token"). `response_header` is the
/// raw header value the upstream returned, if any.
pub fn validate_inbound(
    seccom: &SecComConfig,
    expected_state: &Option<String>,
    response_header: Option<&str>,
    replay_cache: &ReplayCache,
    now_secs: i64,
) -> Result<SecComStatus, PipelineError> {
    use crate::config::seccom::SecComVersion;

    if seccom.version != SecComVersion::V2 {
        return Ok(SecComStatus::Reported);
    }
    let Some(state) = expected_state else {
        return Ok(SecComStatus::Reported);
    };

    let Some(token) = response_header else {
        return Err(PipelineError::UpstreamTokenInvalid);
    };

    tokens::verify_state_response(&seccom.settings, token, state, seccom.ttl, now_secs)
        .map_err(|_| PipelineError::UpstreamTokenInvalid)?;

    if !replay_cache.check_and_insert(state, seccom.ttl) {
        return Err(PipelineError::UpstreamTokenInvalid);
    }

    Ok(SecComStatus::Verified)
}
