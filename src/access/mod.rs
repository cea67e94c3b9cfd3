//! The ordered access gate (§4.2): IP filter, restrictions, public
//! short-circuit, JWT verification, API-key extraction, routing
//! constraints, quota — first failure short-circuits the chain.

pub mod apikey;
pub mod ip_filter;
pub mod jwt;
pub mod quota;
pub mod restrictions;

use std::net::IpAddr;

use chrono::Local;
use http::{HeaderMap, Uri};
use serde_json::Value;

use crate::config::apikey::ApiKey;
use crate::config::ip_filter::IpFilter;
use crate::config::restrictions::Restrictions;
use crate::config::service::ServiceDescriptor;
use crate::context::GatewayContext;
use crate::error::PipelineError;
use crate::privateapp;
use crate::transformer;

/// What the gate resolved for a request that passed every stage; attached
/// to request attributes for downstream hooks (§4.2: "successes attach
/// `apiKey` and, if present, `user`").
pub struct AccessOutcome<'a> {
    pub is_public: bool,
    pub api_key: Option<&'a ApiKey>,
    pub jwt_claims: Option<Value>,
}

/// Run every stage of the access gate for one request against its matched
/// service.
pub async fn evaluate<'a>(
    ctx: &GatewayContext,
    service: &'a ServiceDescriptor,
    api_keys: &'a [ApiKey],
    headers: &HeaderMap,
    uri: &Uri,
    method: &str,
    path: &str,
    socket_ip: IpAddr,
) -> Result<AccessOutcome<'a>, PipelineError> {
    let filter = IpFilter::compile(&service.ip_filtering);
    let client_ip = ip_filter::client_ip(headers, socket_ip, service.ip_filtering.trust_xff);
    ip_filter::check(&filter, client_ip)?;

    let restrictions = Restrictions::compile(&service.restrictions);
    // `Ok(true)` only means "stop evaluating restriction entries" (§4.2.2);
    // it says nothing about whether auth is still required, so it must not
    // feed into `is_public`.
    restrictions::check(&restrictions, method, path)?;

    if service.is_public_path(path) {
        return Ok(AccessOutcome { is_public: true, api_key: None, jwt_claims: None });
    }

    let jwt_claims = match &service.jwt_verifier {
        Some(verifier) if verifier.enabled => jwt::verify(headers, uri, verifier)?,
        _ => None,
    };

    if jwt_claims.is_some() {
        return Ok(AccessOutcome { is_public: false, api_key: None, jwt_claims });
    }

    // Optional private-app session cookie stage (§4.2: "optional private-app
    // session cookie"), on par with the JWT and API-key stages above — a
    // service gated only by a logged-in private-app user, with no
    // jwtVerifier or API keys configured, must still admit that user.
    if service.private_app {
        let now_ms = ctx.clock.now_millis();
        if privateapp::user_from_cookie(headers, &service.id, &ctx.sessions, now_ms).is_some() {
            return Ok(AccessOutcome { is_public: false, api_key: None, jwt_claims: None });
        }

        // A configured local auth module (§9 `authModule.callback`) gets a
        // chance to establish the session itself from credentials carried on
        // this same request, rather than only ever reading an existing
        // cookie; this is the only concrete module (`BasicAuthModule`) that
        // authenticates against the gateway directly instead of redirecting
        // to an external identity provider.
        if let Some(module) = service.auth_module.as_ref().and_then(|m| m.as_module()) {
            if let Some(credentials) = transformer::basic_credentials_from_header(headers) {
                if module.callback(&credentials, &ctx.sessions).is_ok() {
                    return Ok(AccessOutcome { is_public: false, api_key: None, jwt_claims: None });
                }
            }
        }
    }

    let api_key = apikey::resolve(headers, service, api_keys)?.ok_or(PipelineError::AuthRequired)?;

    quota::check(ctx.datastore.as_ref(), api_key, Local::now()).await?;

    Ok(AccessOutcome { is_public: false, api_key: Some(api_key), jwt_claims: None })
}
