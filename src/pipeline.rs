//! End-to-end request handling (§4): route → access gate → target selection
//! → secure-communication exchange → proxy forward, with retry across
//! targets and stats recording on completion.
//!
//! Grounded on `_teacher_ref/lib.rs::handle_request`'s route → load-balance
//! → circuit-breaker → forward → metrics shape, generalized to the full
//! access pipeline and target-retry loop this gateway specifies.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::response::{IntoResponse, Response as AxumResponse};
use http::{HeaderMap, HeaderName, HeaderValue, Method, Request, Response, StatusCode, Uri};
use http_body_util::{BodyExt, Limited};
use tracing::warn;

use crate::access;
use crate::cache::{self, ResponseCache};
use crate::config::service::ServiceDescriptor;
use crate::context::GatewayContext;
use crate::cors;
use crate::error::PipelineError;
use crate::privateapp::{self, PrivateAppsUser};
use crate::proxy::timeouts::GlobalDeadline;
use crate::proxy::ProxyClient;
use crate::router;
use crate::seccom;
use crate::targets::TargetRegistry;
use crate::transformer::{self, RequestTransformer};

/// Request bodies are buffered, bounded by this cap, only when a service's
/// `clientConfig.retries` is nonzero (retrying a streamed body is not
/// possible without replaying it). Bodies over the cap, or services with
/// `retries == 0`, are forwarded as a single streamed attempt with no retry.
const MAX_RETRY_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Everything the axum handler needs beyond [`GatewayContext`]: the target
/// registry and proxy client are per-gateway singletons rather than part of
/// the context's fixed collaborator set (Design Notes §9 names `{ config,
/// datastore, clock, rng, metrics, sessionStore, replayCache }` only).
#[derive(Clone)]
pub struct PipelineState {
    pub ctx: GatewayContext,
    pub targets: Arc<TargetRegistry>,
    pub proxy: Arc<ProxyClient>,
    pub prometheus: Arc<crate::metrics::prometheus::PrometheusExporter>,
    pub response_cache: Arc<ResponseCache>,
    /// `iss`/`aud` stamped into issued claim tokens (§4.4).
    pub issuer: String,
    pub audience: String,
}

/// Axum entrypoint: any host/path not matched by a reserved `/.well-known`
/// route lands here.
pub async fn handle(
    State(state): State<PipelineState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> AxumResponse {
    match process(&state, peer.ip(), request).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn process(state: &PipelineState, socket_ip: IpAddr, request: Request<Body>) -> Result<AxumResponse, PipelineError> {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let path = uri.path().to_string();
    let host = request
        .headers()
        .get(http::header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    let headers = request.headers().clone();

    let snapshot = state.ctx.config();
    let service = router::resolve(&snapshot.services, &host, &path)?;
    let cors_config = cors::effective(&snapshot.global.cors, service.cors.as_ref());
    let origin = headers.get(http::header::ORIGIN).and_then(|v| v.to_str().ok());

    if cors::is_preflight(&method, &headers) {
        let (status, cors_headers) = cors::preflight_response(cors_config, origin);
        let mut response = Response::new(Body::empty());
        *response.status_mut() = status;
        *response.headers_mut() = cors_headers;
        return Ok(response.into_response());
    }

    let access = access::evaluate(
        &state.ctx,
        service,
        &snapshot.api_keys,
        &headers,
        &uri,
        method.as_str(),
        &path,
        socket_ip,
    )
    .await?;

    let client_ip = access::ip_filter::client_ip(&headers, socket_ip, service.ip_filtering.trust_xff);
    let client_ip_str = client_ip.to_string();
    let request_scheme = if service.force_https { "https" } else { "http" };

    let (tracking_id, tracking_is_new) = tracking_session_id(&headers, state.ctx.rng.as_ref());
    let user = private_app_user(service, &headers, state);

    let cache_key = (method == Method::GET || method == Method::HEAD)
        .then(|| cache_key_for(service, &path, uri.query()))
        .flatten();

    let mut response = match cache_key.as_ref().and_then(|key| state.response_cache.get(key)) {
        Some(hit) => cached_response(hit),
        None => {
            let forwarded = forward_with_retry(
                state,
                service,
                &method,
                &uri,
                &headers,
                request.into_body(),
                &client_ip_str,
                request_scheme,
                &host,
                &tracking_id,
                access.api_key,
                user.as_ref(),
            )
            .await?;
            match &cache_key {
                Some(key) => store_if_cacheable(state, key, service, forwarded).await?,
                None => forwarded,
            }
        }
    };

    if tracking_is_new {
        set_tracking_cookie(response.headers_mut(), &tracking_id);
    }
    cors::apply(cors_config, origin, response.headers_mut());
    Ok(response)
}

fn cache_key_for(service: &ServiceDescriptor, path: &str, query: Option<&str>) -> Option<cache::CacheKey> {
    if !service.cache.enabled {
        return None;
    }
    if !service.cache.path_patterns.is_empty()
        && !service
            .cache
            .path_patterns
            .iter()
            .any(|p| regex::Regex::new(p).map(|re| re.is_match(path)).unwrap_or(false))
    {
        return None;
    }
    let path_and_query = match query {
        Some(q) => format!("{path}?{q}"),
        None => path.to_string(),
    };
    Some(cache::CacheKey { service_id: service.id.clone(), path_and_query })
}

fn cached_response(hit: cache::CachedResponse) -> Response<Body> {
    let mut builder = Response::builder().status(hit.status);
    for (name, value) in &hit.headers {
        builder = builder.header(name, value);
    }
    builder.body(Body::from(hit.body)).unwrap_or_else(|_| Response::new(Body::empty()))
}

/// Buffers and caches a `200` response body when its `Content-Length` is
/// known and within the cap, returning a response rebuilt from the buffered
/// bytes; anything else (non-200, unknown/oversized length) passes through
/// untouched, never partially consuming the stream.
async fn store_if_cacheable(
    state: &PipelineState,
    key: &cache::CacheKey,
    service: &ServiceDescriptor,
    response: Response<Body>,
) -> Result<Response<Body>, PipelineError> {
    if response.status() != StatusCode::OK {
        return Ok(response);
    }
    let length = content_length(response.headers());
    if length == 0 || length as usize > cache::MAX_CACHED_BODY_BYTES {
        return Ok(response);
    }

    let headers_vec: Vec<(String, String)> = response
        .headers()
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string())))
        .collect();
    let status = response.status().as_u16();
    let (parts, body) = response.into_parts();
    let bytes = body.collect().await.map_err(|_| PipelineError::Internal)?.to_bytes();

    state.response_cache.put(key.clone(), status, headers_vec, bytes.clone(), service.cache.ttl);
    Ok(Response::from_parts(parts, Body::from(bytes)))
}

#[allow(clippy::too_many_arguments)]
async fn forward_with_retry(
    state: &PipelineState,
    service: &ServiceDescriptor,
    method: &Method,
    uri: &Uri,
    original_headers: &HeaderMap,
    body: Body,
    client_ip: &str,
    request_scheme: &str,
    original_host: &str,
    session_id: &str,
    api_key: Option<&crate::config::apikey::ApiKey>,
    user: Option<&PrivateAppsUser>,
) -> Result<Response<Body>, PipelineError> {
    let global = GlobalDeadline::start(&service.client_config);
    let max_attempts = 1 + service.client_config.retries;

    let buffered = if service.client_config.retries > 0 {
        match Limited::new(body, MAX_RETRY_BODY_BYTES).collect().await {
            Ok(collected) => Some(collected.to_bytes()),
            Err(_) => {
                warn!(service = %service.id, "request body exceeds retry buffer cap; retries disabled for this call");
                None
            }
        }
    } else {
        None
    };
    let mut streamed_body = if buffered.is_none() { Some(body) } else { None };
    let effective_attempts = if buffered.is_some() { max_attempts } else { 1 };

    let mut already_tried: Vec<String> = Vec::new();
    let mut last_err = PipelineError::UpstreamConnect;

    for attempt in 0..effective_attempts {
        if global.expired() {
            return Err(last_err);
        }

        let target = state.targets.select(
            &service.id,
            &service.targets,
            &service.load_balancing,
            &state.ctx.location,
            session_id,
            client_ip,
            &state.ctx,
            &already_tried,
            &service.circuit_breaker,
        )?;
        already_tried.push(target.id.clone());

        let attempt_body = match &buffered {
            Some(bytes) => Body::from(bytes.clone()),
            None => streamed_body.take().expect("exactly one streamed attempt"),
        };

        let mut req = Request::new(attempt_body);
        *req.method_mut() = method.clone();
        *req.uri_mut() = uri.clone();
        *req.headers_mut() = original_headers.clone();

        let now_secs = state.ctx.clock.now_millis() / 1000;
        let outbound = seccom::issue_outbound(service, api_key, user, &state.issuer, &state.audience, now_secs)?;
        for (name, value) in &outbound.headers {
            if let (Ok(n), Ok(v)) = (name.parse::<HeaderName>(), HeaderValue::from_str(value)) {
                req.headers_mut().insert(n, v);
            }
        }

        let metrics_transformer = transformer::MetricsTransformer { service_id: service.id.clone() };
        let req = metrics_transformer.on_request(req, &state.ctx);

        let call_start = Instant::now();
        let result = state
            .proxy
            .forward(service, target, req, client_ip, request_scheme, original_host, api_key, user, &global)
            .await
            .map(|response| metrics_transformer.on_response(response, &state.ctx))
            .map_err(|e| metrics_transformer.on_error(e, &state.ctx));

        match result {
            Ok(response) => {
                let state_resp = response
                    .headers()
                    .get(service.seccom.headers.state_response_name.as_str())
                    .and_then(|v| v.to_str().ok())
                    .map(|s| s.to_string());

                match seccom::validate_inbound(
                    &service.seccom,
                    &outbound.state,
                    state_resp.as_deref(),
                    &state.ctx.replay_cache,
                    now_secs,
                ) {
                    Ok(_) => {
                        let duration_ms = call_start.elapsed().as_millis() as u64;
                        let data_in = content_length(original_headers);
                        let data_out = content_length(response.headers());
                        state.ctx.metrics.record_call(&service.id, duration_ms, 0, data_in, data_out);
                        state.targets.record_response_time(&service.id, &target.id, duration_ms as f64);
                        state.targets.record_success(&service.id, &target.id, &service.circuit_breaker);
                        return Ok(response);
                    }
                    Err(e) => {
                        state.targets.record_failure(&service.id, &target.id, &service.circuit_breaker);
                        last_err = e;
                    }
                }
            }
            Err(e) => {
                state.targets.record_failure(&service.id, &target.id, &service.circuit_breaker);
                last_err = e;
            }
        }

        if !last_err.retryable() || attempt + 1 == effective_attempts {
            return Err(last_err);
        }
    }

    Err(last_err)
}

fn content_length(headers: &HeaderMap) -> u64 {
    headers
        .get(http::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}

/// Resolve the sticky-session identifier from the `otoroshi-tracking`
/// cookie, generating one if absent. Uses `ctx.rng` rather than `uuid`
/// directly so the value is reproducible under test (§9: rng exists for
/// "session-id issuance").
fn tracking_session_id(headers: &HeaderMap, rng: &dyn crate::context::Rng) -> (String, bool) {
    if let Some(id) = cookie_value(headers, privateapp::TRACKING_COOKIE_NAME) {
        return (id, false);
    }
    (format!("{:016x}{:016x}", rng.next_u64(), rng.next_u64()), true)
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let raw = headers.get(http::header::COOKIE)?.to_str().ok()?;
    raw.split(';').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        (k.trim() == name).then(|| v.trim().to_string())
    })
}

fn set_tracking_cookie(headers: &mut HeaderMap, session_id: &str) {
    let value = format!(
        "{}={}; Max-Age={}; Path=/; HttpOnly",
        privateapp::TRACKING_COOKIE_NAME,
        session_id,
        privateapp::TRACKING_COOKIE_MAX_AGE_SECS
    );
    if let Ok(v) = HeaderValue::from_str(&value) {
        headers.append(http::header::SET_COOKIE, v);
    }
}

fn private_app_user(service: &ServiceDescriptor, headers: &HeaderMap, state: &PipelineState) -> Option<PrivateAppsUser> {
    if !service.private_app {
        return None;
    }
    privateapp::user_from_cookie(headers, &service.id, &state.ctx.sessions, state.ctx.clock.now_millis())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_value_extracts_matching_entry_among_several() {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::COOKIE, HeaderValue::from_static("a=1; otoroshi-tracking=xyz; b=2"));
        assert_eq!(cookie_value(&headers, "otoroshi-tracking"), Some("xyz".to_string()));
    }

    #[test]
    fn cookie_value_absent_returns_none() {
        let headers = HeaderMap::new();
        assert_eq!(cookie_value(&headers, "otoroshi-tracking"), None);
    }

    #[test]
    fn tracking_session_id_reuses_existing_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::COOKIE, HeaderValue::from_static("otoroshi-tracking=existing"));
        let (id, is_new) = tracking_session_id(&headers, &crate::context::ThreadRng);
        assert_eq!(id, "existing");
        assert!(!is_new);
    }

    #[test]
    fn tracking_session_id_generates_when_absent() {
        let headers = HeaderMap::new();
        let (id, is_new) = tracking_session_id(&headers, &crate::context::ThreadRng);
        assert!(!id.is_empty());
        assert!(is_new);
    }
}
