//! Reserved `/.well-known/otoroshi/*` paths (§6): the metrics export
//! endpoint and the private-app login cookie setter. Neither goes through
//! [`crate::pipeline`] — they're gateway-level surfaces, not forwarded to
//! any service's targets.

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Json, Redirect};
use http::{HeaderValue, StatusCode};
use serde::Deserialize;

use crate::metrics::{self, MetricsFormat, MetricsJson};
use crate::pipeline::PipelineState;
use crate::privateapp;
use crate::router;

#[derive(Debug, Deserialize)]
pub struct MetricsQuery {
    format: Option<String>,
    access_key: Option<String>,
}

/// `GET /.well-known/otoroshi/metrics` — content negotiated per §6, gated by
/// `GlobalConfig.metrics_access_key` when set.
pub async fn metrics(
    State(state): State<PipelineState>,
    Query(query): Query<MetricsQuery>,
    headers: http::HeaderMap,
) -> axum::response::Response {
    let snapshot = state.ctx.config();

    if let Some(expected) = &snapshot.global.metrics_access_key {
        if query.access_key.as_deref() != Some(expected.as_str()) {
            return (StatusCode::FORBIDDEN, "invalid or missing access key").into_response();
        }
    }

    let global = state.ctx.metrics.global_snapshot();
    let services: Vec<(String, crate::stats::StatsView)> = snapshot
        .services
        .iter()
        .map(|s| (s.id.clone(), state.ctx.metrics.service_snapshot(&s.id)))
        .collect();

    let accept = headers.get(http::header::ACCEPT).and_then(|v| v.to_str().ok());
    match metrics::negotiate(query.format.as_deref(), accept) {
        MetricsFormat::Prometheus => match state.prometheus.render(global, &services) {
            Ok(text) => (
                StatusCode::OK,
                [(http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
                text,
            )
                .into_response(),
            Err(_) => (StatusCode::INTERNAL_SERVER_ERROR, "metrics export failed").into_response(),
        },
        MetricsFormat::OldJson => Json(metrics::old_json(global, &services)).into_response(),
        MetricsFormat::Json => Json(MetricsJson { global, services }).into_response(),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginQuery {
    session_id: String,
    redirect_to: String,
    host: String,
    cp: Option<String>,
    ma: Option<i64>,
}

/// `GET /.well-known/otoroshi/login` — sets the per-service private-app
/// session cookie and redirects back into the service (§6). The session
/// itself must already exist in [`crate::privateapp::SessionStore`]: this
/// endpoint only attaches the cookie that names it, matching the division
/// of labor in Design Notes §9 (`authModule.callback` produces the
/// identity; this path is the generic cookie-setting tail every module shares).
///
/// `host` (§6) names the virtual host, not a service id directly: it's
/// resolved via [`router::resolve_by_host`] to the service whose cookie
/// [`crate::pipeline::private_app_user`] will later look up by
/// `privateapp::session_cookie_name(&service.id)`. A custom `cp` prefix is
/// honored for the cookie name itself but doesn't change that lookup, so
/// callers overriding it are opting out of the pipeline's default
/// private-app gate.
pub async fn login(State(state): State<PipelineState>, Query(query): Query<LoginQuery>) -> axum::response::Response {
    let snapshot = state.ctx.config();
    let Ok(service) = router::resolve_by_host(&snapshot.services, &query.host) else {
        return (StatusCode::NOT_FOUND, "unknown host").into_response();
    };

    let cookie_name = match &query.cp {
        Some(prefix) => format!("{prefix}-{}", service.id),
        None => privateapp::session_cookie_name(&service.id),
    };
    let max_age = query.ma.unwrap_or(privateapp::TRACKING_COOKIE_MAX_AGE_SECS);

    let mut response = Redirect::to(&query.redirect_to).into_response();
    let cookie = format!("{cookie_name}={}; Max-Age={}; Path=/; HttpOnly", query.session_id, max_age);
    if let Ok(value) = HeaderValue::from_str(&cookie) {
        response.headers_mut().append(http::header::SET_COOKIE, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_query_deserializes_camel_case_params() {
        let raw = "sessionId=abc&redirectTo=%2Fhome&host=api.oto.tools&cp=custom&ma=3600";
        let query: LoginQuery = serde_urlencoded::from_str(raw).unwrap();
        assert_eq!(query.session_id, "abc");
        assert_eq!(query.redirect_to, "/home");
        assert_eq!(query.host, "api.oto.tools");
        assert_eq!(query.cp.as_deref(), Some("custom"));
        assert_eq!(query.ma, Some(3600));
    }

    #[test]
    fn default_prefix_matches_private_app_session_cookie_name() {
        let raw = "sessionId=abc&redirectTo=%2Fhome&host=api.oto.tools";
        let query: LoginQuery = serde_urlencoded::from_str(raw).unwrap();
        let service_id = "svc1";
        let cookie_name = match &query.cp {
            Some(prefix) => format!("{prefix}-{service_id}"),
            None => privateapp::session_cookie_name(service_id),
        };
        assert_eq!(cookie_name, privateapp::session_cookie_name("svc1"));
    }
}
