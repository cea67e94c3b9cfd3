//! CORS header application (SPEC_FULL.md §10), grounded on
//! `_teacher_ref/middleware/cors.rs::CorsMiddleware::add_cors_headers`, used
//! directly against a response's `HeaderMap` rather than as an axum
//! `middleware::Next` layer since the pipeline already owns the full
//! request/response pair at the point CORS needs to apply.

use http::{HeaderMap, HeaderValue, Method, StatusCode};

use crate::config::cors::CorsConfig;

/// Effective CORS policy for a service: its own override if set, else the
/// site-wide default.
pub fn effective<'a>(global: &'a CorsConfig, service_override: Option<&'a CorsConfig>) -> &'a CorsConfig {
    service_override.unwrap_or(global)
}

/// A bare `204` with CORS headers for a preflight `OPTIONS` request.
pub fn preflight_response(cors: &CorsConfig, origin: Option<&str>) -> (StatusCode, HeaderMap) {
    let mut headers = HeaderMap::new();
    apply(cors, origin, &mut headers);
    (StatusCode::NO_CONTENT, headers)
}

pub fn is_preflight(method: &Method, headers: &HeaderMap) -> bool {
    method == Method::OPTIONS && headers.contains_key(http::header::ACCESS_CONTROL_REQUEST_METHOD)
}

/// Adds the `Access-Control-*` response headers for `origin`, if allowed.
pub fn apply(cors: &CorsConfig, origin: Option<&str>, headers: &mut HeaderMap) {
    if let Some(origin) = origin {
        if cors.is_origin_allowed(origin) {
            let value = if cors.allowed_origins.iter().any(|o| o == "*") && !cors.allow_credentials {
                HeaderValue::from_static("*")
            } else {
                match HeaderValue::from_str(origin) {
                    Ok(v) => v,
                    Err(_) => return,
                }
            };
            headers.insert(http::header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
        } else {
            return;
        }
    }

    if let Ok(v) = HeaderValue::from_str(&cors.allowed_methods.join(", ")) {
        headers.insert(http::header::ACCESS_CONTROL_ALLOW_METHODS, v);
    }
    if !cors.allowed_headers.is_empty() {
        if let Ok(v) = HeaderValue::from_str(&cors.allowed_headers.join(", ")) {
            headers.insert(http::header::ACCESS_CONTROL_ALLOW_HEADERS, v);
        }
    }
    if !cors.exposed_headers.is_empty() {
        if let Ok(v) = HeaderValue::from_str(&cors.exposed_headers.join(", ")) {
            headers.insert(http::header::ACCESS_CONTROL_EXPOSE_HEADERS, v);
        }
    }
    if cors.allow_credentials {
        headers.insert(http::header::ACCESS_CONTROL_ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
    }
    if let Ok(v) = HeaderValue::from_str(&cors.max_age.to_string()) {
        headers.insert(http::header::ACCESS_CONTROL_MAX_AGE, v);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allowed_origin_sets_wildcard_header_when_credentials_disabled() {
        let cors = CorsConfig::default();
        let mut headers = HeaderMap::new();
        apply(&cors, Some("https://example.com"), &mut headers);
        assert_eq!(headers.get(http::header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(), "*");
    }

    #[test]
    fn disallowed_origin_gets_no_cors_headers() {
        let cors = CorsConfig { allowed_origins: vec!["https://only-this.example".to_string()], ..CorsConfig::default() };
        let mut headers = HeaderMap::new();
        apply(&cors, Some("https://evil.example"), &mut headers);
        assert!(headers.get(http::header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
    }

    #[test]
    fn preflight_is_detected_only_with_request_method_header() {
        let mut headers = HeaderMap::new();
        assert!(!is_preflight(&Method::OPTIONS, &headers));
        headers.insert(http::header::ACCESS_CONTROL_REQUEST_METHOD, HeaderValue::from_static("POST"));
        assert!(is_preflight(&Method::OPTIONS, &headers));
    }

    #[test]
    fn service_override_wins_over_global_default() {
        let global = CorsConfig::default();
        let service = CorsConfig { allow_credentials: true, ..CorsConfig::default() };
        assert!(effective(&global, Some(&service)).allow_credentials);
        assert!(!effective(&global, None).allow_credentials);
    }
}
