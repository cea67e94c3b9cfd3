//! Upstream request-line and header rewriting (§4.5).

use http::{HeaderMap, HeaderName, HeaderValue, Uri};

use crate::config::apikey::ApiKey;
use crate::config::service::ServiceDescriptor;
use crate::config::target::Target;
use crate::privateapp::PrivateAppsUser;

use super::template;

/// Rewrite the original request's path+query against the matched target,
/// stripping the service's `root` prefix (the target carries no root of its
/// own in this data model, so nothing is prepended in its place). The
/// authority is the *connect* address — `target.ip_address` when set — so
/// the TCP layer dials straight past DNS; the logical `Host`/SNI name is
/// restored separately in [`build_upstream_headers`].
pub fn build_upstream_uri(service: &ServiceDescriptor, target: &Target, original: &Uri) -> Result<Uri, String> {
    let original_path = original.path();
    let rest = original_path.strip_prefix(service.root.as_str()).unwrap_or(original_path);
    let rest = if rest.starts_with('/') { rest.to_string() } else { format!("/{rest}") };

    let path_and_query = match original.query() {
        Some(q) => format!("{rest}?{q}"),
        None => rest,
    };

    format!(
        "{}://{}:{}{}",
        target.scheme.as_str(),
        target.connect_host(),
        target.port,
        path_and_query
    )
    .parse()
    .map_err(|e: http::uri::InvalidUri| e.to_string())
}

/// Build the outbound header set: forwarded headers, `Host`, and the
/// service's expanded `additionalHeaders` template strings.
pub fn build_upstream_headers(
    service: &ServiceDescriptor,
    target: &Target,
    original_headers: &HeaderMap,
    client_ip: &str,
    request_scheme: &str,
    original_host: &str,
    query: &str,
    api_key: Option<&ApiKey>,
    user: Option<&PrivateAppsUser>,
) -> HeaderMap {
    let mut headers = original_headers.clone();

    headers.insert("host", HeaderValue::from_str(&target.base_authority()).unwrap());

    append_forwarded(&mut headers, "x-forwarded-for", client_ip);
    if let Ok(v) = HeaderValue::from_str(request_scheme) {
        headers.insert("x-forwarded-proto", v);
    }
    if let Ok(v) = HeaderValue::from_str(original_host) {
        headers.insert("x-forwarded-host", v);
    }

    for (name, raw_template) in &service.additional_headers {
        let expanded = template::expand(raw_template, api_key, user, original_headers, query);
        if let (Ok(name), Ok(value)) = (HeaderName::try_from(name.as_str()), HeaderValue::from_str(&expanded)) {
            headers.insert(name, value);
        }
    }

    headers
}

fn append_forwarded(headers: &mut HeaderMap, name: &'static str, value: &str) {
    let combined = match headers.get(name).and_then(|v| v.to_str().ok()) {
        Some(existing) => format!("{existing}, {value}"),
        None => value.to_string(),
    };
    if let Ok(v) = HeaderValue::from_str(&combined) {
        headers.insert(name, v);
    }
}
