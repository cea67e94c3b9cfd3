//! `additionalHeaders` expression language (§4.5, Design Notes §9).
//!
//! Supports `${apikey.name}`, `${apikey.metadata.<k>}`, `${user.email}`,
//! `${req.header.<h>}`, `${req.query.<q>}`. Unresolved references expand to
//! the empty string, per spec. Grounded on the small hand-rolled
//! interpreter shape of `_teacher_ref/middleware/auth.rs`'s header
//! extraction helpers, generalized into a symbol-table lookup.

use http::HeaderMap;

use crate::config::apikey::ApiKey;
use crate::privateapp::PrivateAppsUser;

/// Expand every `${...}` reference in `template` against the fixed symbol
/// table available at proxy time.
pub fn expand(
    template: &str,
    api_key: Option<&ApiKey>,
    user: Option<&PrivateAppsUser>,
    request_headers: &HeaderMap,
    query: &str,
) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            rest = "";
            break;
        };
        let symbol = &after[..end];
        out.push_str(&resolve(symbol, api_key, user, request_headers, query));
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    out
}

fn resolve(
    symbol: &str,
    api_key: Option<&ApiKey>,
    user: Option<&PrivateAppsUser>,
    request_headers: &HeaderMap,
    query: &str,
) -> String {
    if symbol == "apikey.name" {
        return api_key.map(|k| k.client_name.clone()).unwrap_or_default();
    }
    if let Some(field) = symbol.strip_prefix("apikey.metadata.") {
        return api_key
            .and_then(|k| k.metadata.get(field))
            .cloned()
            .unwrap_or_default();
    }
    if symbol == "user.email" {
        return user.map(|u| u.email.clone()).unwrap_or_default();
    }
    if let Some(header) = symbol.strip_prefix("req.header.") {
        return request_headers
            .get(header)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
    }
    if let Some(param) = symbol.strip_prefix("req.query.") {
        return url::form_urlencoded::parse(query.as_bytes())
            .find(|(k, _)| k == param)
            .map(|(_, v)| v.to_string())
            .unwrap_or_default();
    }
    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};

    fn key() -> ApiKey {
        ApiKey {
            client_id: "c1".into(),
            client_secret: "s".into(),
            client_name: "My Key".into(),
            authorized_group: "g".into(),
            enabled: true,
            tags: HashSet::new(),
            metadata: HashMap::from([("tier".to_string(), "gold".to_string())]),
            quotas: Default::default(),
        }
    }

    #[test]
    fn expands_apikey_name_and_metadata() {
        let out = expand("name=${apikey.name};tier=${apikey.metadata.tier}", Some(&key()), None, &HeaderMap::new(), "");
        assert_eq!(out, "name=My Key;tier=gold");
    }

    #[test]
    fn unresolved_symbol_expands_to_empty_string() {
        let out = expand("x=${apikey.metadata.missing}", Some(&key()), None, &HeaderMap::new(), "");
        assert_eq!(out, "x=");
    }

    #[test]
    fn expands_request_query_param() {
        let out = expand("q=${req.query.foo}", None, None, &HeaderMap::new(), "foo=bar&baz=1");
        assert_eq!(out, "q=bar");
    }

    #[test]
    fn plain_text_without_references_passes_through() {
        assert_eq!(expand("static-value", None, None, &HeaderMap::new(), ""), "static-value");
    }
}
