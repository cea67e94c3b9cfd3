//! `/.well-known/otoroshi/metrics` content negotiation (§6) over the
//! [`crate::stats`] snapshot tree.

pub mod prometheus;

use serde::Serialize;
use serde_json::{json, Value};

use crate::stats::StatsView;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricsFormat {
    Json,
    OldJson,
    Prometheus,
}

/// `?format=` wins over `Accept`; unrecognized values of either fall back
/// to `Json`.
pub fn negotiate(query_format: Option<&str>, accept: Option<&str>) -> MetricsFormat {
    if let Some(f) = query_format {
        return match f {
            "prometheus" => MetricsFormat::Prometheus,
            "old_json" => MetricsFormat::OldJson,
            _ => MetricsFormat::Json,
        };
    }
    match accept {
        Some(a) if a.contains("application/prometheus") => MetricsFormat::Prometheus,
        _ => MetricsFormat::Json,
    }
}

/// Current-style JSON body: the derived `StatsView` field names, global
/// plus a map keyed by service id.
#[derive(Serialize)]
pub struct MetricsJson {
    pub global: StatsView,
    pub services: Vec<(String, StatsView)>,
}

/// Legacy otoroshi wire naming (camelCase, no nesting under `global`/
/// `services` — the global view's fields sit at the top level next to a
/// `services` map), kept for `format=old_json` callers that parse the
/// pre-existing field names.
pub fn old_json(global: StatsView, services: &[(String, StatsView)]) -> Value {
    let service_map: serde_json::Map<String, Value> = services
        .iter()
        .map(|(id, v)| (id.clone(), view_to_legacy(v)))
        .collect();

    let mut body = view_to_legacy(&global);
    body.as_object_mut().unwrap().insert("services".to_string(), Value::Object(service_map));
    body
}

fn view_to_legacy(v: &StatsView) -> Value {
    json!({
        "rate": v.rate,
        "dataInRate": v.data_in_rate,
        "dataOutRate": v.data_out_rate,
        "duration": v.duration,
        "overhead": v.overhead,
        "concurrentHandledRequests": v.concurrent_handled_requests,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_format_takes_precedence_over_accept_header() {
        let fmt = negotiate(Some("prometheus"), Some("application/json"));
        assert_eq!(fmt, MetricsFormat::Prometheus);
    }

    #[test]
    fn accept_header_selects_prometheus_when_no_query_format() {
        let fmt = negotiate(None, Some("application/prometheus"));
        assert_eq!(fmt, MetricsFormat::Prometheus);
    }

    #[test]
    fn unrecognized_format_falls_back_to_json() {
        assert_eq!(negotiate(Some("yaml"), None), MetricsFormat::Json);
        assert_eq!(negotiate(None, None), MetricsFormat::Json);
    }

    #[test]
    fn old_json_uses_legacy_camel_case_field_names() {
        let global = StatsView { rate: 5.0, ..Default::default() };
        let services = vec![("svc".to_string(), StatsView::default())];
        let body = old_json(global, &services);
        assert_eq!(body["rate"], 5.0);
        assert!(body["services"]["svc"].is_object());
    }
}
