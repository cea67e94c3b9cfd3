//! Prometheus text rendering of the live stats tree.
//!
//! Grounded on `_teacher_ref/metrics/prometheus.rs::PrometheusCollector`,
//! which owns a `prometheus::Registry` of counters/histograms updated
//! inline as requests complete. That push model doesn't fit here: the
//! per-service rate estimators in [`crate::stats`] are already the
//! source of truth, so this is a pull exporter instead — gauges are reset
//! and re-set from a [`StatsView`] snapshot each time the metrics endpoint
//! is scraped, then encoded with the same `prometheus::TextEncoder`.

use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};

use crate::stats::StatsView;

pub struct PrometheusExporter {
    registry: Registry,
    rate: GaugeVec,
    data_in_rate: GaugeVec,
    data_out_rate: GaugeVec,
    duration: GaugeVec,
    overhead: GaugeVec,
    concurrent: GaugeVec,
}

impl PrometheusExporter {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let rate = GaugeVec::new(
            Opts::new("gateway_calls_per_sec", "Calls per second over the trailing 60s window").namespace("otoroshi"),
            &["service"],
        )?;
        let data_in_rate = GaugeVec::new(
            Opts::new("gateway_data_in_rate", "Inbound bytes per second").namespace("otoroshi"),
            &["service"],
        )?;
        let data_out_rate = GaugeVec::new(
            Opts::new("gateway_data_out_rate", "Outbound bytes per second").namespace("otoroshi"),
            &["service"],
        )?;
        let duration = GaugeVec::new(
            Opts::new("gateway_duration_ms", "Average call duration in milliseconds").namespace("otoroshi"),
            &["service"],
        )?;
        let overhead = GaugeVec::new(
            Opts::new("gateway_overhead_ms", "Average gateway overhead in milliseconds").namespace("otoroshi"),
            &["service"],
        )?;
        let concurrent = GaugeVec::new(
            Opts::new("gateway_concurrent_requests", "Concurrently handled requests").namespace("otoroshi"),
            &["service"],
        )?;

        registry.register(Box::new(rate.clone()))?;
        registry.register(Box::new(data_in_rate.clone()))?;
        registry.register(Box::new(data_out_rate.clone()))?;
        registry.register(Box::new(duration.clone()))?;
        registry.register(Box::new(overhead.clone()))?;
        registry.register(Box::new(concurrent.clone()))?;

        Ok(Self { registry, rate, data_in_rate, data_out_rate, duration, overhead, concurrent })
    }

    fn set(&self, label: &str, view: &StatsView) {
        self.rate.with_label_values(&[label]).set(view.rate);
        self.data_in_rate.with_label_values(&[label]).set(view.data_in_rate);
        self.data_out_rate.with_label_values(&[label]).set(view.data_out_rate);
        self.duration.with_label_values(&[label]).set(view.duration);
        self.overhead.with_label_values(&[label]).set(view.overhead);
        self.concurrent.with_label_values(&[label]).set(view.concurrent_handled_requests as f64);
    }

    /// Render `global` under the `"global"` label and every `(service_id,
    /// view)` pair, reusing label values across scrapes (old labels simply
    /// stop being refreshed; `prometheus` has no "delete stale series" hook
    /// here, which is fine for the bounded, known service set this gateway
    /// runs with).
    pub fn render(&self, global: StatsView, services: &[(String, StatsView)]) -> Result<String, prometheus::Error> {
        self.set("global", &global);
        for (id, view) in services {
            self.set(id, view);
        }

        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).to_string())
    }
}

impl Default for PrometheusExporter {
    fn default() -> Self {
        Self::new().expect("static metric descriptors are always valid")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_includes_global_and_per_service_series() {
        let exporter = PrometheusExporter::new().unwrap();
        let global = StatsView { rate: 12.0, ..Default::default() };
        let services = vec![("svc-1".to_string(), StatsView { rate: 3.0, ..Default::default() })];

        let text = exporter.render(global, &services).unwrap();
        assert!(text.contains("otoroshi_gateway_calls_per_sec"));
        assert!(text.contains("service=\"global\""));
        assert!(text.contains("service=\"svc-1\""));
    }
}
