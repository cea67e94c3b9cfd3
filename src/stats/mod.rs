//! Live per-service and global statistics (§4.6, §3 `LiveStats`).
//!
//! The counter/window shape is grounded on
//! `_teacher_ref/metrics/mod.rs::{MetricsCollector, MetricsSnapshot}`,
//! generalized from a fixed global snapshot to a per-service sliding-window
//! rate estimator plus the cluster `StatsView` aggregation the spec calls for.

pub mod rate;

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;

use rate::RateEstimator;

/// Counters and rate estimators for one service (or the global aggregate).
/// Cheap to update from any thread; no lock is held across a full request.
pub struct LiveStats {
    calls: AtomicU64,
    data_in: AtomicU64,
    data_out: AtomicU64,
    duration_total_ms: AtomicU64,
    overhead_total_ms: AtomicU64,
    concurrent: AtomicI64,
    calls_window: Mutex<RateEstimator>,
    data_in_window: Mutex<RateEstimator>,
    data_out_window: Mutex<RateEstimator>,
}

impl Default for LiveStats {
    fn default() -> Self {
        Self {
            calls: AtomicU64::new(0),
            data_in: AtomicU64::new(0),
            data_out: AtomicU64::new(0),
            duration_total_ms: AtomicU64::new(0),
            overhead_total_ms: AtomicU64::new(0),
            concurrent: AtomicI64::new(0),
            calls_window: Mutex::new(RateEstimator::new()),
            data_in_window: Mutex::new(RateEstimator::new()),
            data_out_window: Mutex::new(RateEstimator::new()),
        }
    }
}

impl LiveStats {
    /// Record one completed call's contribution to the counters.
    pub fn record_call(&self, duration_ms: u64, overhead_ms: u64, data_in: u64, data_out: u64, now_secs: u64) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.data_in.fetch_add(data_in, Ordering::Relaxed);
        self.data_out.fetch_add(data_out, Ordering::Relaxed);
        self.duration_total_ms.fetch_add(duration_ms, Ordering::Relaxed);
        self.overhead_total_ms.fetch_add(overhead_ms, Ordering::Relaxed);
        self.calls_window.lock().record(now_secs, 1);
        self.data_in_window.lock().record(now_secs, data_in);
        self.data_out_window.lock().record(now_secs, data_out);
    }

    pub fn enter(&self) {
        self.concurrent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn leave(&self) {
        self.concurrent.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, now_secs: u64) -> StatsView {
        let calls = self.calls.load(Ordering::Relaxed);
        let duration_avg = if calls == 0 {
            0.0
        } else {
            self.duration_total_ms.load(Ordering::Relaxed) as f64 / calls as f64
        };
        let overhead_avg = if calls == 0 {
            0.0
        } else {
            self.overhead_total_ms.load(Ordering::Relaxed) as f64 / calls as f64
        };

        StatsView {
            rate: self.calls_window.lock().rate_per_sec(now_secs),
            data_in_rate: self.data_in_window.lock().rate_per_sec(now_secs),
            data_out_rate: self.data_out_window.lock().rate_per_sec(now_secs),
            duration: duration_avg,
            overhead: overhead_avg,
            concurrent_handled_requests: self.concurrent.load(Ordering::Relaxed).max(0) as u64,
        }
    }
}

/// One peer's (or the local instance's) published statistics view (§3, §4.6).
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StatsView {
    pub rate: f64,
    pub data_in_rate: f64,
    pub data_out_rate: f64,
    pub duration: f64,
    pub overhead: f64,
    pub concurrent_handled_requests: u64,
}

impl StatsView {
    /// Cluster aggregation (§4.6): rates and in-flight counts sum across
    /// peers; duration and overhead are averaged.
    pub fn aggregate(local: StatsView, peers: &[StatsView]) -> StatsView {
        let n = peers.len() + 1;
        let mut sum = local;
        for p in peers {
            sum.rate += p.rate;
            sum.data_in_rate += p.data_in_rate;
            sum.data_out_rate += p.data_out_rate;
            sum.concurrent_handled_requests += p.concurrent_handled_requests;
            sum.duration += p.duration;
            sum.overhead += p.overhead;
        }
        sum.duration /= n as f64;
        sum.overhead /= n as f64;
        sum
    }
}

/// Trait any metrics backend (Prometheus, no-op, in-memory) implements.
/// Adapted from `_teacher_ref/metrics/mod.rs::MetricsCollector`, with the
/// fixed route/status counters replaced by per-service `LiveStats`.
pub trait MetricsCollector: Send + Sync {
    fn record_call(&self, service_id: &str, duration_ms: u64, overhead_ms: u64, data_in: u64, data_out: u64);
    fn enter(&self, service_id: &str);
    fn leave(&self, service_id: &str);
    fn service_snapshot(&self, service_id: &str) -> StatsView;
    fn global_snapshot(&self) -> StatsView;
}

/// Default in-process collector: one [`LiveStats`] per service plus a
/// global aggregate updated on every call.
pub struct LiveStatsCollector {
    per_service: DashMap<String, Arc<LiveStats>>,
    global: Arc<LiveStats>,
    now_secs: Box<dyn Fn() -> u64 + Send + Sync>,
}

impl LiveStatsCollector {
    pub fn new(now_secs: impl Fn() -> u64 + Send + Sync + 'static) -> Self {
        Self {
            per_service: DashMap::new(),
            global: Arc::new(LiveStats::default()),
            now_secs: Box::new(now_secs),
        }
    }

    fn service(&self, service_id: &str) -> Arc<LiveStats> {
        self.per_service
            .entry(service_id.to_string())
            .or_insert_with(|| Arc::new(LiveStats::default()))
            .clone()
    }
}

impl MetricsCollector for LiveStatsCollector {
    fn record_call(&self, service_id: &str, duration_ms: u64, overhead_ms: u64, data_in: u64, data_out: u64) {
        let now = (self.now_secs)();
        self.service(service_id).record_call(duration_ms, overhead_ms, data_in, data_out, now);
        self.global.record_call(duration_ms, overhead_ms, data_in, data_out, now);
    }

    fn enter(&self, service_id: &str) {
        self.service(service_id).enter();
        self.global.enter();
    }

    fn leave(&self, service_id: &str) {
        self.service(service_id).leave();
        self.global.leave();
    }

    fn service_snapshot(&self, service_id: &str) -> StatsView {
        self.service(service_id).snapshot((self.now_secs)())
    }

    fn global_snapshot(&self) -> StatsView {
        self.global.snapshot((self.now_secs)())
    }
}
