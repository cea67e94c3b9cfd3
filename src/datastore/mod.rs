//! Datastore collaborator interface.
//!
//! The persistent configuration store is explicitly out of scope (§1); the
//! pipeline only depends on two things from it: (a) the ability to publish
//! configuration change notifications (handled by swapping the
//! [`crate::context::GatewayContext`]'s `config` snapshot — the datastore
//! need not be involved in the read path at all), and (b) compare-and-increment
//! quota primitives (§5: "Quota counters live in the datastore and are
//! mutated only via compare-and-increment primitives"). This module defines
//! that second interface and ships an in-memory reference implementation,
//! since the core itself does not implement storage (§1 Non-goals).

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use thiserror::Error;

/// Errors from the datastore collaborator.
#[derive(Debug, Error)]
pub enum DatastoreError {
    #[error("datastore unavailable: {0}")]
    Unavailable(String),
}

/// A monotonic, linearizable increment-and-read primitive keyed by an
/// opaque string. Two concurrent callers incrementing the same key must
/// never both observe the same resulting value (§5 quota linearizability).
#[async_trait::async_trait]
pub trait Datastore: Send + Sync {
    /// Increment the rolling counter for `key` and return the new value.
    /// `window` bounds how long a single bucket lives before it resets to
    /// zero on the next increment (a fixed-window counter, sufficient for
    /// the per-second throttle dimension).
    async fn incr_rolling(&self, key: &str, window: Duration) -> Result<u64, DatastoreError>;

    /// Increment a calendar-bounded counter for `key`. `boundary_key`
    /// identifies the current calendar bucket (e.g. `"2026-07-27"` for a
    /// daily counter, `"2026-07"` for monthly, computed by the caller in
    /// the instance's timezone) — a new `boundary_key` resets the counter.
    async fn incr_calendar(&self, key: &str, boundary_key: &str) -> Result<u64, DatastoreError>;
}

struct RollingEntry {
    count: u64,
    window_start: std::time::Instant,
}

struct CalendarEntry {
    count: u64,
    boundary_key: String,
}

/// Single-process, in-memory `Datastore`. Correct for one instance; a
/// clustered deployment would swap this for a client to a shared store
/// (Redis, etc.) behind the same trait — that collaborator is out of scope
/// here.
#[derive(Default)]
pub struct InMemoryDatastore {
    rolling: DashMap<String, RollingEntry>,
    calendar: DashMap<String, CalendarEntry>,
}

impl InMemoryDatastore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait::async_trait]
impl Datastore for InMemoryDatastore {
    async fn incr_rolling(&self, key: &str, window: Duration) -> Result<u64, DatastoreError> {
        let mut entry = self.rolling.entry(key.to_string()).or_insert_with(|| RollingEntry {
            count: 0,
            window_start: std::time::Instant::now(),
        });

        if entry.window_start.elapsed() >= window {
            entry.count = 0;
            entry.window_start = std::time::Instant::now();
        }
        entry.count += 1;
        Ok(entry.count)
    }

    async fn incr_calendar(&self, key: &str, boundary_key: &str) -> Result<u64, DatastoreError> {
        let mut entry = self.calendar.entry(key.to_string()).or_insert_with(|| CalendarEntry {
            count: 0,
            boundary_key: boundary_key.to_string(),
        });

        if entry.boundary_key != boundary_key {
            entry.count = 0;
            entry.boundary_key = boundary_key.to_string();
        }
        entry.count += 1;
        Ok(entry.count)
    }
}
