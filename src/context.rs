//! Explicit request-processing context.
//!
//! Design Notes §9 calls for replacing ambient global mutable state with a
//! single value threaded through the pipeline. `GatewayContext` is that
//! value: every collaborator a request handler needs (config, datastore,
//! clock, rng, metrics, session store, replay cache) hangs off it, and it is
//! cheap to clone (everything inside is an `Arc`).

use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use arc_swap::ArcSwap;

use crate::config::ConfigSnapshot;
use crate::datastore::Datastore;
use crate::privateapp::SessionStore;
use crate::seccom::ReplayCache;
use crate::stats::MetricsCollector;

/// Abstraction over wall-clock time so tests can freeze or fast-forward it.
pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_millis(&self) -> i64;
}

/// `SystemTime`-backed clock used in production.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64
    }
}

/// Abstraction over randomness so Random-balancing and session-id issuance
/// are reproducible under test.
pub trait Rng: Send + Sync {
    /// Draw a 64-bit random value.
    fn next_u64(&self) -> u64;
}

/// `rand`-backed RNG used in production. Safe to share: `rand::thread_rng`
/// is thread-local, so this simply re-derives a fresh generator per call.
#[derive(Debug, Default)]
pub struct ThreadRng;

impl Rng for ThreadRng {
    fn next_u64(&self) -> u64 {
        use rand::Rng as _;
        rand::thread_rng().gen()
    }
}

/// The `(region, zone)` this instance reports for target predicate matching.
#[derive(Debug, Clone, Default)]
pub struct InstanceLocation {
    /// Region identifier, e.g. `"eu-west"`.
    pub region: Option<String>,
    /// Zone identifier, e.g. `"eu-west-1a"`.
    pub zone: Option<String>,
}

/// Everything a pipeline stage needs, bundled and cheaply cloneable.
#[derive(Clone)]
pub struct GatewayContext {
    /// Read-mostly configuration snapshot, atomically swapped by the
    /// datastore when entities change.
    pub config: Arc<ArcSwap<ConfigSnapshot>>,
    /// External configuration collaborator (out of scope to implement; the
    /// crate only consumes its change-notification interface).
    pub datastore: Arc<dyn Datastore>,
    pub clock: Arc<dyn Clock>,
    pub rng: Arc<dyn Rng>,
    pub metrics: Arc<dyn MetricsCollector>,
    pub sessions: Arc<SessionStore>,
    pub replay_cache: Arc<ReplayCache>,
    pub location: InstanceLocation,
}

impl fmt::Debug for GatewayContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayContext")
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

impl GatewayContext {
    /// Current configuration snapshot.
    pub fn config(&self) -> Arc<ConfigSnapshot> {
        self.config.load_full()
    }
}
