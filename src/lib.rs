//! Programmable HTTP/HTTPS reverse proxy and API gateway.
//!
//! Requests land in [`pipeline::handle`] after falling through the two
//! reserved `/.well-known/otoroshi/*` routes registered in [`Gateway::build_app`].
//! Everything a request needs — routing table, access gate, target
//! selection, secure-communication exchange, proxying, stats — is reached
//! through [`context::GatewayContext`] and [`pipeline::PipelineState`],
//! constructed once here and cloned per request.

pub mod access;
pub mod cache;
pub mod config;
pub mod context;
pub mod cors;
pub mod datastore;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod privateapp;
pub mod proxy;
pub mod router;
pub mod seccom;
pub mod stats;
pub mod targets;
pub mod transformer;
pub mod well_known;

use std::net::SocketAddr;
use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::routing::get;
use axum::Router as AxumRouter;
use tokio::net::TcpListener;
use tracing::info;

pub use config::ConfigSnapshot;
pub use error::GatewayError;

use cache::ResponseCache;
use context::{GatewayContext, InstanceLocation, SystemClock, ThreadRng};
use datastore::InMemoryDatastore;
use metrics::prometheus::PrometheusExporter;
use pipeline::PipelineState;
use privateapp::SessionStore;
use seccom::ReplayCache;
use stats::LiveStatsCollector;
use targets::TargetRegistry;

/// Everything [`Gateway::new`] needs beyond the configuration entities
/// themselves: the address to bind and the `iss`/`aud` stamped into
/// issued secure-communication tokens (§4.4), none of which live in
/// [`config::ConfigSnapshot`] since they're instance-level, not
/// datastore-published entities.
pub struct GatewaySettings {
    pub bind: SocketAddr,
    pub issuer: String,
    pub audience: String,
    pub location: InstanceLocation,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8080)),
            issuer: "otoroshi".to_string(),
            audience: "otoroshi".to_string(),
            location: InstanceLocation::default(),
        }
    }
}

/// The running gateway: wired-up pipeline state plus the axum app built
/// over it.
pub struct Gateway {
    state: PipelineState,
    app: AxumRouter,
    bind: SocketAddr,
}

impl Gateway {
    /// Construct a gateway from an initial configuration snapshot and
    /// instance settings. Mirrors `_teacher_ref/lib.rs::Gateway::new`'s
    /// validate-then-wire-collaborators shape, generalized from the
    /// teacher's fixed router/load-balancer/circuit-breaker trio to this
    /// gateway's context/targets/proxy/metrics set.
    pub fn new(config: ConfigSnapshot, settings: GatewaySettings) -> Result<Self, GatewayError> {
        config.validate().map_err(|e| GatewayError::Config(e.to_string()))?;

        let ctx = GatewayContext {
            config: Arc::new(ArcSwap::from_pointee(config)),
            datastore: InMemoryDatastore::new(),
            clock: Arc::new(SystemClock),
            rng: Arc::new(ThreadRng),
            metrics: Arc::new(LiveStatsCollector::new(|| {
                std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_secs()
            })),
            sessions: Arc::new(SessionStore::new()),
            replay_cache: Arc::new(ReplayCache::new()),
            location: settings.location,
        };

        let prometheus = Arc::new(PrometheusExporter::new().map_err(|e| GatewayError::Init(e.to_string()))?);

        let state = PipelineState {
            ctx,
            targets: Arc::new(TargetRegistry::new()),
            proxy: Arc::new(proxy::ProxyClient::new()),
            prometheus,
            response_cache: Arc::new(ResponseCache::new()),
            issuer: settings.issuer,
            audience: settings.audience,
        };

        let app = Self::build_app(state.clone());
        Ok(Self { state, app, bind: settings.bind })
    }

    /// Publish a new configuration snapshot, e.g. after the datastore
    /// collaborator notifies of an entity change (§2.1). Validates before
    /// swapping so a bad snapshot never reaches in-flight requests.
    pub fn reconfigure(&self, config: ConfigSnapshot) -> Result<(), GatewayError> {
        config.validate().map_err(|e| GatewayError::Config(e.to_string()))?;
        self.state.ctx.config.store(Arc::new(config));
        Ok(())
    }

    fn build_app(state: PipelineState) -> AxumRouter {
        AxumRouter::new()
            .route("/.well-known/otoroshi/metrics", get(well_known::metrics))
            .route("/.well-known/otoroshi/login", get(well_known::login))
            .fallback(pipeline::handle)
            .with_state(state)
    }

    /// Bind and serve. Consumes `self`: once listening, the gateway's
    /// lifetime is the accept loop's.
    pub async fn start(self) -> Result<(), GatewayError> {
        info!(addr = %self.bind, services = self.state.ctx.config().services.len(), "starting gateway");

        let listener = TcpListener::bind(self.bind).await.map_err(|e| GatewayError::Server(e.to_string()))?;

        axum::serve(listener, self.app.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .map_err(|e| GatewayError::Server(e.to_string()))?;

        Ok(())
    }

    /// Borrow the wired pipeline state, e.g. for tests that want to drive
    /// [`pipeline::handle`] directly without binding a socket.
    pub fn state(&self) -> &PipelineState {
        &self.state
    }
}
