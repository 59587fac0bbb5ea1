//! HTTP and realtime transport for the mesh orchestrator control plane.
//!
//! Everything domain-specific — the data model, IPAM, the synthesizer, the
//! validation engine, the incident detectors, the agent channel hub — lives
//! in `mesh-core` (§1: this crate has no knowledge of any of that beyond
//! calling it). What's here is purely the edge: axum routing, the
//! WebSocket upgrade, request auth, and mapping `CoreError` to HTTP status
//! codes.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod identity_provider;
#[cfg(test)]
mod test;
pub mod ws;

use axum::Router;
use config::ConfigFile;
use mesh_core::hub::Hub;
use mesh_core::identity::IdentityProvider;
use mesh_core::model::DetectorThresholds;
use mesh_core::store::{open_pool, Store};
use std::{net::SocketAddr, sync::Arc};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub hub: Arc<Hub>,
    pub identity_provider: Arc<dyn IdentityProvider>,
    pub detector_thresholds: DetectorThresholds,
    /// Handed to `World::load` by handlers that synthesize outside the hub
    /// (enrollment resolve); the hub keeps its own copy for channel pushes.
    pub upstream_resolvers: Vec<std::net::Ipv4Addr>,
}

pub fn router(state: AppState) -> Router {
    Router::new().merge(api::routes()).layer(TraceLayer::new_for_http()).with_state(state)
}

/// Builds the store, the hub, and the identity provider, then serves the
/// HTTP/WebSocket listener until `shutdown` is cancelled (§B "Graceful
/// shutdown").
pub async fn run(config: ConfigFile, shutdown: CancellationToken) -> anyhow::Result<()> {
    let pool = open_pool(&config.database_path)?;
    let store = Store::new(pool);
    let hub = Hub::new(store.clone(), config.upstream_resolvers.clone());

    let detector_thresholds = config
        .detector_thresholds
        .as_ref()
        .map(|t| DetectorThresholds {
            shared_config_window_secs: t.shared_config_window_secs,
            session_conflict_threshold_secs: t.session_conflict_threshold_secs,
            max_endpoint_changes_per_day: t.max_endpoint_changes_per_day,
        })
        .unwrap_or_default();

    let state = AppState {
        store,
        hub: hub.clone(),
        identity_provider: Arc::new(identity_provider::TrustedClaimsIdentityProvider),
        detector_thresholds,
        upstream_resolvers: config.upstream_resolvers.clone(),
    };

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "mesh-server {} listening", VERSION);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
            hub.shutdown();
        })
        .await?;

    Ok(())
}
