//! Axum server setup, shared application state, and graceful shutdown.
//!
//! Contains [`AppState`] (the `Arc`-shared state tying together the
//! config store, route table, forwarder, tracking ledger and archive),
//! [`build_router`] for constructing the Axum router with middleware
//! layers, and [`shutdown_signal`] for SIGTERM / Ctrl+C handling.

use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Instant;

use axum::routing::{get, put};
use axum::Router;
use tokio::sync::mpsc;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::archive::ArchiveIndex;
use crate::config::ConfigStore;
use crate::health::health_handler;
use crate::proxy;
use crate::proxy::forwarder::Forwarder;
use crate::proxy::router::Router as ProxyRouter;
use crate::tracking::api;
use crate::tracking::store::SealedEvent;
use crate::tracking::TrackingStore;

#[derive(Debug)]
pub struct Stats {
    pub forwarded: AtomicU64,
    pub failed: AtomicU64,
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

impl Stats {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            forwarded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }
}

pub struct AppState {
    pub config: Arc<ConfigStore>,
    pub routes: Arc<ProxyRouter>,
    pub forwarder: Arc<Forwarder>,
    pub tracking: Arc<TrackingStore>,
    pub archive: Arc<dyn ArchiveIndex>,
    pub sealed_events: mpsc::Sender<SealedEvent>,
    pub stats: Stats,
    pub start_time: Instant,
}

pub fn build_router(state: Arc<AppState>, max_body: usize) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route(
            "/api/folo/track/{id}/record",
            get(api::export_report).delete(api::clear_report),
        )
        .route("/api/folo/track/{id}/record/import", put(api::import_report))
        .route(
            "/api/folo/track/{id}/{package_type}/{store_type}/{name}/{*path}",
            get(api::tracked_get).put(api::tracked_put),
        )
        .fallback(proxy::forward_handler)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(RequestBodyLimitLayer::new(max_body)),
        )
        .with_state(state)
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received Ctrl+C"),
        () = terminate => tracing::info!("received SIGTERM"),
    }
}
