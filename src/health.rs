//! `GET /health` endpoint handler.
//!
//! Returns a [`HealthResponse`] JSON payload containing the server
//! version, uptime, config source metadata, loaded service count,
//! tracking ledger sizes, and cumulative request statistics.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::server::AppState;

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub build: BuildInfo,
    pub uptime_seconds: u64,
    pub config: ConfigHealth,
    pub tracking: TrackingHealth,
    pub stats: StatsResponse,
}

#[derive(Serialize, Deserialize)]
pub struct BuildInfo {
    pub git_commit: String,
    pub profile: String,
    pub built_at: String,
}

#[derive(Serialize, Deserialize)]
pub struct ConfigHealth {
    pub source: String,
    pub version: String,
    pub loaded_ago_seconds: u64,
    pub services: usize,
}

#[derive(Serialize, Deserialize)]
pub struct TrackingHealth {
    pub enabled: bool,
    pub uploads: usize,
    pub downloads: usize,
}

#[derive(Serialize, Deserialize)]
pub struct StatsResponse {
    pub requests_forwarded: u64,
    pub requests_failed: u64,
}

pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let (source, version, loaded_at) = state.config.loaded_info().await;
    // Count from the compiled route table, not the raw config: a service
    // whose pattern failed to compile is not actually routable.
    let services = state.routes.table().await.len();
    let (uploads, downloads) = state.tracking.entry_counts();

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        build: BuildInfo {
            git_commit: env!("WAYBILL_GIT_SHORT").to_string(),
            profile: env!("WAYBILL_BUILD_PROFILE").to_string(),
            built_at: env!("WAYBILL_BUILD_TIME").to_string(),
        },
        uptime_seconds: state.start_time.elapsed().as_secs(),
        config: ConfigHealth {
            source,
            version: version.short().to_string(),
            loaded_ago_seconds: loaded_at.elapsed().as_secs(),
            services,
        },
        tracking: TrackingHealth {
            enabled: state.tracking.enabled(),
            uploads,
            downloads,
        },
        stats: StatsResponse {
            requests_forwarded: state.stats.forwarded.load(Ordering::Relaxed),
            requests_failed: state.stats.failed.load(Ordering::Relaxed),
        },
    })
}
