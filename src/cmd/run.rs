//! `waybill run` — start the sidecar proxy.
//!
//! Loads the routing configuration (file or built-in default), wires up
//! the route table, forwarder, tracking ledger and archive, then starts
//! the Axum HTTP server with graceful shutdown and a background config
//! refresh loop for hot-reloading.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use crate::archive::DirArchive;
use crate::cli::RunArgs;
use crate::config::source::{EmbeddedSource, FileSource};
use crate::config::store::refresh_loop;
use crate::config::{ConfigSource, ConfigStore};
use crate::error::WaybillError;
use crate::logging;
use crate::proxy::forwarder::Forwarder;
use crate::proxy::router::{rebuild_loop, Router};
use crate::server::{self, AppState, Stats};
use crate::tracking::store::sealed_event_loop;
use crate::tracking::TrackingStore;

pub async fn execute(args: RunArgs) -> Result<(), WaybillError> {
    let log_format = logging::resolve_format(args.pretty, args.json);
    logging::init(&args.log_level, log_format);

    // With multiple rustls crypto providers compiled in, rustls cannot
    // auto-detect which one to use. Install `ring` up front.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let source = resolve_config_source(args.config.as_deref()).await?;
    let store = Arc::new(ConfigStore::bootstrap(source).await?);

    let router = Arc::new(Router::new(&*store.current().await));
    tokio::spawn(rebuild_loop(Arc::clone(&router), Arc::clone(&store)));

    let forwarder = Arc::new(Forwarder::new(Arc::clone(&store), Arc::clone(&router)));
    let tracking = Arc::new(TrackingStore::from_env(&args.repo_dir).await);
    let archive = Arc::new(DirArchive::new(&args.repo_dir));

    let (sealed_tx, sealed_rx) = tokio::sync::mpsc::channel(256);
    tokio::spawn(sealed_event_loop(
        Arc::clone(&tracking),
        Arc::clone(&forwarder),
        sealed_rx,
    ));

    let state = Arc::new(AppState {
        config: Arc::clone(&store),
        routes: router,
        forwarder,
        tracking,
        archive,
        sealed_events: sealed_tx,
        stats: Stats::new(),
        start_time: Instant::now(),
    });

    // Shutdown signal: flipping the channel stops the refresh loop
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let refresh_handle = tokio::spawn(refresh_loop(
        Arc::clone(&store),
        args.reload_interval,
        shutdown_rx,
    ));

    let app = server::build_router(Arc::clone(&state), args.max_body);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!(
        addr = %addr,
        services = store.current().await.services.len(),
        tracking = state.tracking.enabled(),
        repo_dir = %args.repo_dir.display(),
        "waybill started"
    );

    let graceful_shutdown = async move {
        server::shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(graceful_shutdown)
        .await?;

    // Wait for the config refresh task to finish (catches panics)
    if let Err(e) = refresh_handle.await {
        tracing::error!(error = %e, "config refresh task failed");
    }

    tracing::info!("waybill stopped");
    Ok(())
}

async fn resolve_config_source(
    explicit: Option<&std::path::Path>,
) -> Result<Box<dyn ConfigSource>, WaybillError> {
    if let Some(path) = explicit {
        return Ok(Box::new(FileSource::new(path.to_path_buf())));
    }

    // Auto-detect in current directory
    let candidates = ["waybill.yaml", "waybill.yml", "waybill.json"];
    for name in &candidates {
        let path = PathBuf::from(name);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            tracing::info!(path = %path.display(), "auto-detected config file");
            return Ok(Box::new(FileSource::new(path)));
        }
    }

    tracing::info!("no config file found, using built-in default routing");
    Ok(Box::new(EmbeddedSource))
}
