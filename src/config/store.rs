//! Snapshot holder and periodic reload for the routing configuration.
//!
//! [`ConfigStore`] keeps the live config as an `Arc<ProxyConfig>`
//! behind a short-held `RwLock`: readers clone the Arc and release the
//! lock immediately, so request handling never waits on a reload and a
//! reload never waits on requests. Swaps are wholesale — no reader
//! ever observes a half-updated service list. Change notifications go
//! out on a `watch` channel carrying a generation counter.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{watch, RwLock};

use super::model::ProxyConfig;
use super::{ConfigSource, ConfigVersion};
use crate::error::WaybillError;

/// Env var overriding `retry.count`.
pub const ENV_RETRY_COUNT: &str = "WAYBILL_RETRY_COUNT";
/// Env var overriding `retry.interval` (milliseconds).
pub const ENV_RETRY_INTERVAL: &str = "WAYBILL_RETRY_INTERVAL_MS";
/// Env var overriding `retry.max-backoff` (milliseconds).
pub const ENV_RETRY_MAX_BACKOFF: &str = "WAYBILL_RETRY_MAX_BACKOFF_MS";

#[derive(Debug)]
pub struct LoadedConfig {
    pub config: Arc<ProxyConfig>,
    pub version: ConfigVersion,
    pub source_name: String,
    pub loaded_at: Instant,
}

pub struct ConfigStore {
    inner: RwLock<LoadedConfig>,
    source: Box<dyn ConfigSource>,
    changes: watch::Sender<u64>,
}

impl ConfigStore {
    /// Perform the required first load. Unlike later reloads this is
    /// fail-closed: a sidecar with no usable routing config cannot start.
    pub async fn bootstrap(source: Box<dyn ConfigSource>) -> Result<Self, WaybillError> {
        let (mut config, version) = source.load().await?;
        apply_env_overrides(&mut config);

        tracing::info!(
            source = source.name(),
            version = ConfigVersion::short(&version),
            services = config.services.len(),
            read_timeout = ?config.read_timeout(),
            retry_count = config.retry.count,
            "routing config loaded"
        );

        let (changes, _) = watch::channel(0);
        Ok(Self {
            inner: RwLock::new(LoadedConfig {
                config: Arc::new(config),
                version,
                source_name: source.name().to_string(),
                loaded_at: Instant::now(),
            }),
            source,
            changes,
        })
    }

    /// The live immutable snapshot. Cheap refcount bump; never blocks a
    /// reload in progress for longer than the Arc clone.
    pub async fn current(&self) -> Arc<ProxyConfig> {
        Arc::clone(&self.inner.read().await.config)
    }

    pub async fn version(&self) -> ConfigVersion {
        self.inner.read().await.version.clone()
    }

    pub async fn loaded_info(&self) -> (String, ConfigVersion, Instant) {
        let inner = self.inner.read().await;
        (
            inner.source_name.clone(),
            inner.version.clone(),
            inner.loaded_at,
        )
    }

    /// Subscribe to change notifications. The payload is a generation
    /// counter; subscribers only care that it moved.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    /// Reload from the source. Returns `Ok(true)` when a new snapshot
    /// was installed, `Ok(false)` when the content hash is unchanged.
    /// Read or parse failures keep the previous good snapshot.
    pub async fn reload(&self) -> Result<bool, WaybillError> {
        let current_version = self.version().await;

        if !self.source.has_changed(&current_version).await? {
            tracing::debug!("config unchanged, skip");
            return Ok(false);
        }

        let (mut config, version) = self.source.load().await?;
        apply_env_overrides(&mut config);
        let services = config.services.len();

        {
            let mut inner = self.inner.write().await;
            inner.config = Arc::new(config);
            inner.version = version;
            inner.loaded_at = Instant::now();
        }

        self.changes.send_modify(|gen| *gen += 1);
        tracing::info!(services, "routing config reloaded");
        Ok(true)
    }
}

/// Periodic reload driver. Runs until the shutdown watch flips; reload
/// failures are logged and the previous snapshot stays live (fail-open).
pub async fn refresh_loop(
    store: Arc<ConfigStore>,
    interval_secs: u64,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
    interval.tick().await; // Skip first immediate tick

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.changed() => {
                tracing::debug!("config refresh loop shutting down");
                return;
            }
        }

        if let Err(e) = store.reload().await {
            tracing::error!(error = %e, "config reload failed, keeping current config");
        }
    }
}

/// Apply `WAYBILL_RETRY_*` env overrides when set and non-blank.
fn apply_env_overrides(config: &mut ProxyConfig) {
    if let Some(count) = env_u64(ENV_RETRY_COUNT) {
        config.retry.count = u32::try_from(count).unwrap_or(u32::MAX);
    }
    if let Some(interval) = env_u64(ENV_RETRY_INTERVAL) {
        config.retry.interval = interval;
    }
    if let Some(max_backoff) = env_u64(ENV_RETRY_MAX_BACKOFF) {
        config.retry.max_backoff = max_backoff;
    }
}

fn env_u64(key: &str) -> Option<u64> {
    let raw = std::env::var(key).ok()?;
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(var = key, value = raw, "ignoring unparseable retry override");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::source::EmbeddedSource;

    #[tokio::test]
    async fn bootstrap_and_read_snapshot() {
        let store = ConfigStore::bootstrap(Box::new(EmbeddedSource)).await.unwrap();
        let snapshot = store.current().await;
        assert!(!snapshot.services.is_empty());
    }

    #[tokio::test]
    async fn unchanged_source_reload_is_noop() {
        let store = ConfigStore::bootstrap(Box::new(EmbeddedSource)).await.unwrap();
        let mut rx = store.subscribe();

        assert!(!store.reload().await.unwrap());
        // No notification fired for the no-op reload.
        assert!(!rx.has_changed().unwrap());
    }
}
