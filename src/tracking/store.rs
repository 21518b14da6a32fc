//! In-memory tracking ledger.
//!
//! Entries land in lock-free sets sized for concurrent inserts from many
//! relay completions at once. The store also carries the historical
//! manifest of the previous run of the same build, so artifacts served
//! straight from the local archive can still be reported with their
//! known digests.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use axum::body::Bytes;
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use dashmap::DashSet;
use tokio::sync::mpsc;

use crate::error::ForwardError;
use crate::proxy::forwarder::{normalize_path, ForwardRequest, Forwarder};
use crate::tracking::model::{
    AccessChannel, HistoricalContent, HistoricalEntry, StoreEffect, TrackedContent,
    TrackedContentEntry, TrackingKey,
};

pub const ENV_BUILD_CONFIG_ID: &str = "BUILD_CONFIG_ID";

/// Downstream endpoint for recording a single sealed download.
pub const RECORD_ARTIFACT_PATH: &str = "/api/folo/admin/report/recordArtifact";

/// Downstream endpoint for importing the whole aggregate report.
pub const IMPORT_REPORT_PATH: &str = "/api/folo/admin/report/import";

pub struct TrackingStore {
    key: Option<TrackingKey>,
    uploads: DashSet<TrackedContentEntry>,
    downloads: DashSet<TrackedContentEntry>,
    historical: HashMap<String, HistoricalEntry>,
}

impl TrackingStore {
    /// Build the store from `BUILD_CONFIG_ID` and, when present, the
    /// historical manifest at `<repo_dir>/<build-id>`. Without a build id
    /// tracking stays disabled and no entries are ever created.
    pub async fn from_env(repo_dir: &Path) -> Self {
        let build_id = std::env::var(ENV_BUILD_CONFIG_ID)
            .ok()
            .filter(|v| !v.trim().is_empty());

        let Some(build_id) = build_id else {
            tracing::info!("no {ENV_BUILD_CONFIG_ID} set, tracking disabled");
            return Self::disabled();
        };

        let manifest = load_historical_manifest(repo_dir, &build_id).await;
        Self::new(Some(build_id), manifest)
    }

    #[must_use]
    pub fn disabled() -> Self {
        Self::new(None, None)
    }

    #[must_use]
    pub fn new(build_id: Option<String>, manifest: Option<HistoricalContent>) -> Self {
        let historical = manifest
            .map(|m| {
                m.downloads
                    .into_iter()
                    .map(|entry| (normalize_path(&entry.path), entry))
                    .collect()
            })
            .unwrap_or_default();
        Self {
            key: build_id.map(TrackingKey::new),
            uploads: DashSet::new(),
            downloads: DashSet::new(),
            historical,
        }
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.key.is_some()
    }

    /// Tracking key for new entries; "unknown" when no build id was set.
    #[must_use]
    pub fn key(&self) -> TrackingKey {
        self.key
            .clone()
            .unwrap_or_else(|| TrackingKey::new("unknown"))
    }

    pub fn append_upload(&self, entry: TrackedContentEntry) {
        if self.enabled() {
            self.uploads.insert(entry);
        }
    }

    pub fn append_download(&self, entry: TrackedContentEntry) {
        if self.enabled() {
            self.downloads.insert(entry);
        }
    }

    #[must_use]
    pub fn historical(&self, path: &str) -> Option<&HistoricalEntry> {
        self.historical.get(&normalize_path(path))
    }

    #[must_use]
    pub fn snapshot(&self) -> TrackedContent {
        TrackedContent {
            key: self.key(),
            uploads: self.uploads.iter().map(|e| e.clone()).collect(),
            downloads: self.downloads.iter().map(|e| e.clone()).collect(),
        }
    }

    pub fn clear(&self) {
        self.uploads.clear();
        self.downloads.clear();
    }

    #[must_use]
    pub fn entry_counts(&self) -> (usize, usize) {
        (self.uploads.len(), self.downloads.len())
    }

    /// Record a download that was served locally from the archive. The
    /// digests come from the historical manifest; a path with no manifest
    /// entry cannot be reported and is dropped with a warning.
    pub async fn record_sealed(&self, path: &str, forwarder: &Forwarder) {
        let normalized = normalize_path(path);
        let Some(known) = self.historical(&normalized) else {
            tracing::warn!(path = %normalized, "no historical entry for locally served path");
            return;
        };

        let entry = TrackedContentEntry {
            key: self.key(),
            store_key: known.store_key.clone(),
            access_channel: AccessChannel::Native,
            origin_url: known.origin_url.clone(),
            path: known.path.clone(),
            effect: StoreEffect::Download,
            size: known.size,
            md5: known.md5.clone(),
            sha1: known.sha1.clone(),
            sha256: known.sha256.clone(),
        };
        self.append_download(entry.clone());

        // Best effort: a failure here loses the downstream record, not
        // the in-memory entry.
        match serde_json::to_vec(&entry) {
            Ok(body) => {
                let result = forwarder
                    .forward(record_request(RECORD_ARTIFACT_PATH, Bytes::from(body)))
                    .await;
                match result {
                    Ok(response) => tracing::debug!(
                        path = %normalized,
                        status = response.status.as_u16(),
                        "sealed download recorded downstream"
                    ),
                    Err(e) => tracing::warn!(
                        path = %normalized,
                        error = %e,
                        "failed to record sealed download downstream"
                    ),
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to serialize tracking entry"),
        }
    }

    /// Push the aggregate report to the downstream import endpoint.
    pub async fn import_report(&self, forwarder: &Forwarder) -> Result<StatusCode, ForwardError> {
        let body = serde_json::to_vec(&self.snapshot())
            .map_err(|e| ForwardError::NonTransient(Box::new(e)))?;
        let response = forwarder
            .forward(record_request(IMPORT_REPORT_PATH, Bytes::from(body)))
            .await?;
        Ok(response.status)
    }
}

fn record_request(path: &str, body: Bytes) -> ForwardRequest<'_> {
    static JSON_HEADERS: std::sync::LazyLock<HeaderMap> = std::sync::LazyLock::new(|| {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        headers
    });
    ForwardRequest {
        method: Method::PUT,
        path_and_query: path,
        headers: &JSON_HEADERS,
        body,
        origin_scheme: "http",
        origin_authority: None,
    }
}

async fn load_historical_manifest(repo_dir: &Path, build_id: &str) -> Option<HistoricalContent> {
    let manifest_path = repo_dir.join(build_id);
    tracing::info!(path = %manifest_path.display(), "loading build content history");
    let json = match tokio::fs::read_to_string(&manifest_path).await {
        Ok(json) => json,
        Err(e) => {
            tracing::error!(
                path = %manifest_path.display(),
                error = %e,
                "failed to read historical manifest, continuing without"
            );
            return None;
        }
    };
    match serde_json::from_str(&json) {
        Ok(manifest) => Some(manifest),
        Err(e) => {
            tracing::error!(
                path = %manifest_path.display(),
                error = %e,
                "failed to parse historical manifest, continuing without"
            );
            None
        }
    }
}

/// Event published when a tracked path was served locally instead of
/// being proxied.
#[derive(Debug)]
pub struct SealedEvent {
    pub path: String,
}

/// Consumer task for sealed-path events. Runs until every sender is gone.
pub async fn sealed_event_loop(
    store: Arc<TrackingStore>,
    forwarder: Arc<Forwarder>,
    mut events: mpsc::Receiver<SealedEvent>,
) {
    while let Some(event) = events.recv().await {
        store.record_sealed(&event.path, &forwarder).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::model::{StoreKey, StoreType};

    fn manifest() -> HistoricalContent {
        HistoricalContent {
            build_config_id: "build-1".into(),
            downloads: vec![HistoricalEntry {
                store_key: StoreKey::new("maven", StoreType::Remote, "central"),
                path: "org/x/x-1.jar".into(),
                origin_url: Some("https://repo.example/org/x/x-1.jar".into()),
                size: 10,
                md5: Some("m".into()),
                sha1: Some("s1".into()),
                sha256: Some("s256".into()),
            }],
        }
    }

    fn entry(path: &str) -> TrackedContentEntry {
        TrackedContentEntry {
            key: TrackingKey::new("build-1"),
            store_key: StoreKey::new("maven", StoreType::Remote, "central"),
            access_channel: AccessChannel::Native,
            origin_url: None,
            path: path.into(),
            effect: StoreEffect::Download,
            size: 1,
            md5: None,
            sha1: None,
            sha256: None,
        }
    }

    #[test]
    fn disabled_store_records_nothing() {
        let store = TrackingStore::disabled();
        store.append_download(entry("/a"));
        store.append_upload(entry("/b"));
        assert_eq!(store.entry_counts(), (0, 0));
        assert_eq!(store.snapshot().key.id, "unknown");
    }

    #[test]
    fn duplicate_entries_collapse() {
        let store = TrackingStore::new(Some("build-1".into()), None);
        store.append_download(entry("/a"));
        store.append_download(entry("/a"));
        store.append_download(entry("/b"));
        assert_eq!(store.entry_counts(), (0, 2));
    }

    #[test]
    fn historical_lookup_normalizes_leading_slash() {
        let store = TrackingStore::new(Some("build-1".into()), Some(manifest()));
        assert!(store.historical("org/x/x-1.jar").is_some());
        assert!(store.historical("/org/x/x-1.jar").is_some());
        assert!(store.historical("/org/x/x-2.jar").is_none());
    }

    #[test]
    fn clear_empties_both_sets() {
        let store = TrackingStore::new(Some("build-1".into()), None);
        store.append_download(entry("/a"));
        store.append_upload(entry("/b"));
        store.clear();
        let snapshot = store.snapshot();
        assert!(snapshot.uploads.is_empty());
        assert!(snapshot.downloads.is_empty());
        assert_eq!(snapshot.key.id, "build-1");
    }

    #[tokio::test]
    async fn missing_manifest_file_is_not_fatal() {
        let dir = std::env::temp_dir().join("waybill-no-such-dir");
        assert!(load_historical_manifest(&dir, "build-x").await.is_none());
    }
}
