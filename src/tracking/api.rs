//! HTTP handlers for tracked content access and report administration.
//!
//! Tracked content requests carry the artifact store coordinates in the
//! path. GETs are served from the local archive when possible (with the
//! download recorded from the historical manifest); everything else is
//! proxied, with downloads digested in-flight and uploads digested from
//! the buffered request body after the upstream accepts them.

use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;
use tokio_util::io::ReaderStream;

use crate::archive::should_proxy;
use crate::proxy::forwarder::{self, normalize_path, ForwardRequest, ForwardedResponse};
use crate::relay::{ContentDigests, TeeBody};
use crate::server::AppState;
use crate::tracking::model::{
    AccessChannel, StoreEffect, StoreKey, TrackedContent, TrackedContentEntry,
};
use crate::tracking::store::SealedEvent;

/// Path parameters of `/api/folo/track/{id}/{package_type}/{store_type}/{name}/{*path}`.
#[derive(Debug, serde::Deserialize)]
pub struct TrackedPath {
    pub id: String,
    pub package_type: String,
    pub store_type: String,
    pub name: String,
    pub path: String,
}

impl TrackedPath {
    fn store_key(&self) -> Result<StoreKey, Response> {
        if !matches!(self.package_type.as_str(), "maven" | "npm") {
            return Err(bad_request(format!(
                "unknown package type '{}'",
                self.package_type
            )));
        }
        let store_type = self
            .store_type
            .parse()
            .map_err(|e: String| bad_request(e))?;
        Ok(StoreKey::new(
            self.package_type.clone(),
            store_type,
            self.name.clone(),
        ))
    }
}

fn bad_request(message: String) -> Response {
    (StatusCode::BAD_REQUEST, message).into_response()
}

/// GET (and HEAD, which axum routes here too) for tracked content.
pub async fn tracked_get(
    State(state): State<Arc<AppState>>,
    Path(params): Path<TrackedPath>,
    method: Method,
    uri: Uri,
    req_headers: HeaderMap,
) -> Response {
    let store_key = match params.store_key() {
        Ok(key) => key,
        Err(response) => return response,
    };
    let artifact_path = normalize_path(&params.path);

    // HEAD carries no body to digest or serve locally.
    if method == Method::HEAD {
        return plain_forward(&state, method, &uri, &req_headers).await;
    }

    if !should_proxy(&artifact_path) && state.archive.contains(&artifact_path).await {
        if let Some(file) = state.archive.fetch(&artifact_path).await {
            tracing::debug!(path = %artifact_path, "serving tracked path from local archive");
            if state.tracking.enabled() {
                let event = SealedEvent {
                    path: artifact_path.clone(),
                };
                if state.sealed_events.send(event).await.is_err() {
                    tracing::warn!(path = %artifact_path, "sealed event consumer is gone");
                }
            }
            return Body::from_stream(ReaderStream::new(file)).into_response();
        }
    }

    tracing::debug!(path = %artifact_path, "serving tracked path from proxy");
    tracked_proxy_get(&state, &uri, &req_headers, store_key, artifact_path).await
}

/// PUT for tracked content: proxy the buffered body, record an upload
/// entry once the upstream accepts it.
pub async fn tracked_put(
    State(state): State<Arc<AppState>>,
    Path(params): Path<TrackedPath>,
    uri: Uri,
    req_headers: HeaderMap,
    body: Bytes,
) -> Response {
    let store_key = match params.store_key() {
        Ok(key) => key,
        Err(response) => return response,
    };
    let artifact_path = normalize_path(&params.path);

    let request = ForwardRequest {
        method: Method::PUT,
        path_and_query: uri.path(),
        headers: &req_headers,
        body: body.clone(),
        origin_scheme: "http",
        origin_authority: host_of(&req_headers),
    };
    match state.forwarder.forward(request).await {
        Ok(forwarded) => {
            if forwarded.status.is_success() && state.tracking.enabled() {
                let digests = ContentDigests::of(&body);
                state.tracking.append_upload(TrackedContentEntry {
                    key: state.tracking.key(),
                    store_key,
                    access_channel: AccessChannel::Native,
                    origin_url: None,
                    path: artifact_path,
                    effect: StoreEffect::Upload,
                    size: digests.size,
                    md5: Some(digests.md5),
                    sha1: Some(digests.sha1),
                    sha256: Some(digests.sha256),
                });
            }
            raw_response(forwarded)
        }
        Err(e) => forwarder::error_response(&e),
    }
}

/// Proxied tracked GET: relay through a digesting tee and append the
/// download entry when the stream completes cleanly.
async fn tracked_proxy_get(
    state: &Arc<AppState>,
    uri: &Uri,
    req_headers: &HeaderMap,
    store_key: StoreKey,
    artifact_path: String,
) -> Response {
    let request = ForwardRequest {
        method: Method::GET,
        path_and_query: uri
            .path_and_query()
            .map_or(uri.path(), |pq| pq.as_str()),
        headers: req_headers,
        body: Bytes::new(),
        origin_scheme: "http",
        origin_authority: host_of(req_headers),
    };
    let forwarded = match state.forwarder.forward(request).await {
        Ok(forwarded) => forwarded,
        Err(e) => return forwarder::error_response(&e),
    };

    if !forwarded.status.is_success() || !state.tracking.enabled() {
        return raw_response(forwarded);
    }

    let origin_url = origin_url_of(&forwarded);
    let tracking = Arc::clone(&state.tracking);
    let tracking_key = state.tracking.key();
    let status = forwarded.status;
    let headers = forwarded.headers;
    let body = TeeBody::new(
        forwarded.body,
        Box::new(move |digests: ContentDigests| {
            tracking.append_download(TrackedContentEntry {
                key: tracking_key,
                store_key,
                access_channel: AccessChannel::Native,
                origin_url,
                path: artifact_path,
                effect: StoreEffect::Download,
                size: digests.size,
                md5: Some(digests.md5),
                sha1: Some(digests.sha1),
                sha256: Some(digests.sha256),
            });
        }),
    );

    let mut response = Response::new(Body::from_stream(body));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

async fn plain_forward(
    state: &Arc<AppState>,
    method: Method,
    uri: &Uri,
    req_headers: &HeaderMap,
) -> Response {
    let request = ForwardRequest {
        method,
        path_and_query: uri
            .path_and_query()
            .map_or(uri.path(), |pq| pq.as_str()),
        headers: req_headers,
        body: Bytes::new(),
        origin_scheme: "http",
        origin_authority: host_of(req_headers),
    };
    match state.forwarder.forward(request).await {
        Ok(forwarded) => raw_response(forwarded),
        Err(e) => forwarder::error_response(&e),
    }
}

fn raw_response(forwarded: ForwardedResponse) -> Response {
    let mut response = Response::new(Body::new(forwarded.body));
    *response.status_mut() = forwarded.status;
    *response.headers_mut() = forwarded.headers;
    response
}

fn host_of(headers: &HeaderMap) -> Option<&str> {
    headers.get("host").and_then(|v| v.to_str().ok())
}

/// The upstream names the true origin of remote content in the
/// `indy-origin` response header. Relative values are resolved against
/// the route's base URL.
fn origin_url_of(forwarded: &ForwardedResponse) -> Option<String> {
    let origin = forwarded.headers.get("indy-origin")?.to_str().ok()?;
    if origin.starts_with("http://") || origin.starts_with("https://") {
        return Some(origin.to_string());
    }
    url::Url::parse(&forwarded.service.base_url())
        .ok()?
        .join(origin.trim_start_matches('/'))
        .ok()
        .map(|resolved| resolved.to_string())
}

/// GET `/api/folo/track/{id}/record` — the aggregate report as JSON.
pub async fn export_report(State(state): State<Arc<AppState>>) -> Json<TrackedContent> {
    Json(state.tracking.snapshot())
}

/// DELETE `/api/folo/track/{id}/record` — clear and return the now-empty
/// aggregate.
pub async fn clear_report(State(state): State<Arc<AppState>>) -> Json<TrackedContent> {
    state.tracking.clear();
    Json(state.tracking.snapshot())
}

/// PUT `/api/folo/track/{id}/record/import` — push the aggregate to the
/// downstream import endpoint.
pub async fn import_report(State(state): State<Arc<AppState>>) -> Response {
    match state.tracking.import_report(&state.forwarder).await {
        Ok(status) => status.into_response(),
        Err(e) => forwarder::error_response(&e),
    }
}
