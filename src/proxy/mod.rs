//! Core HTTP request forwarding handler.
//!
//! The [`forward_handler`] function is the Axum fallback that receives
//! every request no other route claimed, resolves it against the
//! configured services, and relays it upstream. Submodules handle route
//! resolution ([`router`]), header construction ([`headers`]), and the
//! retrying forward engine ([`forwarder`]).

pub mod forwarder;
pub mod headers;
pub mod router;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderMap, Method, Uri};
use axum::response::Response;

use crate::server::AppState;
use forwarder::ForwardRequest;

pub async fn forward_handler(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    req_headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path_and_query = uri
        .path_and_query()
        .map_or_else(|| uri.path().to_string(), ToString::to_string);
    let authority = req_headers.get("host").and_then(|v| v.to_str().ok());

    let request = ForwardRequest {
        method: method.clone(),
        path_and_query: &path_and_query,
        headers: &req_headers,
        body,
        origin_scheme: "http",
        origin_authority: authority,
    };

    match state.forwarder.forward(request).await {
        Ok(forwarded) => {
            state.stats.forwarded.fetch_add(1, Ordering::Relaxed);
            tracing::info!(
                trace_id = %forwarded.trace_id,
                method = %method,
                path = %uri.path(),
                status = forwarded.status.as_u16(),
                upstream = %forwarded.service.base_url(),
                "request forwarded"
            );
            let mut response = Response::new(Body::new(forwarded.body));
            *response.status_mut() = forwarded.status;
            *response.headers_mut() = forwarded.headers;
            response
        }
        Err(e) => {
            state.stats.failed.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                method = %method,
                path = %uri.path(),
                error = %e,
                "request not forwarded"
            );
            forwarder::error_response(&e)
        }
    }
}
