//! Forwarding engine: resolve a route, relay the request upstream,
//! retry transient failures with doubling backoff.
//!
//! The retry budget and read timeout come from the config snapshot taken
//! at the start of the request, so a mid-flight reload never changes a
//! request's behavior. Request bodies are fully buffered (the server
//! enforces a body size limit), which makes every attempt replayable
//! regardless of method.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use http_body_util::Full;
use hyper::body::Incoming;

use crate::config::model::ServiceRoute;
use crate::config::ConfigStore;
use crate::error::ForwardError;
use crate::proxy::headers::{build_forwarded_headers, sanitize_response_headers, trace_id_for};
use crate::proxy::router::Router;

/// Everything the forwarder needs from the inbound request, pre-extracted
/// so handlers can also synthesize calls (e.g. replaying recorded uploads).
pub struct ForwardRequest<'a> {
    pub method: Method,
    pub path_and_query: &'a str,
    pub headers: &'a HeaderMap,
    pub body: Bytes,
    pub origin_scheme: &'a str,
    pub origin_authority: Option<&'a str>,
}

/// A successful upstream exchange. The body is still streaming; callers
/// decide whether to relay it raw or through a digesting tee.
pub struct ForwardedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Incoming,
    pub trace_id: String,
    pub service: ServiceRoute,
}

pub struct Forwarder {
    store: Arc<ConfigStore>,
    router: Arc<Router>,
}

impl Forwarder {
    pub fn new(store: Arc<ConfigStore>, router: Arc<Router>) -> Self {
        Self { store, router }
    }

    pub async fn forward(&self, req: ForwardRequest<'_>) -> Result<ForwardedResponse, ForwardError> {
        let config = self.store.current().await;
        let path = normalize_path(req.path_and_query);
        let path_only = path.split('?').next().unwrap_or(&path);

        let table = self.router.table().await;
        let Some(matched) = table.resolve(path_only, req.method.as_str()) else {
            return Err(ForwardError::NoRoute {
                path: path_only.to_string(),
                method: req.method.to_string(),
            });
        };
        let service = matched.service.clone();

        let trace_id = trace_id_for(req.headers);
        let headers = build_forwarded_headers(
            req.headers,
            &trace_id,
            req.origin_scheme,
            req.origin_authority,
            &format!("{}:{}", service.host, service.port),
        );

        let uri: hyper::Uri = format!("{}{path}", service.base_url())
            .parse()
            .map_err(|e: hyper::http::uri::InvalidUri| ForwardError::NonTransient(Box::new(e)))?;

        let client = self.router.client_for(&service);
        let read_timeout = config.read_timeout();
        let retries = config.retry.count;
        let mut backoff = config.retry.effective_interval();
        let max_backoff = config.retry.effective_max_backoff();

        let mut attempt: u32 = 0;
        loop {
            let mut request = hyper::Request::builder()
                .method(req.method.clone())
                .uri(uri.clone())
                .body(Full::new(req.body.clone()))
                .map_err(|e| ForwardError::NonTransient(Box::new(e)))?;
            *request.headers_mut() = headers.clone();

            let outcome = match tokio::time::timeout(read_timeout, client.request(request)).await {
                Ok(Ok(response)) => {
                    let (parts, body) = response.into_parts();
                    let headers = sanitize_response_headers(&parts.headers, &trace_id);
                    return Ok(ForwardedResponse {
                        status: parts.status,
                        headers,
                        body,
                        trace_id,
                        service,
                    });
                }
                Ok(Err(e)) => ForwardError::from_client_error(e),
                Err(_) => ForwardError::Timeout(read_timeout),
            };

            if attempt >= retries || !outcome.is_transient() {
                return Err(outcome);
            }
            attempt += 1;
            tracing::warn!(
                trace_id = %trace_id,
                uri = %uri,
                attempt,
                backoff_ms = backoff.as_millis() as u64,
                error = %outcome,
                "upstream call failed, retrying"
            );
            tokio::time::sleep(backoff).await;
            backoff = next_backoff(backoff, max_backoff);
        }
    }
}

/// Paths arrive without a leading slash when extracted from a wildcard
/// route segment, and clients occasionally send doubled slashes. Ensure
/// exactly one leading slash and collapse repeats; the query string is
/// left untouched.
#[must_use]
pub fn normalize_path(path: &str) -> String {
    let (raw, query) = match path.split_once('?') {
        Some((raw, query)) => (raw, Some(query)),
        None => (path, None),
    };

    let mut normalized = String::with_capacity(path.len() + 1);
    normalized.push('/');
    let mut prev_slash = true;
    for c in raw.chars() {
        if c == '/' {
            if !prev_slash {
                normalized.push('/');
            }
            prev_slash = true;
        } else {
            normalized.push(c);
            prev_slash = false;
        }
    }

    if let Some(query) = query {
        normalized.push('?');
        normalized.push_str(query);
    }
    normalized
}

fn next_backoff(current: Duration, max: Duration) -> Duration {
    (current * 2).min(max)
}

/// Map a forwarding failure onto the wire: unroutable requests get a 400
/// naming the path and method, everything else a 500 carrying the cause
/// chain.
pub fn error_response(err: &ForwardError) -> Response {
    match err {
        ForwardError::NoRoute { .. } => {
            (StatusCode::BAD_REQUEST, err.to_string()).into_response()
        }
        _ => (StatusCode::INTERNAL_SERVER_ERROR, error_body(err)).into_response(),
    }
}

fn error_body(err: &ForwardError) -> String {
    match std::error::Error::source(err) {
        Some(cause) => format!("{err}. Caused by: {cause}"),
        None => err.to_string(),
    }
}
