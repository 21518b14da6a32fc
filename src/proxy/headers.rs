//! Header construction and stripping for forwarded requests.
//!
//! [`build_forwarded_headers`] clones the original client headers,
//! rewrites `Host` to the target service, and adds trace metadata:
//! a `trace-id` taken from the client's `external-id` header when present
//! (a fresh UUID otherwise) and a `proxy-origin` recording the scheme and
//! authority the client actually hit. [`sanitize_response_headers`]
//! removes framing headers from upstream responses and echoes the trace
//! id back as `Proxy-Trace-Id`.

use std::sync::LazyLock;

use axum::http::{HeaderMap, HeaderName, HeaderValue};

pub const TRACE_ID: HeaderName = HeaderName::from_static("trace-id");
pub const EXTERNAL_ID: HeaderName = HeaderName::from_static("external-id");
pub const PROXY_ORIGIN: HeaderName = HeaderName::from_static("proxy-origin");
pub const PROXY_TRACE_ID: HeaderName = HeaderName::from_static("proxy-trace-id");

/// Upstream framing headers that must not be relayed verbatim. The relay
/// re-frames the body itself, so stale `content-length` or `connection`
/// values from the origin would corrupt the client connection.
static STRIP_FROM_RESPONSE: LazyLock<Vec<HeaderName>> = LazyLock::new(|| {
    ["content-length", "connection", "transfer-encoding"]
        .iter()
        .filter_map(|name| name.parse::<HeaderName>().ok())
        .collect()
});

/// Resolve the trace id for a request: a non-blank client-supplied
/// `external-id` wins, otherwise a fresh UUID v4.
#[must_use]
pub fn trace_id_for(original: &HeaderMap) -> String {
    original
        .get(EXTERNAL_ID)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.trim().is_empty())
        .map_or_else(|| uuid::Uuid::new_v4().to_string(), String::from)
}

#[must_use]
pub fn build_forwarded_headers(
    original: &HeaderMap,
    trace_id: &str,
    origin_scheme: &str,
    origin_authority: Option<&str>,
    target_authority: &str,
) -> HeaderMap {
    let mut headers = original.clone();

    // The inbound Host points at us; rewrite it to the target service.
    headers.remove(hyper::header::HOST);
    if let Ok(val) = HeaderValue::from_str(target_authority) {
        headers.insert(hyper::header::HOST, val);
    }
    headers.remove(TRACE_ID);

    if let Ok(val) = HeaderValue::from_str(trace_id) {
        headers.insert(TRACE_ID, val);
    }

    if let Some(authority) = origin_authority {
        if let Ok(val) = HeaderValue::from_str(&format!("{origin_scheme}://{authority}")) {
            headers.insert(PROXY_ORIGIN, val);
        }
    }

    headers
}

/// Copy upstream response headers onto an outgoing response, minus the
/// framing headers, and stamp the trace id.
pub fn sanitize_response_headers(upstream: &HeaderMap, trace_id: &str) -> HeaderMap {
    let mut headers = upstream.clone();
    for name in STRIP_FROM_RESPONSE.iter() {
        headers.remove(name);
    }
    if let Ok(val) = HeaderValue::from_str(trace_id) {
        headers.insert(PROXY_TRACE_ID, val);
    }
    headers
}
