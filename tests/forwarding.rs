//! Integration tests for the forwarding path: header handling, route
//! misses, and transient-failure retry against raw-TCP mock upstreams.

mod common;

use common::{single_service_yaml, start_app, start_backend, start_flaky_backend};
use std::sync::atomic::Ordering;
use waybill::tracking::TrackingStore;

fn empty_repo() -> std::path::PathBuf {
    std::env::temp_dir().join("waybill-no-archive")
}

#[tokio::test]
async fn forwards_with_trace_headers_and_rewritten_host() {
    let backend = start_backend(b"artifact-bytes".to_vec()).await;
    let mut app = start_app(
        &single_service_yaml(backend.addr),
        TrackingStore::disabled(),
        empty_repo(),
    )
    .await;

    let client = reqwest::Client::new();
    let resp = client
        .get(app.url("/api/content/maven/group/public/org/x/x-1.jar"))
        .header("external-id", "build-42")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers().get("Proxy-Trace-Id").unwrap(), "build-42");
    assert!(resp.headers().get("connection").is_none());
    assert_eq!(resp.bytes().await.unwrap().as_ref(), b"artifact-bytes");

    let requests = backend.requests();
    assert_eq!(requests.len(), 1);
    let head = &requests[0];
    assert!(head.starts_with("GET /api/content/maven/group/public/org/x/x-1.jar"));
    assert!(head.contains("trace-id: build-42"), "{head}");
    assert!(head.contains("proxy-origin: http://"), "{head}");
    // Host must point at the upstream, not at the sidecar.
    assert!(
        head.contains(&format!("host: {}", backend.addr)),
        "{head}"
    );
    assert!(!head.contains(&format!("host: {}", app.addr)), "{head}");

    app.shutdown();
}

#[tokio::test]
async fn generates_a_trace_id_when_external_id_is_absent() {
    let backend = start_backend(b"ok".to_vec()).await;
    let mut app = start_app(
        &single_service_yaml(backend.addr),
        TrackingStore::disabled(),
        empty_repo(),
    )
    .await;

    let resp = reqwest::get(app.url("/anything")).await.unwrap();
    let trace_id = resp
        .headers()
        .get("Proxy-Trace-Id")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(uuid::Uuid::parse_str(&trace_id).is_ok(), "{trace_id}");

    app.shutdown();
}

#[tokio::test]
async fn unroutable_request_gets_400_with_message() {
    let backend = start_backend(b"ok".to_vec()).await;
    let yaml = format!(
        "services:\n  - host: {}\n    port: {}\n    path-pattern: \"^/api/.*\"\n",
        backend.addr.ip(),
        backend.addr.port()
    );
    let mut app = start_app(&yaml, TrackingStore::disabled(), empty_repo()).await;

    let resp = reqwest::Client::new()
        .put(app.url("/other/thing"))
        .body("x")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    assert_eq!(
        resp.text().await.unwrap(),
        "Service not found, path: /other/thing, method: PUT"
    );
    assert_eq!(backend.request_count(), 0);

    app.shutdown();
}

#[tokio::test]
async fn backend_error_status_is_relayed_not_retried() {
    let backend = common::start_backend_with(b"boom".to_vec(), "503 Service Unavailable", "").await;
    let mut app = start_app(
        &single_service_yaml(backend.addr),
        TrackingStore::disabled(),
        empty_repo(),
    )
    .await;

    let resp = reqwest::get(app.url("/api/x")).await.unwrap();
    assert_eq!(resp.status(), 503);
    // A received status is final, whatever its code.
    assert_eq!(backend.request_count(), 1);

    app.shutdown();
}

#[tokio::test]
async fn transient_failure_is_retried_until_success() {
    let (addr, attempts) = start_flaky_backend(1, "recovered").await;
    let mut app = start_app(
        &single_service_yaml(addr),
        TrackingStore::disabled(),
        empty_repo(),
    )
    .await;

    let resp = reqwest::get(app.url("/api/x")).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "recovered");
    assert_eq!(attempts.load(Ordering::SeqCst), 2);

    app.shutdown();
}

#[tokio::test]
async fn retries_stop_after_the_configured_budget() {
    // Never recovers; count: 1 in the config means two attempts total.
    let (addr, attempts) = start_flaky_backend(usize::MAX, "never").await;
    let mut app = start_app(
        &single_service_yaml(addr),
        TrackingStore::disabled(),
        empty_repo(),
    )
    .await;

    let resp = reqwest::get(app.url("/api/x")).await.unwrap();
    assert_eq!(resp.status(), 500);
    let body = resp.text().await.unwrap();
    assert!(body.contains("Caused by:"), "{body}");
    assert_eq!(attempts.load(Ordering::SeqCst), 2);

    app.shutdown();
}

#[tokio::test]
async fn first_declared_service_shadows_later_ones() {
    let specific = start_backend(b"from-specific".to_vec()).await;
    let general = start_backend(b"from-general".to_vec()).await;
    let yaml = format!(
        "services:\n  \
         - host: {}\n    port: {}\n    path-pattern: \"^/api/content/.*\"\n  \
         - host: {}\n    port: {}\n    path-pattern: \"^/.*\"\n",
        specific.addr.ip(),
        specific.addr.port(),
        general.addr.ip(),
        general.addr.port()
    );
    let mut app = start_app(&yaml, TrackingStore::disabled(), empty_repo()).await;

    let resp = reqwest::get(app.url("/api/content/x")).await.unwrap();
    assert_eq!(resp.text().await.unwrap(), "from-specific");

    let resp = reqwest::get(app.url("/api/admin/x")).await.unwrap();
    assert_eq!(resp.text().await.unwrap(), "from-general");

    app.shutdown();
}
