//! Shared utilities for integration tests: mock upstream backends over
//! raw TCP and a fully wired test instance of the sidecar.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use waybill::archive::DirArchive;
use waybill::config::source::FileSource;
use waybill::config::ConfigStore;
use waybill::proxy::forwarder::Forwarder;
use waybill::proxy::router::Router;
use waybill::server::{self, AppState, Stats};
use waybill::tracking::store::sealed_event_loop;
use waybill::tracking::TrackingStore;

/// A mock upstream that records every request head and body it receives.
pub struct MockBackend {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<String>>>,
}

impl MockBackend {
    /// Requests seen so far, as raw `head + body` strings.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

/// Serve a fixed 200 response with the given body for every request.
pub async fn start_backend(body: Vec<u8>) -> MockBackend {
    start_backend_with(body, "200 OK", "").await
}

/// Serve a fixed response, with optional extra header lines
/// (`"name: value\r\n"` each).
pub async fn start_backend_with(
    body: Vec<u8>,
    status_line: &'static str,
    extra_headers: &'static str,
) -> MockBackend {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));

    let seen = Arc::clone(&requests);
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let seen = Arc::clone(&seen);
            let body = body.clone();
            tokio::spawn(async move {
                let Some(request) = read_request(&mut socket).await else {
                    return;
                };
                seen.lock().unwrap().push(request);
                let response = format!(
                    "HTTP/1.1 {status_line}\r\nContent-Length: {}\r\n{extra_headers}Connection: close\r\n\r\n",
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.write_all(&body).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    MockBackend { addr, requests }
}

/// A backend that slams the connection shut for the first `failures`
/// requests, then serves 200s. Exercises the transient-retry path.
pub async fn start_flaky_backend(failures: usize, body: &'static str) -> (SocketAddr, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let attempts = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&attempts);
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let attempt = counter.fetch_add(1, Ordering::SeqCst);
            if attempt < failures {
                // Close mid-request without a response.
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                drop(socket);
                continue;
            }
            let _ = read_request(&mut socket).await;
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });

    (addr, attempts)
}

async fn read_request(socket: &mut TcpStream) -> Option<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = find_header_end(&buf) {
            break pos;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let content_length = head
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())?
        })
        .unwrap_or(0);

    let mut total = buf.len() - header_end - 4;
    while total < content_length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        total += n;
    }
    Some(String::from_utf8_lossy(&buf).to_string())
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

pub struct TestApp {
    pub addr: SocketAddr,
    pub state: Arc<AppState>,
    shutdown: Option<tokio::sync::oneshot::Sender<()>>,
    config_path: PathBuf,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self.shutdown();
        let _ = std::fs::remove_file(&self.config_path);
    }
}

/// Spin up a full sidecar instance with the given routing YAML, tracking
/// store, and archive directory.
pub async fn start_app(config_yaml: &str, tracking: TrackingStore, repo_dir: PathBuf) -> TestApp {
    let config_path = std::env::temp_dir().join(format!("waybill-test-{}.yaml", uuid::Uuid::new_v4()));
    std::fs::write(&config_path, config_yaml).unwrap();

    let store = Arc::new(
        ConfigStore::bootstrap(Box::new(FileSource::new(config_path.clone())))
            .await
            .unwrap(),
    );
    let router = Arc::new(Router::new(&*store.current().await));
    let forwarder = Arc::new(Forwarder::new(Arc::clone(&store), Arc::clone(&router)));
    let tracking = Arc::new(tracking);
    let archive = Arc::new(DirArchive::new(repo_dir));

    let (sealed_tx, sealed_rx) = tokio::sync::mpsc::channel(64);
    tokio::spawn(sealed_event_loop(
        Arc::clone(&tracking),
        Arc::clone(&forwarder),
        sealed_rx,
    ));

    let state = Arc::new(AppState {
        config: store,
        routes: router,
        forwarder,
        tracking,
        archive,
        sealed_events: sealed_tx,
        stats: Stats::new(),
        start_time: Instant::now(),
    });

    let app = server::build_router(Arc::clone(&state), 8 * 1024 * 1024);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
            .unwrap();
    });

    TestApp {
        addr,
        state,
        shutdown: Some(shutdown_tx),
        config_path,
    }
}

/// Routing config pointing every path at one backend.
pub fn single_service_yaml(backend: SocketAddr) -> String {
    format!(
        "retry:\n  count: 1\n  interval: 10\n  max-backoff: 40\nservices:\n  - host: {}\n    port: {}\n    path-pattern: \"^/.*\"\n",
        backend.ip(),
        backend.port()
    )
}
