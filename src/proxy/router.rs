//! Route resolution and the per-route HTTP client pool.
//!
//! A [`RouteTable`] is compiled from one config snapshot: every service's
//! path pattern becomes a pre-compiled [`regex::Regex`], in declaration
//! order. Resolution walks the table and returns the first service whose
//! method list and pattern both match, so earlier entries shadow later
//! ones.
//!
//! The [`ClientPool`] keeps one connection-pooling hyper client per route
//! identity. A config change clears the pool wholesale; clients handed
//! out for in-flight requests are cheap handles and keep working.

use std::sync::Arc;

use dashmap::DashMap;
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use regex::Regex;
use tokio::sync::RwLock;

use crate::config::model::{ProxyConfig, RouteKey, ServiceRoute};
use crate::config::ConfigStore;

pub type HttpClient = Client<HttpsConnector<HttpConnector>, http_body_util::Full<bytes::Bytes>>;

#[derive(Debug, Clone)]
pub struct CompiledRoute {
    pub service: ServiceRoute,
    pattern: Regex,
}

/// Immutable, pre-compiled view of one config snapshot's services.
#[derive(Debug)]
pub struct RouteTable {
    entries: Vec<CompiledRoute>,
}

impl RouteTable {
    /// Patterns were validated at load time; one that fails to compile
    /// here is skipped rather than taking the whole table down.
    #[must_use]
    pub fn compile(config: &ProxyConfig) -> Self {
        let entries = config
            .services
            .iter()
            .filter_map(|service| match Regex::new(&service.path_pattern) {
                Ok(pattern) => Some(CompiledRoute {
                    service: service.clone(),
                    pattern,
                }),
                Err(e) => {
                    tracing::warn!(
                        pattern = %service.path_pattern,
                        error = %e,
                        "skipping service with invalid path pattern"
                    );
                    None
                }
            })
            .collect();
        Self { entries }
    }

    /// First declared service whose methods and pattern both match.
    #[must_use]
    pub fn resolve(&self, path: &str, method: &str) -> Option<&CompiledRoute> {
        self.entries
            .iter()
            .find(|entry| entry.service.allows_method(method) && entry.pattern.is_match(path))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Connection-pooling clients keyed by route identity.
#[derive(Debug, Default)]
pub struct ClientPool {
    clients: DashMap<RouteKey, HttpClient>,
}

impl ClientPool {
    #[must_use]
    pub fn get(&self, service: &ServiceRoute) -> HttpClient {
        self.clients
            .entry(service.identity())
            .or_insert_with(new_client)
            .clone()
    }

    pub fn clear(&self) {
        self.clients.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.len()
    }
}

fn new_client() -> HttpClient {
    let https = hyper_rustls::HttpsConnectorBuilder::new()
        .with_webpki_roots()
        .https_or_http()
        .enable_http1()
        .build();
    Client::builder(TokioExecutor::new()).build(https)
}

/// Shared route resolution state, refreshed when the config store
/// publishes a new snapshot.
pub struct Router {
    table: RwLock<Arc<RouteTable>>,
    pool: ClientPool,
}

impl Router {
    #[must_use]
    pub fn new(config: &ProxyConfig) -> Self {
        Self {
            table: RwLock::new(Arc::new(RouteTable::compile(config))),
            pool: ClientPool::default(),
        }
    }

    pub async fn table(&self) -> Arc<RouteTable> {
        Arc::clone(&*self.table.read().await)
    }

    #[must_use]
    pub fn client_for(&self, service: &ServiceRoute) -> HttpClient {
        self.pool.get(service)
    }

    /// Swap in a table compiled from the new snapshot and drop all pooled
    /// clients so stale-route connections are not reused.
    pub async fn rebuild(&self, config: &ProxyConfig) {
        let table = Arc::new(RouteTable::compile(config));
        tracing::info!(services = table.len(), "route table rebuilt");
        *self.table.write().await = table;
        self.pool.clear();
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("pooled_clients", &self.pool.len())
            .finish_non_exhaustive()
    }
}

/// Rebuild the router whenever the config store announces a change.
/// Runs until the store side of the watch channel is dropped.
pub async fn rebuild_loop(router: Arc<Router>, store: Arc<ConfigStore>) {
    let mut changes = store.subscribe();
    while changes.changed().await.is_ok() {
        let config = store.current().await;
        router.rebuild(&config).await;
    }
}
