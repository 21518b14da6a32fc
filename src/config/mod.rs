//! Configuration loading, validation, and hot-reloading.
//!
//! Defines the [`ConfigSource`] trait for pluggable config origins,
//! the [`ConfigVersion`] content-hash for change detection, and the
//! [`ConfigStore`](store::ConfigStore) snapshot holder. Submodules
//! provide the data model, validation logic, and concrete sources.

pub mod model;
pub mod source;
pub mod store;
pub mod validation;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::WaybillError;
use model::ProxyConfig;

pub use model::{ProxyConfig as Config, RetryPolicy, RouteKey, ServiceRoute};
pub use store::{ConfigStore, LoadedConfig};

/// Content hash of the raw configuration representation. Two loads with
/// equal versions are byte-identical and need no swap.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigVersion {
    Hash(String),
}

impl ConfigVersion {
    /// Short prefix for logs and the health payload.
    #[must_use]
    pub fn short(&self) -> &str {
        match self {
            Self::Hash(h) => h.get(..8).unwrap_or(h),
        }
    }
}

// async_trait is required here because ConfigSource is used as Box<dyn ConfigSource>
// and native async fn in traits (Rust 1.75+) does not support dyn dispatch.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    fn name(&self) -> &'static str;
    async fn load(&self) -> Result<(ProxyConfig, ConfigVersion), WaybillError>;
    async fn has_changed(&self, current: &ConfigVersion) -> Result<bool, WaybillError>;
}

/// Compute a lowercase hex-encoded SHA-256 digest.
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}
