//! Concrete [`ConfigSource`](super::ConfigSource) implementations.
//!
//! [`FileSource`] reads a routing config from disk with SHA-256 change
//! detection; [`EmbeddedSource`] serves the compiled-in default used
//! when no file is supplied. Both run every load through the same
//! parse → normalize → validate → hash pipeline.

use std::path::PathBuf;

use async_trait::async_trait;

use super::model::ProxyConfig;
use super::validation::validate;
use super::{sha256_hex, ConfigSource, ConfigVersion};
use crate::error::WaybillError;

/// The built-in routing config, used when no file exists at startup.
const EMBEDDED_DEFAULT: &str = include_str!("default.yaml");

/// Parse a config string based on file extension.
pub fn parse_config_str(
    ext: &str,
    content: &str,
    path_display: &str,
) -> Result<ProxyConfig, WaybillError> {
    let mut config: ProxyConfig = match ext {
        #[cfg(feature = "yaml")]
        "yaml" | "yml" => {
            serde_yml::from_str(content).map_err(|e| WaybillError::ConfigParse {
                path: path_display.to_string(),
                source: Box::new(e),
            })?
        }

        #[cfg(feature = "json")]
        "json" => serde_json::from_str(content).map_err(|e| WaybillError::ConfigParse {
            path: path_display.to_string(),
            source: Box::new(e),
        })?,

        other => return Err(WaybillError::UnsupportedFormat(other.to_string())),
    };

    config.normalize();
    config.dedupe_services();
    Ok(config)
}

pub struct FileSource {
    path: PathBuf,
    ext: String,
    name: &'static str,
}

impl FileSource {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_string();
        Self {
            path,
            ext,
            name: "file",
        }
    }

    async fn read_content(&self) -> Result<String, WaybillError> {
        tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                WaybillError::ConfigFileNotFound {
                    path: self.path.clone(),
                }
            } else {
                WaybillError::Io(e)
            }
        })
    }
}

#[async_trait]
impl ConfigSource for FileSource {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn load(&self) -> Result<(ProxyConfig, ConfigVersion), WaybillError> {
        let content = self.read_content().await?;

        let config = parse_config_str(&self.ext, &content, &self.path.display().to_string())?;

        if let Err(errors) = validate(&config) {
            return Err(WaybillError::ConfigValidation { errors });
        }

        let hash = sha256_hex(content.as_bytes());
        Ok((config, ConfigVersion::Hash(hash)))
    }

    async fn has_changed(&self, current: &ConfigVersion) -> Result<bool, WaybillError> {
        let content = self.read_content().await?;
        let hash = sha256_hex(content.as_bytes());
        Ok(*current != ConfigVersion::Hash(hash))
    }
}

/// Compiled-in fallback config; never changes at runtime.
pub struct EmbeddedSource;

#[async_trait]
impl ConfigSource for EmbeddedSource {
    fn name(&self) -> &'static str {
        "embedded"
    }

    async fn load(&self) -> Result<(ProxyConfig, ConfigVersion), WaybillError> {
        let config = parse_config_str("yaml", EMBEDDED_DEFAULT, "<embedded>")?;

        if let Err(errors) = validate(&config) {
            return Err(WaybillError::ConfigValidation { errors });
        }

        let hash = sha256_hex(EMBEDDED_DEFAULT.as_bytes());
        Ok((config, ConfigVersion::Hash(hash)))
    }

    async fn has_changed(&self, _current: &ConfigVersion) -> Result<bool, WaybillError> {
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn embedded_default_parses_and_validates() {
        let (config, _) = EmbeddedSource.load().await.unwrap();
        assert!(!config.services.is_empty());
    }

    #[tokio::test]
    async fn embedded_source_never_changes() {
        let (_, version) = EmbeddedSource.load().await.unwrap();
        assert!(!EmbeddedSource.has_changed(&version).await.unwrap());
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let err = parse_config_str("xml", "<proxy/>", "proxy.xml").unwrap_err();
        assert!(matches!(err, WaybillError::UnsupportedFormat(_)));
    }
}
