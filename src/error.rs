//! Unified error types for Waybill.
//!
//! Defines [`WaybillError`] (startup/config errors), [`ValidationError`]
//! for config validation failures, and [`ForwardError`] for the
//! forwarding path. All use `thiserror` for `Display` and `Error`
//! derives. `ForwardError` never crosses the handler boundary: the
//! forwarder converts every variant into a concrete HTTP response.

use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub route: String,
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "  service {}: {} — {}",
            self.route, self.field, self.message
        )?;
        if let Some(ref suggestion) = self.suggestion {
            write!(f, " ({suggestion})")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

fn format_errors(errors: &[ValidationError]) -> String {
    use std::fmt::Write;
    let mut buf = String::new();
    for (i, e) in errors.iter().enumerate() {
        if i > 0 {
            buf.push('\n');
        }
        // write! to String is infallible (only fails on OOM which is unrecoverable)
        let _ = write!(buf, "{e}");
    }
    buf
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum WaybillError {
    #[error("Config file not found: {}", path.display())]
    ConfigFileNotFound { path: PathBuf },

    #[error("Config parse error in {path}:\n  {source}")]
    ConfigParse {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Config validation failed:\n{}", format_errors(.errors))]
    ConfigValidation { errors: Vec<ValidationError> },

    #[error("Unsupported config format: '{0}'")]
    UnsupportedFormat(String),

    #[error("Invalid address: {0}")]
    AddressParse(#[from] std::net::AddrParseError),

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

/// Failure of a single proxied call.
///
/// Only [`ForwardError::Transient`] is eligible for retry; a received
/// backend status is never an error, whatever its code.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("Service not found, path: {path}, method: {method}")]
    NoRoute { path: String, method: String },

    #[error("upstream connection failed: {0}")]
    Transient(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("read timeout after {0:?}")]
    Timeout(std::time::Duration),

    #[error("request failed: {0}")]
    NonTransient(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ForwardError {
    /// Transient, connection-level failures qualify for retry; everything
    /// else (including any response actually received) is final.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Timeout(_))
    }

    /// Classify a hyper client error: connect failures and dropped
    /// connections count as transient, everything else does not.
    pub fn from_client_error(e: hyper_util::client::legacy::Error) -> Self {
        if e.is_connect() {
            return Self::Transient(Box::new(e));
        }
        // Errors surfaced while awaiting the response (reset, closed
        // mid-flight) arrive wrapped around a hyper::Error.
        let transient = std::error::Error::source(&e)
            .and_then(|s| s.downcast_ref::<hyper::Error>())
            .is_some_and(|h| h.is_incomplete_message() || h.is_canceled() || h.is_closed());
        if transient {
            Self::Transient(Box::new(e))
        } else {
            Self::NonTransient(Box::new(e))
        }
    }
}
