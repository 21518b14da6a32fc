//! Serde data structures for the Waybill routing configuration.
//!
//! Contains [`ProxyConfig`] (the root), [`ServiceRoute`], and
//! [`RetryPolicy`]. All types derive `Serialize` and `Deserialize`
//! with `deny_unknown_fields` for strict parsing. A route's identity
//! is its `(methods, path-pattern)` pair: a later load carrying the
//! same identity replaces the earlier entry.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Fallback when `retry.interval` is absent or non-positive.
pub const DEFAULT_BACKOFF_MS: u64 = 3_000;

/// Fallback when `retry.max-backoff` is absent or non-positive.
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 15_000;

/// Fallback when `read-timeout` is absent or unparseable.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct ProxyConfig {
    /// Per-attempt upstream read timeout, e.g. "30m", "900s", "500ms".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_timeout: Option<String>,

    #[serde(default, skip_serializing_if = "RetryPolicy::is_default")]
    pub retry: RetryPolicy,

    /// Backend services in declaration order; first match wins.
    pub services: Vec<ServiceRoute>,
}

impl ProxyConfig {
    /// The effective per-attempt read timeout.
    ///
    /// Unparseable values fall back to the default; validation reports
    /// them, so this only happens for configs loaded before a fix.
    #[must_use]
    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .and_then(parse_duration)
            .unwrap_or(DEFAULT_READ_TIMEOUT)
    }

    /// Drop earlier entries whose identity key is repeated later in the
    /// list. The surviving entry keeps the position of its *latest*
    /// occurrence, so a reloaded config overrides remove-then-insert.
    pub fn dedupe_services(&mut self) {
        let mut deduped: Vec<ServiceRoute> = Vec::with_capacity(self.services.len());
        for service in self.services.drain(..) {
            deduped.retain(|s| s.identity() != service.identity());
            deduped.push(service);
        }
        self.services = deduped;
    }

    /// Uppercase all method lists so matching is case-insensitive.
    pub fn normalize(&mut self) {
        for service in &mut self.services {
            if let Some(m) = &service.methods {
                service.methods = Some(m.to_uppercase());
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct RetryPolicy {
    /// Retries after the initial attempt; 0 disables retry.
    #[serde(default)]
    pub count: u32,

    /// Wait before the first retry, in milliseconds.
    #[serde(default)]
    pub interval: u64,

    /// Ceiling for the doubling backoff, in milliseconds.
    #[serde(default)]
    pub max_backoff: u64,
}

impl RetryPolicy {
    fn is_default(&self) -> bool {
        *self == Self::default()
    }

    /// Initial backoff; non-positive configured values fall back to the
    /// fixed default.
    #[must_use]
    pub fn effective_interval(&self) -> Duration {
        if self.interval > 0 {
            Duration::from_millis(self.interval)
        } else {
            Duration::from_millis(DEFAULT_BACKOFF_MS)
        }
    }

    /// Backoff ceiling; non-positive configured values fall back to the
    /// fixed default.
    #[must_use]
    pub fn effective_max_backoff(&self) -> Duration {
        if self.max_backoff > 0 {
            Duration::from_millis(self.max_backoff)
        } else {
            Duration::from_millis(DEFAULT_MAX_BACKOFF_MS)
        }
    }
}

/// Identity key of a [`ServiceRoute`]: `(methods, path-pattern)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteKey {
    pub methods: Option<String>,
    pub path_pattern: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct ServiceRoute {
    pub host: String,

    pub port: u16,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub ssl: bool,

    /// Comma-separated verb list; absent or empty matches any method.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub methods: Option<String>,

    /// Regex the full request path must match.
    pub path_pattern: String,
}

impl ServiceRoute {
    #[must_use]
    pub fn identity(&self) -> RouteKey {
        RouteKey {
            methods: self.methods.as_ref().map(|m| m.to_uppercase()),
            path_pattern: self.path_pattern.clone(),
        }
    }

    /// An empty or absent method list allows every verb.
    #[must_use]
    pub fn allows_method(&self, method: &str) -> bool {
        match self.methods.as_deref() {
            None => true,
            Some(m) if m.trim().is_empty() => true,
            Some(m) => m
                .split(|c: char| c == ',' || c.is_whitespace())
                .any(|v| v.eq_ignore_ascii_case(method)),
        }
    }

    /// Scheme + authority for outbound request URIs.
    #[must_use]
    pub fn base_url(&self) -> String {
        let scheme = if self.ssl { "https" } else { "http" };
        format!("{scheme}://{}:{}", self.host, self.port)
    }
}

/// Parse a duration string of the form `"30m"`, `"900s"`, `"500ms"`, `"2h"`.
///
/// A bare number is taken as seconds.
#[must_use]
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    let (value, unit) = match s.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) => s.split_at(idx),
        None => (s, "s"),
    };
    let value: u64 = value.parse().ok()?;
    match unit {
        "ms" => Some(Duration::from_millis(value)),
        "s" => Some(Duration::from_secs(value)),
        "m" => Some(Duration::from_secs(value * 60)),
        "h" => Some(Duration::from_secs(value * 3600)),
        _ => None,
    }
}
