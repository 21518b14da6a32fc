//! Configuration validation.
//!
//! Semantic checks on top of serde's syntactic parsing: hosts present,
//! ports valid, path patterns compile as regexes, method lists contain
//! known verbs, the read timeout parses. All errors are collected and
//! returned together rather than stopping at the first.

use super::model::{parse_duration, ProxyConfig};
use crate::error::ValidationError;

const KNOWN_METHODS: &[&str] = &["GET", "HEAD", "PUT", "POST", "DELETE", "OPTIONS", "PATCH"];

pub fn validate(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Some(timeout) = config.read_timeout.as_deref() {
        if !timeout.trim().is_empty() && parse_duration(timeout).is_none() {
            errors.push(ValidationError {
                route: "<root>".into(),
                field: "read-timeout".into(),
                message: format!("'{timeout}' is not a duration"),
                suggestion: Some("use e.g. \"30m\", \"900s\" or \"500ms\"".into()),
            });
        }
    }

    if config.services.is_empty() {
        errors.push(ValidationError {
            route: "<root>".into(),
            field: "services".into(),
            message: "no services configured".into(),
            suggestion: Some("add at least one host/port/path-pattern entry".into()),
        });
    }

    for service in &config.services {
        let label = service.path_pattern.clone();

        if service.host.trim().is_empty() {
            errors.push(ValidationError {
                route: label.clone(),
                field: "host".into(),
                message: "host is empty".into(),
                suggestion: None,
            });
        }

        if service.port == 0 {
            errors.push(ValidationError {
                route: label.clone(),
                field: "port".into(),
                message: "port must be 1-65535".into(),
                suggestion: None,
            });
        }

        if let Err(e) = regex::Regex::new(&service.path_pattern) {
            errors.push(ValidationError {
                route: label.clone(),
                field: "path-pattern".into(),
                message: format!("invalid regex: {e}"),
                suggestion: None,
            });
        }

        if let Some(methods) = service.methods.as_deref() {
            for verb in methods
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|v| !v.is_empty())
            {
                if !KNOWN_METHODS.iter().any(|m| verb.eq_ignore_ascii_case(m)) {
                    errors.push(ValidationError {
                        route: label.clone(),
                        field: "methods".into(),
                        message: format!("unknown method '{verb}'"),
                        suggestion: Some(format!("one of {}", KNOWN_METHODS.join(", "))),
                    });
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// One-line summary for `waybill validate` output.
#[must_use]
pub fn format_validation_report(path: &str, config: &ProxyConfig) -> String {
    format!(
        "{path} is valid: {} services, read-timeout {:?}, retry count {}",
        config.services.len(),
        config.read_timeout(),
        config.retry.count,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::{RetryPolicy, ServiceRoute};

    fn config_with(services: Vec<ServiceRoute>) -> ProxyConfig {
        ProxyConfig {
            read_timeout: None,
            retry: RetryPolicy::default(),
            services,
        }
    }

    fn service(pattern: &str) -> ServiceRoute {
        ServiceRoute {
            host: "indy".into(),
            port: 8080,
            ssl: false,
            methods: None,
            path_pattern: pattern.into(),
        }
    }

    #[test]
    fn valid_config_passes() {
        let config = config_with(vec![service("^/api/.*")]);
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn empty_services_fail() {
        let config = config_with(vec![]);
        let errors = validate(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "services");
    }

    #[test]
    fn bad_regex_and_port_are_both_reported() {
        let mut bad = service("^/api/(unclosed");
        bad.port = 0;
        let errors = validate(&config_with(vec![bad])).unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn unknown_method_is_reported() {
        let mut bad = service("^/api/.*");
        bad.methods = Some("GET,FETCH".into());
        let errors = validate(&config_with(vec![bad])).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("FETCH"));
    }

    #[test]
    fn bad_read_timeout_is_reported() {
        let mut config = config_with(vec![service("^/api/.*")]);
        config.read_timeout = Some("eventually".into());
        let errors = validate(&config).unwrap_err();
        assert_eq!(errors[0].field, "read-timeout");
    }
}
