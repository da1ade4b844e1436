//! Configuration validation.
//!
//! Serde handles syntax; this module checks value ranges and addresses.
//! All errors are collected, not just the first.

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::{BreakerConfig, PlaneConfig};

/// A single semantic problem in a configuration document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &PlaneConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    validate_breaker("breaker", &config.breaker, &mut errors);
    for (name, breaker) in &config.resolved_breakers() {
        validate_breaker(&format!("breakers.{}", name), breaker, &mut errors);
    }

    let regions = &config.regions;
    if regions.probe_timeout_secs == 0 {
        errors.push(ValidationError::new("regions.probe_timeout_secs", "must be greater than 0"));
    }
    if regions.monitor_interval_secs == 0 {
        errors.push(ValidationError::new("regions.monitor_interval_secs", "must be greater than 0"));
    }
    if regions.store_path.as_os_str().is_empty() {
        errors.push(ValidationError::new("regions.store_path", "must not be empty"));
    }

    let admin = &config.admin;
    if admin.enabled {
        if admin.api_key.trim().is_empty() {
            errors.push(ValidationError::new("admin.api_key", "must not be empty when admin is enabled"));
        }
        if admin.bind_address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::new(
                "admin.bind_address",
                format!("'{}' is not a socket address", admin.bind_address),
            ));
        }
    }
    if admin.rate_limit_window_secs == 0 {
        errors.push(ValidationError::new("admin.rate_limit_window_secs", "must be greater than 0"));
    }

    let obs = &config.observability;
    if obs.metrics_enabled && obs.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", obs.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_breaker(prefix: &str, breaker: &BreakerConfig, errors: &mut Vec<ValidationError>) {
    if breaker.failure_threshold == 0 {
        errors.push(ValidationError::new(
            format!("{}.failure_threshold", prefix),
            "must be greater than 0",
        ));
    }
    if breaker.success_threshold == 0 {
        errors.push(ValidationError::new(
            format!("{}.success_threshold", prefix),
            "must be greater than 0",
        ));
    }
    if breaker.recovery_timeout_secs == 0 {
        errors.push(ValidationError::new(
            format!("{}.recovery_timeout_secs", prefix),
            "must be greater than 0",
        ));
    }
}
