//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the control plane.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration for the control plane.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct PlaneConfig {
    /// Defaults for lazily created circuit breakers.
    pub breaker: BreakerConfig,

    /// Per-dependency breaker overrides, keyed by dependency name.
    /// Fields left out inherit from `breaker`.
    pub breakers: HashMap<String, BreakerOverride>,

    /// Region failover settings.
    pub regions: RegionsConfig,

    /// Admin API settings.
    pub admin: AdminConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Circuit breaker thresholds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Consecutive failures (while closed) that open the circuit.
    pub failure_threshold: u32,

    /// Seconds the circuit stays open before a half-open probe is admitted.
    #[serde(alias = "timeout_duration_secs")]
    pub recovery_timeout_secs: u64,

    /// Consecutive half-open successes that close the circuit.
    pub success_threshold: u32,
}

impl BreakerConfig {
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_secs(self.recovery_timeout_secs)
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_secs: 60,
            success_threshold: 2,
        }
    }
}

/// Partial thresholds for one named breaker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct BreakerOverride {
    pub failure_threshold: Option<u32>,
    #[serde(alias = "timeout_duration_secs")]
    pub recovery_timeout_secs: Option<u64>,
    pub success_threshold: Option<u32>,
}

impl BreakerOverride {
    /// Fill the missing fields from `base`.
    pub fn apply(&self, base: &BreakerConfig) -> BreakerConfig {
        BreakerConfig {
            failure_threshold: self.failure_threshold.unwrap_or(base.failure_threshold),
            recovery_timeout_secs: self.recovery_timeout_secs.unwrap_or(base.recovery_timeout_secs),
            success_threshold: self.success_threshold.unwrap_or(base.success_threshold),
        }
    }
}

impl PlaneConfig {
    /// Every named override merged over the `breaker` section.
    pub fn resolved_breakers(&self) -> HashMap<String, BreakerConfig> {
        self.breakers
            .iter()
            .map(|(name, o)| (name.clone(), o.apply(&self.breaker)))
            .collect()
    }
}

/// Multi-region deployment store and health checking.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RegionsConfig {
    /// Path of the persisted deployment document.
    pub store_path: PathBuf,

    /// Health probe timeout in seconds.
    pub probe_timeout_secs: u64,

    /// Run the periodic health monitor.
    pub monitor_enabled: bool,

    /// Health monitor interval in seconds.
    pub monitor_interval_secs: u64,

    /// How long to wait for the store lock before giving up, in milliseconds.
    pub lock_timeout_ms: u64,
}

impl Default for RegionsConfig {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from("deployments.json"),
            probe_timeout_secs: 5,
            monitor_enabled: false,
            monitor_interval_secs: 30,
            lock_timeout_ms: 5000,
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,

    /// Requests admitted per client IP within the window.
    pub rate_limit_max_requests: u32,

    /// Sliding window length for the admin API limiter, in seconds.
    pub rate_limit_window_secs: u64,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
            rate_limit_max_requests: 120,
            rate_limit_window_secs: 60,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
