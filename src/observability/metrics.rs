//! Metrics collection and exposition.
//!
//! # Metrics
//! - `plane_breaker_transitions_total` (counter): by breaker, target state
//! - `plane_breaker_rejections_total` (counter): fail-fast rejections by breaker
//! - `plane_rate_limited_total` (counter): rejected admissions by scope
//! - `plane_region_health` (gauge): 1=healthy, 0=unhealthy, by deployment and region
//! - `plane_failovers_total` (counter): by deployment and outcome
//!
//! Recording goes through the `metrics` facade; without an installed
//! recorder every call is a no-op.

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its HTTP listener.
///
/// Must be called from inside a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_breaker_transition(breaker: &str, to_state: &'static str) {
    counter!(
        "plane_breaker_transitions_total",
        "breaker" => breaker.to_string(),
        "state" => to_state
    )
    .increment(1);
}

pub fn record_breaker_rejection(breaker: &str) {
    counter!("plane_breaker_rejections_total", "breaker" => breaker.to_string()).increment(1);
}

pub fn record_rate_limited(scope: &'static str) {
    counter!("plane_rate_limited_total", "scope" => scope).increment(1);
}

pub fn record_region_health(deployment: &str, region: &str, healthy: bool) {
    gauge!(
        "plane_region_health",
        "deployment" => deployment.to_string(),
        "region" => region.to_string()
    )
    .set(if healthy { 1.0 } else { 0.0 });
}

pub fn record_failover(deployment: &str, outcome: &'static str) {
    counter!(
        "plane_failovers_total",
        "deployment" => deployment.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}
