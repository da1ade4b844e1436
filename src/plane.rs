//! Composition root.
//!
//! Every component is built once from the loaded config and shared by `Arc`.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::config::PlaneConfig;
use crate::region::{DeploymentStore, FailoverManager, HttpHealthProbe, StoreError};
use crate::resilience::BreakerRegistry;
use crate::security::RateLimiter;

#[derive(Debug, Error)]
pub enum PlaneError {
    #[error("failed to build health probe client: {0}")]
    Probe(#[from] reqwest::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct ControlPlane {
    pub breakers: Arc<BreakerRegistry>,
    pub limiter: RateLimiter,
    pub regions: Arc<FailoverManager>,
}

impl ControlPlane {
    pub fn from_config(config: &PlaneConfig) -> Result<Self, PlaneError> {
        let breakers = Arc::new(BreakerRegistry::with_overrides(
            config.breaker.clone(),
            config.resolved_breakers(),
        ));

        let probe = HttpHealthProbe::new(Duration::from_secs(config.regions.probe_timeout_secs))?;
        let store = DeploymentStore::new(
            &config.regions.store_path,
            Duration::from_millis(config.regions.lock_timeout_ms),
        );
        let regions = Arc::new(FailoverManager::open(store, Arc::new(probe))?);

        tracing::info!(
            breaker_overrides = config.breakers.len(),
            store_path = %config.regions.store_path.display(),
            probe_timeout_secs = config.regions.probe_timeout_secs,
            "Control plane initialized"
        );

        Ok(Self {
            breakers,
            limiter: RateLimiter::in_memory(),
            regions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;

    #[test]
    fn test_from_config_applies_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let store_path = dir.path().join("deployments.json");
        let config = parse_config(&format!(
            r#"
            [breaker]
            failure_threshold = 3

            [breakers.payments]
            failure_threshold = 1
            recovery_timeout_secs = 10
            success_threshold = 1

            [breakers.odds-api]
            recovery_timeout_secs = 5

            [regions]
            store_path = "{}"
            "#,
            store_path.display()
        ))
        .unwrap();

        let plane = ControlPlane::from_config(&config).unwrap();
        assert_eq!(plane.breakers.get_or_create("payments").config().failure_threshold, 1);
        assert_eq!(plane.breakers.get_or_create("search").config().failure_threshold, 3);

        let odds = plane.breakers.get_or_create("odds-api");
        assert_eq!(odds.config().recovery_timeout_secs, 5);
        assert_eq!(odds.config().failure_threshold, 3);
        assert!(plane.regions.list_deployments().is_empty());
    }
}
