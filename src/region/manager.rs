//! Multi-region failover manager.
//!
//! # Responsibilities
//! - Create deployments and persist the full deployment set
//! - Probe region health and record the outcome
//! - Resolve the serving region and redesignate it on failover
//!
//! # Design Decisions
//! - The document is read once at construction; every mutation re-reads it
//!   under the store lock, applies the change, rewrites the whole file, and
//!   only then publishes the new copy in memory
//! - Health probes run without any lock held; only the state write is locked
//! - An explicit failover target is honored even if it is unhealthy
//! - Nothing is retried internally

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard};

use chrono::Utc;
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::observability::metrics;
use crate::region::probe::HealthProbe;
use crate::region::store::{DeploymentStore, StoreError};
use crate::region::types::{
    DeploymentSet, FailoverEvent, FailoverStrategy, MultiRegionDeployment, RegionConfig,
    RegionStatus,
};

const HISTORY_LIMIT: usize = 100;

#[derive(Debug, Error)]
pub enum FailoverError {
    #[error("deployment '{0}' not found")]
    DeploymentNotFound(String),

    #[error("region '{region}' not found in deployment '{deployment}'")]
    RegionNotFound { deployment: String, region: String },

    #[error("no healthy failover target for deployment '{0}'")]
    NoSuitableTarget(String),

    #[error("deployment '{0}' already exists")]
    DeploymentExists(String),

    #[error("invalid deployment: {0}")]
    InvalidDeployment(String),

    #[error("failed to persist deployment state: {0}")]
    Persistence(#[from] StoreError),
}

/// Outcome of one region probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegionHealth {
    pub region_name: String,
    pub is_healthy: bool,
}

/// Partial region change. Fields that are present replace current values.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RegionUpdate {
    pub endpoint_url: Option<String>,
    pub health_check_url: Option<String>,
    pub status: Option<RegionStatus>,
}

pub struct FailoverManager {
    store: DeploymentStore,
    probe: Arc<dyn HealthProbe>,
    state: RwLock<DeploymentSet>,
    /// Serializes mutations within this process; the store lock covers other processes.
    write_lock: tokio::sync::Mutex<()>,
    history: Mutex<VecDeque<FailoverEvent>>,
}

impl FailoverManager {
    /// Load the deployment document once and build the manager.
    pub fn open(store: DeploymentStore, probe: Arc<dyn HealthProbe>) -> Result<Self, StoreError> {
        let set = store.load()?;
        tracing::info!(
            path = %store.path().display(),
            deployments = set.deployments.len(),
            "Deployment store loaded"
        );
        Ok(Self {
            store,
            probe,
            state: RwLock::new(set),
            write_lock: tokio::sync::Mutex::new(()),
            history: Mutex::new(VecDeque::new()),
        })
    }

    pub async fn create_deployment(
        &self,
        deployment_id: &str,
        name: &str,
        region_names: &[&str],
        primary_region: &str,
        strategy: FailoverStrategy,
    ) -> Result<MultiRegionDeployment, FailoverError> {
        let deployment =
            MultiRegionDeployment::new(deployment_id, name, region_names, primary_region, strategy)
                .map_err(FailoverError::InvalidDeployment)?;

        let created = self
            .mutate(|set| {
                if set.find(deployment_id).is_some() {
                    return Err(FailoverError::DeploymentExists(deployment_id.to_string()));
                }
                set.deployments.push(deployment.clone());
                Ok(deployment)
            })
            .await?;

        tracing::info!(
            deployment = %deployment_id,
            regions = created.regions.len(),
            primary = %primary_region,
            strategy = ?strategy,
            "Deployment created"
        );
        Ok(created)
    }

    pub fn get_deployment(&self, deployment_id: &str) -> Option<MultiRegionDeployment> {
        self.read_state().find(deployment_id).cloned()
    }

    pub fn list_deployments(&self) -> Vec<MultiRegionDeployment> {
        self.read_state().deployments.clone()
    }

    /// The ACTIVE and healthy region with the best priority, if any.
    pub fn get_active_region(&self, deployment_id: &str) -> Option<RegionConfig> {
        self.read_state()
            .find(deployment_id)
            .and_then(|d| d.active_region())
            .cloned()
    }

    /// Probe one region and record the result. Never fails: an unknown
    /// region, a probe failure, or a failed write all end up as logs.
    pub async fn check_region_health(&self, deployment_id: &str, region_name: &str) -> bool {
        let url = match self
            .read_state()
            .find(deployment_id)
            .and_then(|d| d.region(region_name))
        {
            Some(region) => region.health_check_url.clone(),
            None => {
                tracing::warn!(
                    deployment = %deployment_id,
                    region = %region_name,
                    "Health check requested for unknown region"
                );
                return false;
            }
        };

        let healthy = self
            .probe_region(deployment_id, region_name, url.as_deref())
            .await;

        let results = [RegionHealth {
            region_name: region_name.to_string(),
            is_healthy: healthy,
        }];
        if let Err(e) = self.record_health(deployment_id, &results).await {
            tracing::error!(
                deployment = %deployment_id,
                region = %region_name,
                error = %e,
                "Failed to record health check result"
            );
        }
        healthy
    }

    /// Probe every region of a deployment concurrently and record all
    /// outcomes in one write. Only an unknown deployment is an error.
    pub async fn check_deployment_health(
        &self,
        deployment_id: &str,
    ) -> Result<Vec<RegionHealth>, FailoverError> {
        let targets: Vec<(String, Option<String>)> = self
            .read_state()
            .find(deployment_id)
            .ok_or_else(|| FailoverError::DeploymentNotFound(deployment_id.to_string()))?
            .regions
            .iter()
            .map(|r| (r.region_name.clone(), r.health_check_url.clone()))
            .collect();

        let results = join_all(targets.iter().map(|(region_name, url)| async move {
            RegionHealth {
                region_name: region_name.clone(),
                is_healthy: self
                    .probe_region(deployment_id, region_name, url.as_deref())
                    .await,
            }
        }))
        .await;

        if let Err(e) = self.record_health(deployment_id, &results).await {
            tracing::error!(
                deployment = %deployment_id,
                error = %e,
                "Failed to record health check results"
            );
        }
        Ok(results)
    }

    /// Redesignate the active region.
    ///
    /// With `to_region`, that region becomes active whatever its health.
    /// Without it, the best-priority healthy region other than the current
    /// active one is chosen. On any error the stored state is unchanged.
    pub async fn failover(
        &self,
        deployment_id: &str,
        to_region: Option<&str>,
    ) -> Result<FailoverEvent, FailoverError> {
        let result = self
            .mutate(|set| {
                let deployment = set
                    .find_mut(deployment_id)
                    .ok_or_else(|| FailoverError::DeploymentNotFound(deployment_id.to_string()))?;

                let current = deployment.active_region().map(|r| r.region_name.clone());
                let target = match to_region {
                    Some(name) => deployment
                        .region(name)
                        .ok_or_else(|| FailoverError::RegionNotFound {
                            deployment: deployment_id.to_string(),
                            region: name.to_string(),
                        })?
                        .region_name
                        .clone(),
                    None => deployment
                        .failover_candidate(current.as_deref())
                        .ok_or_else(|| FailoverError::NoSuitableTarget(deployment_id.to_string()))?
                        .region_name
                        .clone(),
                };

                deployment.activate(&target, current.as_deref());
                Ok(FailoverEvent::new(
                    deployment_id,
                    current,
                    target,
                    to_region.is_some(),
                ))
            })
            .await;

        match &result {
            Ok(event) => {
                tracing::warn!(
                    deployment = %deployment_id,
                    from = ?event.from_region,
                    to = %event.to_region,
                    manual = event.manual,
                    "Failover completed"
                );
                metrics::record_failover(deployment_id, "success");
                let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
                if history.len() == HISTORY_LIMIT {
                    history.pop_front();
                }
                history.push_back(event.clone());
            }
            Err(FailoverError::NoSuitableTarget(_)) => {
                tracing::error!(deployment = %deployment_id, "Failover aborted: no healthy target");
                metrics::record_failover(deployment_id, "no_target");
            }
            Err(FailoverError::Persistence(e)) => {
                tracing::error!(deployment = %deployment_id, error = %e, "Failover could not be recorded");
                metrics::record_failover(deployment_id, "persistence_error");
            }
            Err(e) => {
                tracing::warn!(deployment = %deployment_id, error = %e, "Failover rejected");
                metrics::record_failover(deployment_id, "rejected");
            }
        }
        result
    }

    /// Set where a region serves traffic and where it is probed.
    pub async fn set_region_endpoints(
        &self,
        deployment_id: &str,
        region_name: &str,
        endpoint_url: Option<String>,
        health_check_url: Option<String>,
    ) -> Result<RegionConfig, FailoverError> {
        self.mutate(|set| {
            let region = find_region_mut(set, deployment_id, region_name)?;
            region.endpoint_url = endpoint_url;
            region.health_check_url = health_check_url;
            Ok(region.clone())
        })
        .await
    }

    /// Operator-driven status change (deploy lifecycle, advisory markers).
    pub async fn set_region_status(
        &self,
        deployment_id: &str,
        region_name: &str,
        status: RegionStatus,
    ) -> Result<RegionConfig, FailoverError> {
        let region = self
            .mutate(|set| {
                let region = find_region_mut(set, deployment_id, region_name)?;
                region.status = status;
                Ok(region.clone())
            })
            .await?;
        tracing::info!(
            deployment = %deployment_id,
            region = %region_name,
            status = ?status,
            "Region status updated"
        );
        Ok(region)
    }

    /// Apply a partial change to one region in a single locked write.
    pub async fn update_region(
        &self,
        deployment_id: &str,
        region_name: &str,
        update: RegionUpdate,
    ) -> Result<RegionConfig, FailoverError> {
        let status = update.status;
        let region = self
            .mutate(|set| {
                let region = find_region_mut(set, deployment_id, region_name)?;
                if let Some(url) = update.endpoint_url {
                    region.endpoint_url = Some(url);
                }
                if let Some(url) = update.health_check_url {
                    region.health_check_url = Some(url);
                }
                if let Some(status) = update.status {
                    region.status = status;
                }
                Ok(region.clone())
            })
            .await?;
        tracing::info!(
            deployment = %deployment_id,
            region = %region_name,
            status = ?status,
            "Region updated"
        );
        Ok(region)
    }

    /// Most recent failovers, oldest first.
    pub fn history(&self) -> Vec<FailoverEvent> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    async fn probe_region(&self, deployment_id: &str, region_name: &str, url: Option<&str>) -> bool {
        let healthy = match url {
            None => {
                tracing::warn!(
                    deployment = %deployment_id,
                    region = %region_name,
                    "Region has no health check url"
                );
                false
            }
            Some(url) => match self.probe.probe(url).await {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(
                        deployment = %deployment_id,
                        region = %region_name,
                        url = %url,
                        error = %e,
                        "Health check failed"
                    );
                    false
                }
            },
        };
        metrics::record_region_health(deployment_id, region_name, healthy);
        healthy
    }

    async fn record_health(
        &self,
        deployment_id: &str,
        results: &[RegionHealth],
    ) -> Result<(), FailoverError> {
        let checked_at = Utc::now();
        self.mutate(|set| {
            let deployment = set
                .find_mut(deployment_id)
                .ok_or_else(|| FailoverError::DeploymentNotFound(deployment_id.to_string()))?;
            for result in results {
                if let Some(region) = deployment.region_mut(&result.region_name) {
                    region.record_health(result.is_healthy, checked_at);
                }
            }
            Ok(())
        })
        .await
    }

    /// Locked read-modify-write of the whole document.
    async fn mutate<T, F>(&self, apply: F) -> Result<T, FailoverError>
    where
        F: FnOnce(&mut DeploymentSet) -> Result<T, FailoverError>,
    {
        let _local = self.write_lock.lock().await;
        let _file = self.store.lock().await?;

        let mut set = self.store.load()?;
        let out = apply(&mut set)?;
        self.store.save(&set)?;

        *self.state.write().unwrap_or_else(PoisonError::into_inner) = set;
        Ok(out)
    }

    fn read_state(&self) -> RwLockReadGuard<'_, DeploymentSet> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for FailoverManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailoverManager")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

fn find_region_mut<'a>(
    set: &'a mut DeploymentSet,
    deployment_id: &str,
    region_name: &str,
) -> Result<&'a mut RegionConfig, FailoverError> {
    set.find_mut(deployment_id)
        .ok_or_else(|| FailoverError::DeploymentNotFound(deployment_id.to_string()))?
        .region_mut(region_name)
        .ok_or_else(|| FailoverError::RegionNotFound {
            deployment: deployment_id.to_string(),
            region: region_name.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::probe::ProbeFailure;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::time::Duration;

    /// Healthy iff the url is in the set.
    #[derive(Default)]
    struct StaticProbe {
        healthy: Mutex<HashSet<String>>,
    }

    impl StaticProbe {
        fn set(&self, url: &str, healthy: bool) {
            let mut set = self.healthy.lock().unwrap();
            if healthy {
                set.insert(url.to_string());
            } else {
                set.remove(url);
            }
        }
    }

    #[async_trait]
    impl HealthProbe for StaticProbe {
        async fn probe(&self, url: &str) -> Result<(), ProbeFailure> {
            if self.healthy.lock().unwrap().contains(url) {
                Ok(())
            } else {
                Err(ProbeFailure::Status(503))
            }
        }
    }

    const REGIONS: [&str; 3] = ["us-east-1", "us-west-2", "eu-west-1"];

    fn health_url(region: &str) -> String {
        format!("http://{}.internal/health", region)
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        store: DeploymentStore,
        probe: Arc<StaticProbe>,
        manager: FailoverManager,
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = DeploymentStore::new(dir.path().join("deployments.json"), Duration::from_secs(1));
        let probe = Arc::new(StaticProbe::default());
        let manager = FailoverManager::open(store.clone(), probe.clone()).unwrap();

        manager
            .create_deployment("nba-api", "NBA API", &REGIONS, "us-east-1", FailoverStrategy::ActivePassive)
            .await
            .unwrap();
        for region in REGIONS {
            manager
                .set_region_endpoints(
                    "nba-api",
                    region,
                    Some(format!("https://{}.nba.example", region)),
                    Some(health_url(region)),
                )
                .await
                .unwrap();
        }

        Fixture {
            _dir: dir,
            store,
            probe,
            manager,
        }
    }

    /// us-east-1 ACTIVE, everything healthy.
    async fn serving_fixture() -> Fixture {
        let fx = fixture().await;
        for region in REGIONS {
            fx.probe.set(&health_url(region), true);
        }
        fx.manager.check_deployment_health("nba-api").await.unwrap();
        fx.manager
            .set_region_status("nba-api", "us-east-1", RegionStatus::Active)
            .await
            .unwrap();
        fx
    }

    fn status(fx: &Fixture, region: &str) -> RegionStatus {
        fx.manager
            .get_deployment("nba-api")
            .unwrap()
            .region(region)
            .unwrap()
            .status
    }

    #[tokio::test]
    async fn test_create_persists_and_reloads() {
        let fx = fixture().await;

        let reopened = FailoverManager::open(fx.store.clone(), fx.probe.clone()).unwrap();
        let original = fx.manager.get_deployment("nba-api").unwrap();
        let reloaded = reopened.get_deployment("nba-api").unwrap();
        assert_eq!(original, reloaded);
        assert_eq!(reloaded.primary_region, "us-east-1");
        assert_eq!(reloaded.failover_strategy, FailoverStrategy::ActivePassive);
        assert_eq!(reloaded.region("eu-west-1").unwrap().priority, 3);
    }

    #[tokio::test]
    async fn test_create_rejects_duplicates() {
        let fx = fixture().await;
        let err = fx
            .manager
            .create_deployment("nba-api", "Again", &["us-east-1"], "us-east-1", FailoverStrategy::ActivePassive)
            .await
            .unwrap_err();
        assert!(matches!(err, FailoverError::DeploymentExists(_)));

        let err = fx
            .manager
            .create_deployment("other", "Other", &["a", "b"], "c", FailoverStrategy::ActiveActive)
            .await
            .unwrap_err();
        assert!(matches!(err, FailoverError::InvalidDeployment(_)));
        assert_eq!(fx.manager.list_deployments().len(), 1);
    }

    #[tokio::test]
    async fn test_health_check_stamps_time_regardless_of_outcome() {
        let fx = fixture().await;
        fx.probe.set(&health_url("us-west-2"), true);

        assert!(fx.manager.check_region_health("nba-api", "us-west-2").await);
        assert!(!fx.manager.check_region_health("nba-api", "eu-west-1").await);

        let d = fx.manager.get_deployment("nba-api").unwrap();
        assert!(d.region("us-west-2").unwrap().is_healthy);
        assert!(d.region("us-west-2").unwrap().last_health_check.is_some());
        assert!(!d.region("eu-west-1").unwrap().is_healthy);
        assert!(d.region("eu-west-1").unwrap().last_health_check.is_some());
        assert!(d.region("us-east-1").unwrap().last_health_check.is_none());

        // Persisted, not just cached.
        assert!(fx.store.load().unwrap().find("nba-api").unwrap().region("us-west-2").unwrap().is_healthy);
    }

    #[tokio::test]
    async fn test_health_check_unknown_region_is_false() {
        let fx = fixture().await;
        assert!(!fx.manager.check_region_health("nba-api", "mars-1").await);
        assert!(!fx.manager.check_region_health("missing", "us-east-1").await);
    }

    #[tokio::test]
    async fn test_region_without_url_is_unhealthy() {
        let fx = fixture().await;
        fx.probe.set(&health_url("us-east-1"), true);
        fx.manager
            .set_region_endpoints("nba-api", "us-east-1", None, None)
            .await
            .unwrap();
        assert!(!fx.manager.check_region_health("nba-api", "us-east-1").await);
    }

    #[tokio::test]
    async fn test_get_active_region() {
        let fx = fixture().await;
        assert!(fx.manager.get_active_region("nba-api").is_none());
        assert!(fx.manager.get_active_region("missing").is_none());

        let fx = serving_fixture().await;
        assert_eq!(fx.manager.get_active_region("nba-api").unwrap().region_name, "us-east-1");

        fx.probe.set(&health_url("us-east-1"), false);
        fx.manager.check_region_health("nba-api", "us-east-1").await;
        assert!(fx.manager.get_active_region("nba-api").is_none());
    }

    #[tokio::test]
    async fn test_failover_picks_next_priority() {
        let fx = serving_fixture().await;

        let event = fx.manager.failover("nba-api", None).await.unwrap();
        assert_eq!(event.from_region.as_deref(), Some("us-east-1"));
        assert_eq!(event.to_region, "us-west-2");
        assert!(!event.manual);
        assert_eq!(status(&fx, "us-east-1"), RegionStatus::Inactive);
        assert_eq!(status(&fx, "us-west-2"), RegionStatus::Active);
        assert_eq!(fx.manager.history().len(), 1);
    }

    #[tokio::test]
    async fn test_failover_skips_unhealthy_candidate() {
        let fx = serving_fixture().await;
        fx.probe.set(&health_url("us-west-2"), false);
        fx.manager.check_region_health("nba-api", "us-west-2").await;

        let event = fx.manager.failover("nba-api", None).await.unwrap();
        assert_eq!(event.to_region, "eu-west-1");
        assert_eq!(status(&fx, "us-west-2"), RegionStatus::Inactive);
        assert_eq!(status(&fx, "eu-west-1"), RegionStatus::Active);
    }

    #[tokio::test]
    async fn test_explicit_target_ignores_health() {
        let fx = serving_fixture().await;
        fx.probe.set(&health_url("eu-west-1"), false);
        fx.manager.check_region_health("nba-api", "eu-west-1").await;

        let event = fx.manager.failover("nba-api", Some("eu-west-1")).await.unwrap();
        assert!(event.manual);
        assert_eq!(status(&fx, "eu-west-1"), RegionStatus::Active);
        assert_eq!(status(&fx, "us-east-1"), RegionStatus::Inactive);
        // Active but unhealthy regions are not reported as serving.
        assert!(fx.manager.get_active_region("nba-api").is_none());
    }

    #[tokio::test]
    async fn test_no_healthy_target_leaves_state_untouched() {
        let fx = serving_fixture().await;
        fx.probe.set(&health_url("us-west-2"), false);
        fx.probe.set(&health_url("eu-west-1"), false);
        fx.manager.check_deployment_health("nba-api").await.unwrap();

        let before_disk = fx.store.load().unwrap();
        let before = fx.manager.get_deployment("nba-api").unwrap();

        let err = fx.manager.failover("nba-api", None).await.unwrap_err();
        assert!(matches!(err, FailoverError::NoSuitableTarget(_)));
        assert_eq!(fx.manager.get_deployment("nba-api").unwrap(), before);
        assert_eq!(fx.store.load().unwrap(), before_disk);
        assert!(fx.manager.history().is_empty());
    }

    #[tokio::test]
    async fn test_failover_errors_are_distinct() {
        let fx = serving_fixture().await;
        assert!(matches!(
            fx.manager.failover("missing", None).await,
            Err(FailoverError::DeploymentNotFound(_))
        ));
        assert!(matches!(
            fx.manager.failover("nba-api", Some("mars-1")).await,
            Err(FailoverError::RegionNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_failover_persistence_error() {
        let fx = serving_fixture().await;
        // Hold the store lock so the failover cannot take it.
        let short = DeploymentStore::new(fx.store.path(), Duration::from_millis(50));
        let manager = FailoverManager::open(short.clone(), fx.probe.clone()).unwrap();
        let _held = short.lock().await.unwrap();

        let err = manager.failover("nba-api", None).await.unwrap_err();
        assert!(matches!(err, FailoverError::Persistence(StoreError::LockTimeout { .. })));
        assert_eq!(
            manager.get_deployment("nba-api").unwrap().region("us-east-1").unwrap().status,
            RegionStatus::Active
        );
    }

    #[tokio::test]
    async fn test_mutations_see_other_writers() {
        let fx = serving_fixture().await;
        let other = FailoverManager::open(fx.store.clone(), fx.probe.clone()).unwrap();

        other.failover("nba-api", Some("eu-west-1")).await.unwrap();
        // fx.manager's cache is stale; the next mutation re-reads the file first.
        fx.manager
            .set_region_status("nba-api", "us-west-2", RegionStatus::Degraded)
            .await
            .unwrap();

        assert_eq!(status(&fx, "eu-west-1"), RegionStatus::Active);
        assert_eq!(status(&fx, "us-west-2"), RegionStatus::Degraded);
    }

    #[tokio::test]
    async fn test_update_region_merges_over_latest_file() {
        let fx = fixture().await;
        let other = FailoverManager::open(fx.store.clone(), fx.probe.clone()).unwrap();

        // Another writer moves the endpoint; fx.manager's copy is now stale.
        other
            .set_region_endpoints(
                "nba-api",
                "us-east-1",
                Some("https://moved.nba.example".to_string()),
                Some(health_url("us-east-1")),
            )
            .await
            .unwrap();

        let region = fx
            .manager
            .update_region(
                "nba-api",
                "us-east-1",
                RegionUpdate {
                    status: Some(RegionStatus::Deploying),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(region.status, RegionStatus::Deploying);
        assert_eq!(region.endpoint_url.as_deref(), Some("https://moved.nba.example"));
        assert_eq!(region.health_check_url, Some(health_url("us-east-1")));
    }

    #[tokio::test]
    async fn test_update_region_is_all_or_nothing() {
        let fx = fixture().await;
        let before = fx.store.load().unwrap();

        let err = fx
            .manager
            .update_region(
                "nba-api",
                "mars-1",
                RegionUpdate {
                    endpoint_url: Some("https://mars.example".to_string()),
                    status: Some(RegionStatus::Active),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FailoverError::RegionNotFound { .. }));
        assert_eq!(fx.store.load().unwrap(), before);
    }

    #[tokio::test]
    async fn test_failed_write_leaves_memory_unchanged() {
        let fx = serving_fixture().await;
        let before = fx.manager.get_deployment("nba-api").unwrap();
        let before_disk = fx.store.load().unwrap();

        // The temp file path is occupied by a directory, so the rewrite fails.
        let tmp = fx.store.path().with_file_name("deployments.json.tmp");
        std::fs::create_dir(&tmp).unwrap();

        let err = fx.manager.failover("nba-api", None).await.unwrap_err();
        assert!(matches!(err, FailoverError::Persistence(StoreError::Write { .. })));
        assert_eq!(fx.manager.get_deployment("nba-api").unwrap(), before);
        assert_eq!(fx.store.load().unwrap(), before_disk);
        assert!(fx.manager.history().is_empty());

        // Health results are still reported even though they cannot be stored.
        assert!(fx.manager.check_region_health("nba-api", "us-west-2").await);

        std::fs::remove_dir(&tmp).unwrap();
        let event = fx.manager.failover("nba-api", None).await.unwrap();
        assert_eq!(event.to_region, "us-west-2");
    }

    #[tokio::test]
    async fn test_degraded_is_advisory() {
        let fx = serving_fixture().await;
        fx.manager
            .set_region_status("nba-api", "us-west-2", RegionStatus::Degraded)
            .await
            .unwrap();

        // Still healthy, so still a candidate.
        let event = fx.manager.failover("nba-api", None).await.unwrap();
        assert_eq!(event.to_region, "us-west-2");
    }
}
