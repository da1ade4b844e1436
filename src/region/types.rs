//! Deployment and region records.
//!
//! These types are the persisted document format; field and variant names
//! match the JSON written by [`DeploymentStore`](crate::region::store::DeploymentStore).

use std::collections::HashSet;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Region lifecycle status.
///
/// `Degraded` and `Failing` are advisory markers set by operators; no
/// operation moves a region into or out of them automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegionStatus {
    Inactive,
    Deploying,
    Active,
    Degraded,
    Failing,
}

impl FromStr for RegionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "inactive" => Ok(Self::Inactive),
            "deploying" => Ok(Self::Deploying),
            "active" => Ok(Self::Active),
            "degraded" => Ok(Self::Degraded),
            "failing" => Ok(Self::Failing),
            other => Err(format!("unknown region status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailoverStrategy {
    ActivePassive,
    ActiveActive,
    NearestRegion,
}

impl FromStr for FailoverStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "active-passive" => Ok(Self::ActivePassive),
            "active-active" => Ok(Self::ActiveActive),
            "nearest-region" => Ok(Self::NearestRegion),
            other => Err(format!("unknown failover strategy '{}'", other)),
        }
    }
}

/// One candidate region of a deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionConfig {
    pub region_name: String,
    /// 1 = primary; larger numbers are lower priority.
    pub priority: u32,
    pub status: RegionStatus,
    #[serde(default)]
    pub endpoint_url: Option<String>,
    #[serde(default)]
    pub health_check_url: Option<String>,
    #[serde(default)]
    pub last_health_check: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_healthy: bool,
}

impl RegionConfig {
    pub fn new(region_name: impl Into<String>, priority: u32) -> Self {
        Self {
            region_name: region_name.into(),
            priority,
            status: RegionStatus::Inactive,
            endpoint_url: None,
            health_check_url: None,
            last_health_check: None,
            is_healthy: false,
        }
    }

    /// Record a health probe outcome.
    pub fn record_health(&mut self, healthy: bool, at: DateTime<Utc>) {
        self.is_healthy = healthy;
        self.last_health_check = Some(at);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiRegionDeployment {
    pub deployment_id: String,
    pub name: String,
    pub regions: Vec<RegionConfig>,
    pub failover_strategy: FailoverStrategy,
    pub primary_region: String,
    #[serde(default)]
    pub replication_enabled: bool,
    #[serde(default)]
    pub auto_failover: bool,
}

impl MultiRegionDeployment {
    /// Build a deployment with every region inactive.
    ///
    /// The primary gets priority 1; the rest get 2, 3, ... in input order.
    pub fn new(
        deployment_id: &str,
        name: &str,
        region_names: &[&str],
        primary_region: &str,
        strategy: FailoverStrategy,
    ) -> Result<Self, String> {
        if deployment_id.trim().is_empty() {
            return Err("deployment id must not be empty".to_string());
        }
        if region_names.is_empty() {
            return Err("at least one region is required".to_string());
        }
        let mut seen = HashSet::new();
        for region in region_names {
            if region.trim().is_empty() {
                return Err("region names must not be empty".to_string());
            }
            if !seen.insert(*region) {
                return Err(format!("region '{}' is listed twice", region));
            }
        }
        if !seen.contains(primary_region) {
            return Err(format!(
                "primary region '{}' is not one of the deployment's regions",
                primary_region
            ));
        }

        let mut next_priority = 2;
        let regions = region_names
            .iter()
            .map(|&region| {
                if region == primary_region {
                    RegionConfig::new(region, 1)
                } else {
                    let priority = next_priority;
                    next_priority += 1;
                    RegionConfig::new(region, priority)
                }
            })
            .collect();

        Ok(Self {
            deployment_id: deployment_id.to_string(),
            name: name.to_string(),
            regions,
            failover_strategy: strategy,
            primary_region: primary_region.to_string(),
            replication_enabled: true,
            auto_failover: true,
        })
    }

    pub fn region(&self, region_name: &str) -> Option<&RegionConfig> {
        self.regions.iter().find(|r| r.region_name == region_name)
    }

    pub fn region_mut(&mut self, region_name: &str) -> Option<&mut RegionConfig> {
        self.regions.iter_mut().find(|r| r.region_name == region_name)
    }

    /// The highest-priority region that is both ACTIVE and healthy.
    pub fn active_region(&self) -> Option<&RegionConfig> {
        self.regions
            .iter()
            .filter(|r| r.status == RegionStatus::Active && r.is_healthy)
            .min_by_key(|r| r.priority)
    }

    /// The highest-priority healthy region other than `exclude`.
    pub fn failover_candidate(&self, exclude: Option<&str>) -> Option<&RegionConfig> {
        self.regions
            .iter()
            .filter(|r| r.is_healthy && Some(r.region_name.as_str()) != exclude)
            .min_by_key(|r| r.priority)
    }

    /// Make `target` the ACTIVE region.
    ///
    /// `previous` (the serving region before the switch) is always demoted.
    /// Outside active-active, every other ACTIVE region is demoted too, so a
    /// stale ACTIVE region that had gone unhealthy does not linger.
    /// Returns false if `target` is not a region of this deployment.
    pub fn activate(&mut self, target: &str, previous: Option<&str>) -> bool {
        if self.region(target).is_none() {
            return false;
        }
        let demote_all = self.failover_strategy != FailoverStrategy::ActiveActive;

        for region in &mut self.regions {
            if region.region_name == target {
                region.status = RegionStatus::Active;
            } else if Some(region.region_name.as_str()) == previous
                || (demote_all && region.status == RegionStatus::Active)
            {
                region.status = RegionStatus::Inactive;
            }
        }
        true
    }

    /// True if some region is marked ACTIVE, healthy or not.
    pub fn has_active_status(&self) -> bool {
        self.regions.iter().any(|r| r.status == RegionStatus::Active)
    }
}

/// The whole persisted document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentSet {
    #[serde(default)]
    pub deployments: Vec<MultiRegionDeployment>,
}

impl DeploymentSet {
    pub fn find(&self, deployment_id: &str) -> Option<&MultiRegionDeployment> {
        self.deployments
            .iter()
            .find(|d| d.deployment_id == deployment_id)
    }

    pub fn find_mut(&mut self, deployment_id: &str) -> Option<&mut MultiRegionDeployment> {
        self.deployments
            .iter_mut()
            .find(|d| d.deployment_id == deployment_id)
    }
}

/// Record of one successful failover.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailoverEvent {
    pub id: String,
    pub deployment_id: String,
    pub from_region: Option<String>,
    pub to_region: String,
    /// True when an operator named the target explicitly.
    pub manual: bool,
    pub timestamp: DateTime<Utc>,
}

impl FailoverEvent {
    pub fn new(deployment_id: &str, from_region: Option<String>, to_region: String, manual: bool) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            deployment_id: deployment_id.to_string(),
            from_region,
            to_region,
            manual,
            timestamp: Utc::now(),
        }
    }
}
