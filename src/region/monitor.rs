//! Periodic region health checking.
//!
//! # Responsibilities
//! - Probe every region of every deployment on a fixed interval
//! - Fail over deployments whose serving region went unhealthy
//!
//! Auto-failover only fires for deployments with `auto_failover` set that
//! already have an ACTIVE region. A fresh deployment is never activated here.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time;

use crate::region::manager::{FailoverError, FailoverManager};

pub struct HealthMonitor {
    manager: Arc<FailoverManager>,
    interval: Duration,
}

impl HealthMonitor {
    pub fn new(manager: Arc<FailoverManager>, interval: Duration) -> Self {
        Self { manager, interval }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            "Region health monitor starting"
        );

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check_all().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Region health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// One full sweep.
    pub async fn check_all(&self) {
        for deployment in self.manager.list_deployments() {
            let id = deployment.deployment_id.as_str();
            if let Err(e) = self.manager.check_deployment_health(id).await {
                // Deleted out from under us by another process.
                tracing::warn!(deployment = %id, error = %e, "Skipping health sweep");
                continue;
            }

            let Some(current) = self.manager.get_deployment(id) else {
                continue;
            };
            if !current.auto_failover
                || !current.has_active_status()
                || current.active_region().is_some()
            {
                continue;
            }

            tracing::warn!(deployment = %id, "Active region unhealthy, attempting automatic failover");
            match self.manager.failover(id, None).await {
                Ok(_) => {}
                // Already logged and counted by the manager.
                Err(FailoverError::NoSuitableTarget(_)) => {}
                Err(e) => {
                    tracing::error!(deployment = %id, error = %e, "Automatic failover failed");
                }
            }
        }
    }
}
