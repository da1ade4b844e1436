//! Multi-region failover subsystem.
//!
//! # Data Flow
//! ```text
//! Health sweep (monitor.rs, or an operator call):
//!     → probe.rs (GET health_check_url, 200 = healthy)
//!     → manager.rs (record is_healthy + last_health_check)
//!     → store.rs (locked rewrite of the deployment document)
//!
//! Failover (manager.rs):
//!     → resolve current active region
//!     → pick target (explicit, or next healthy by priority)
//!     → demote / promote → store.rs → history
//! ```
//!
//! # Design Decisions
//! - The whole deployment set is one JSON document, always rewritten whole
//! - Priority 1 is the primary; lower numbers win
//! - DEGRADED and FAILING are operator markers; selection looks at health only

pub mod manager;
pub mod monitor;
pub mod probe;
pub mod store;
pub mod types;

pub use manager::{FailoverError, FailoverManager, RegionHealth, RegionUpdate};
pub use monitor::HealthMonitor;
pub use probe::{HealthProbe, HttpHealthProbe, ProbeFailure};
pub use store::{DeploymentStore, StoreError};
pub use types::{
    DeploymentSet, FailoverEvent, FailoverStrategy, MultiRegionDeployment, RegionConfig,
    RegionStatus,
};
