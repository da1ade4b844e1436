//! Resilience and availability control plane.
//!
//! Three independent components, composed by [`plane::ControlPlane`]:
//! - per-dependency circuit breakers (`resilience`)
//! - sliding-window rate limiting (`security`)
//! - multi-region failover with health probing (`region`)

pub mod admin;
pub mod config;
pub mod lifecycle;
pub mod observability;
pub mod plane;
pub mod region;
pub mod resilience;
pub mod security;

pub use config::schema::PlaneConfig;
pub use lifecycle::Shutdown;
pub use plane::ControlPlane;
