//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to a flaky dependency:
//!     → registry.rs (look up or lazily create the breaker for that dependency)
//!     → circuit_breaker.rs (fail fast if open, otherwise run and record the outcome)
//! ```
//!
//! # Design Decisions
//! - Per-dependency circuit breaker (not global)
//! - No internal retries; retry policy belongs to the caller
//! - Callers time out the operations they pass in

pub mod circuit_breaker;
pub mod registry;

pub use circuit_breaker::{BreakerError, BreakerSnapshot, CircuitBreaker, CircuitState};
pub use registry::BreakerRegistry;
