//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming admin request:
//!     → rate_limit.rs (per-IP sliding window)
//!     → admin/auth.rs (bearer token)
//!     → handler
//! ```
//!
//! The limiter itself is transport-agnostic; the host service calls
//! `RateLimiter::is_allowed` with its own keys and policies.

pub mod rate_limit;

pub use rate_limit::{
    InMemoryWindowStore, RateLimitError, RateLimitPolicy, RateLimiter, SlidingWindowStore,
};
