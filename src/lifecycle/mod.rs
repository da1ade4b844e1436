//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     Ctrl+C → Shutdown::trigger → monitor loop exits
//!                               → admin server drains and stops
//! ```

pub mod shutdown;

pub use shutdown::Shutdown;
