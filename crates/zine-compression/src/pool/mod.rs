//! Worker pool management.
//!
//! - [`manager`] - spawns, bootstraps and tears down the workers.
//! - [`worker`] - the per-worker request loop.

pub mod manager;
pub mod worker;

pub use manager::WorkerPool;
