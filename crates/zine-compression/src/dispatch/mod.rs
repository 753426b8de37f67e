//! Request dispatch and admission control.
//!
//! ## Structure
//!
//! - [`dispatcher`] - correlation ids, round-robin worker selection and the
//!   pending-request table.
//! - [`admission`] - semaphore + FIFO queue bounding in-flight requests to the
//!   pool size.
//! - [`coordinator`] - the task that owns both and serialises every mutation.

pub mod admission;
pub mod coordinator;
pub mod dispatcher;

#[cfg(test)]
mod tests;

pub use admission::{Admission, AdmissionController, QueuedRequest};
pub use dispatcher::{Dispatched, Dispatcher, Pending, Settle, Settled};

use serde::Serialize;

/// Snapshot of a pool's admission and dispatch state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Number of workers, which is also the admission limit.
    pub pool_size: usize,
    /// Requests sent to a worker and not yet answered.
    pub in_flight: usize,
    /// Requests waiting for a free slot.
    pub queued: usize,
    /// Free slots; always `pool_size - in_flight`.
    pub available_permits: usize,
    /// Requests handed to a worker so far.
    pub dispatched: u64,
    /// Requests settled by a matching response so far.
    pub completed: u64,
    /// Response frames dropped because no request matched their id.
    pub unmatched_responses: u64,
}
