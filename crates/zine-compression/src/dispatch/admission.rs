//! Admission control: a counting semaphore sized to the pool plus a FIFO
//! overflow queue in front of the [`Dispatcher`].

use super::{
    PoolStats,
    dispatcher::{Dispatched, Dispatcher, Settle, Settled},
};
use crate::{
    rpc::{Args, CorrelationId, Method, ResponseFrame, TransferList},
    telemetry::{decrement_requests_queued, increment_requests, increment_requests_queued},
};
use std::collections::VecDeque;

/// A request waiting for a free slot.
#[derive(Debug)]
pub struct QueuedRequest {
    pub method: Method,
    pub args: Args,
    pub transfer: TransferList,
    pub settle: Settle,
}

/// What happened to a submitted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// A slot was free and the request went straight to `worker`.
    Dispatched { id: CorrelationId, worker: usize },
    /// No slot was free; the request sits at the back of a queue of `depth`.
    Queued { depth: usize },
    /// A slot was free but the worker's channel was closed; the request has
    /// already been rejected.
    Failed { worker: usize },
}

/// Bounds the number of in-flight requests to the pool size.
///
/// Invariant: `pool_size - permits == dispatcher.in_flight()`, and the queue
/// is only non-empty while `permits == 0`.
#[derive(Debug)]
pub struct AdmissionController {
    dispatcher: Dispatcher,
    permits: usize,
    queue: VecDeque<QueuedRequest>,
    dispatched: u64,
    completed: u64,
    unmatched: u64,
}

impl AdmissionController {
    pub fn new(dispatcher: Dispatcher) -> Self {
        let permits = dispatcher.pool_size();
        Self {
            dispatcher,
            permits,
            queue: VecDeque::new(),
            dispatched: 0,
            completed: 0,
            unmatched: 0,
        }
    }

    /// Admits a new request: dispatches it now if a slot is free, otherwise
    /// appends it to the overflow queue.
    pub fn submit(&mut self, request: QueuedRequest) -> Admission {
        increment_requests();

        if self.permits == 0 {
            self.queue.push_back(request);
            increment_requests_queued();

            #[cfg(feature = "tracing")]
            tracing::trace!("All workers busy, request queued (depth {})", self.queue.len());

            return Admission::Queued {
                depth: self.queue.len(),
            };
        }

        self.permits -= 1;
        match self.dispatcher.dispatch_request(request) {
            Dispatched::Sent { id, worker } => {
                self.dispatched += 1;
                Admission::Dispatched { id, worker }
            }
            Dispatched::Failed { worker } => {
                self.release();
                Admission::Failed { worker }
            }
        }
    }

    /// Routes a response frame and, if it completed a request, frees its slot
    /// for the oldest queued request.
    pub fn on_response(&mut self, frame: ResponseFrame) -> Settled {
        let settled = self.dispatcher.settle(frame);
        match settled {
            Settled::Matched { .. } => {
                self.completed += 1;
                self.release();
            }
            Settled::Unmatched => self.unmatched += 1,
        }
        settled
    }

    /// Returns a slot and drains the queue into every free slot, oldest first.
    fn release(&mut self) {
        self.permits += 1;

        while self.permits > 0 {
            let Some(next) = self.queue.pop_front() else {
                break;
            };
            decrement_requests_queued();

            self.permits -= 1;
            match self.dispatcher.dispatch_request(next) {
                Dispatched::Sent { .. } => self.dispatched += 1,
                Dispatched::Failed { .. } => self.permits += 1,
            }
        }
    }

    /// Free slots.
    pub const fn permits(&self) -> usize {
        self.permits
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn in_flight(&self) -> usize {
        self.dispatcher.in_flight()
    }

    /// No request is in flight or queued.
    pub fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.dispatcher.in_flight() == 0
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            pool_size: self.dispatcher.pool_size(),
            in_flight: self.dispatcher.in_flight(),
            queued: self.queue.len(),
            available_permits: self.permits,
            dispatched: self.dispatched,
            completed: self.completed,
            unmatched_responses: self.unmatched,
        }
    }
}
