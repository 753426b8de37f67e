//! Correlation-based request dispatch over the workers' RPC channels.

use super::admission::QueuedRequest;
use crate::{
    error::{Error, Result},
    rpc::{
        Args, CorrelationId, CorrelationIds, Method, Payload, PortSender, RequestFrame,
        ResponseFrame, TransferList,
    },
    telemetry::{
        decrement_requests_inflight, increment_request_errors, increment_requests_inflight,
        increment_unmatched_responses, record_request_duration,
    },
};
use core::pin::Pin;
use core::task::{Context, Poll};
use std::{collections::HashMap, time::Instant};
use tokio::sync::oneshot;

/// Settle handle of a request: fulfilled with the payload or rejected with an
/// error, exactly once.
pub type Settle = oneshot::Sender<Result<Payload>>;

/// Caller-side handle of a request that has been dispatched or queued.
///
/// Resolves when the matching response frame arrives. If the pool goes away
/// first, the settle handle is dropped and this resolves to
/// [`Error::PoolDestroyed`].
#[derive(Debug)]
pub struct Pending {
    rx: oneshot::Receiver<Result<Payload>>,
}

impl Pending {
    /// Creates a settle handle and the future it will resolve.
    pub fn channel() -> (Settle, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rx })
    }
}

impl Future for Pending {
    type Output = Result<Payload>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|settled| settled.unwrap_or(Err(Error::PoolDestroyed)))
    }
}

/// A request awaiting its response frame.
#[derive(Debug)]
struct PendingRequest {
    settle: Settle,
    worker: usize,
    dispatched_at: Instant,
}

/// Result of handing a request to a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    /// The request frame was posted; a response is now awaited.
    Sent { id: CorrelationId, worker: usize },
    /// The worker's channel was closed. The request has already been rejected
    /// with [`Error::ChannelError`] and nothing is pending for it.
    Failed { worker: usize },
}

/// Outcome of routing a response frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settled {
    /// The frame settled the request dispatched to `worker`.
    Matched { worker: usize },
    /// No pending request carries this id; the frame was dropped.
    Unmatched,
}

/// Sends requests to workers in round-robin order and matches responses back
/// to their callers.
///
/// The cursor advances on every dispatch regardless of worker load or
/// response latency, so dispatch order is deterministic while completion order
/// is not.
#[derive(Debug)]
pub struct Dispatcher {
    workers: Vec<PortSender<RequestFrame>>,
    cursor: usize,
    ids: CorrelationIds,
    pending: HashMap<CorrelationId, PendingRequest>,
}

impl Dispatcher {
    /// Creates a dispatcher over the started sending halves of every worker's
    /// RPC channel, in worker order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `workers` is empty.
    pub fn new(workers: Vec<PortSender<RequestFrame>>) -> Result<Self> {
        if workers.is_empty() {
            return Err(Error::InvalidConfig {
                reason: "dispatcher needs at least one worker".to_string(),
            });
        }

        let capacity = workers.len();
        Ok(Self {
            workers,
            cursor: 0,
            ids: CorrelationIds::new(),
            pending: HashMap::with_capacity(capacity),
        })
    }

    pub fn pool_size(&self) -> usize {
        self.workers.len()
    }

    /// Index of the worker that will receive the next request.
    pub const fn cursor(&self) -> usize {
        self.cursor
    }

    /// Number of requests sent and not yet settled.
    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }

    /// Dispatches a request and returns the future of its result.
    pub fn dispatch(
        &mut self,
        method: Method,
        args: Args,
        transfer: TransferList,
    ) -> (Dispatched, Pending) {
        let (settle, pending) = Pending::channel();
        let dispatched = self.dispatch_request(QueuedRequest {
            method,
            args,
            transfer,
            settle,
        });
        (dispatched, pending)
    }

    /// Dispatches a request whose settle handle already exists.
    ///
    /// Generates a fresh correlation id, registers the pending entry, posts the
    /// frame to the worker under the cursor (moving the transfer list with it)
    /// and advances the cursor.
    pub fn dispatch_request(&mut self, request: QueuedRequest) -> Dispatched {
        let QueuedRequest {
            method,
            args,
            transfer,
            settle,
        } = request;

        let id = self.ids.next_id();
        let worker = self.cursor;
        self.cursor = (self.cursor + 1) % self.workers.len();

        let frame = RequestFrame {
            id,
            method,
            args,
            transfer,
        };

        match self.workers[worker].post(frame) {
            Ok(()) => {
                self.pending.insert(
                    id,
                    PendingRequest {
                        settle,
                        worker,
                        dispatched_at: Instant::now(),
                    },
                );
                increment_requests_inflight();

                #[cfg(feature = "tracing")]
                tracing::trace!("Request {id} dispatched to worker {worker}");

                Dispatched::Sent { id, worker }
            }
            Err(_frame) => {
                #[cfg(feature = "tracing")]
                tracing::warn!("Worker {worker} channel closed, rejecting request {id}");

                increment_request_errors();
                let _ = settle.send(Err(Error::ChannelError {
                    context: format!("Worker {worker} channel closed"),
                }));
                Dispatched::Failed { worker }
            }
        }
    }

    /// Routes a response frame to the request it answers.
    ///
    /// A frame whose id matches nothing (already settled, or never sent) is
    /// logged and dropped; it never disturbs other pending requests.
    pub fn settle(&mut self, frame: ResponseFrame) -> Settled {
        let ResponseFrame { id, outcome } = frame;

        let Some(pending) = self.pending.remove(&id) else {
            #[cfg(feature = "tracing")]
            tracing::warn!("No pending request for response id {id}, dropping frame");
            increment_unmatched_responses();
            return Settled::Unmatched;
        };

        decrement_requests_inflight();
        record_request_duration(pending.dispatched_at.elapsed().as_secs_f64() * 1000.0);

        let outcome = outcome.map_err(|e| {
            #[cfg(feature = "tracing")]
            tracing::debug!("Request {id} failed on worker {}: {e}", pending.worker);
            increment_request_errors();
            Error::Operation(e)
        });

        if pending.settle.send(outcome).is_err() {
            #[cfg(feature = "tracing")]
            tracing::trace!("Caller of request {id} is gone, result discarded");
        }

        Settled::Matched {
            worker: pending.worker,
        }
    }
}
