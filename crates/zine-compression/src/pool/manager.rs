//! Fixed-size pool of long-lived compression workers.
//!
//! This module defines the [`WorkerPool`] struct, which spawns `pool_size`
//! worker tasks, bootstraps each of them with its own dedicated RPC channel,
//! and owns their lifecycle. The dispatcher-side ends of those channels are
//! handed back to the caller at construction, in worker order.
//!
//! Teardown comes in two flavours:
//!
//! - [`WorkerPool::destroy`] terminates every worker unconditionally. It is
//!   synchronous and idempotent.
//! - [`WorkerPool::shutdown`] cancels the shared [`CancellationToken`] and
//!   waits for each worker to finish the request it is serving and exit.

use super::worker::worker_loop;
use crate::{
    codec::Codec,
    error::{Error, Result},
    rpc::{ControlFrame, DispatcherPort, message_channel},
};
use std::sync::Arc;
use tokio::{runtime::Handle, sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;

/// An ordered, fixed-size set of worker tasks.
///
/// A worker is identified only by its index. The pool tracks no busy/idle
/// state; load distribution is the dispatcher's concern.
pub struct WorkerPool {
    workers: Vec<JoinHandle<()>>,
    size: usize,
    shutdown_token: CancellationToken,
}

impl WorkerPool {
    /// Spawns `pool_size` workers on the current Tokio runtime.
    ///
    /// For every worker a fresh two-way channel is created; one end is sent to
    /// the worker in an init frame over its control channel, the other end is
    /// returned to the caller. The returned ports are not started yet.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] when called outside a Tokio runtime or
    /// with a `pool_size` of zero.
    pub fn create(
        pool_size: usize,
        codec: Arc<dyn Codec>,
    ) -> Result<(Self, Vec<DispatcherPort>)> {
        if pool_size == 0 {
            return Err(Error::InvalidConfig {
                reason: "pool size must be greater than 0".to_string(),
            });
        }

        let runtime = Handle::try_current().map_err(|e| Error::InvalidConfig {
            reason: format!("worker pool must be created inside a Tokio runtime: {e}"),
        })?;

        let shutdown_token = CancellationToken::new();
        let mut workers = Vec::with_capacity(pool_size);
        let mut ports = Vec::with_capacity(pool_size);

        for worker_id in 0..pool_size {
            let (control_tx, control_rx) = mpsc::unbounded_channel();
            let (dispatcher_port, worker_port) = message_channel();

            // The init frame is queued before the task is spawned, so it is the
            // first thing the worker sees.
            control_tx
                .send(ControlFrame::Init { port: worker_port })
                .map_err(|_| Error::ChannelError {
                    context: format!("Worker {worker_id} control channel closed before init"),
                })?;

            workers.push(runtime.spawn(worker_loop(
                worker_id,
                control_rx,
                Arc::clone(&codec),
                shutdown_token.child_token(),
            )));
            ports.push(dispatcher_port);
        }

        #[cfg(feature = "tracing")]
        tracing::debug!("Spawned {pool_size} compression workers");

        Ok((
            Self {
                workers,
                size: pool_size,
                shutdown_token,
            },
            ports,
        ))
    }

    /// Number of workers the pool was created with.
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Token cancelled when the pool is destroyed or shut down.
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown_token
    }

    /// Whether the pool has reached its terminal state.
    pub fn is_destroyed(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    /// Terminates every worker unconditionally.
    ///
    /// Requests a worker is currently serving are abandoned. Calling this more
    /// than once is a no-op.
    pub fn destroy(&self) {
        if self.shutdown_token.is_cancelled() {
            return;
        }

        self.shutdown_token.cancel();
        for worker in &self.workers {
            worker.abort();
        }

        #[cfg(feature = "tracing")]
        tracing::info!("Worker pool destroyed ({} workers terminated)", self.size);
    }

    /// Gracefully stops every worker.
    ///
    /// - Cancels the shared [`CancellationToken`] so no worker picks up another
    ///   request.
    /// - Waits for each worker task to exit. A worker in the middle of a codec
    ///   call finishes it first.
    pub async fn shutdown(&mut self) {
        #[cfg(feature = "tracing")]
        tracing::debug!("Notifying all workers to shut down");
        self.shutdown_token.cancel();

        let workers = core::mem::take(&mut self.workers);
        for (_i, result) in futures::future::join_all(workers)
            .await
            .into_iter()
            .enumerate()
        {
            match result {
                Ok(()) => {
                    #[cfg(feature = "tracing")]
                    tracing::trace!("Worker {_i} shutdown acknowledged");
                }
                Err(_e) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!("Worker {_i} did not stop cleanly: {_e}");
                }
            }
        }

        #[cfg(feature = "tracing")]
        tracing::info!("Worker pool shutdown complete");
    }
}
