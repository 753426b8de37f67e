//! Public entry point: a pool of compression workers behind admission control.
//!
//! This module defines [`CompressionClient`], which owns a [`WorkerPool`] and
//! the coordinator task that dispatches requests to it. At most `pool_size`
//! requests are in flight at any instant; the rest wait in FIFO order and are
//! promoted as slots free.
//!
//! ## Responsibilities
//!
//! - Spawn the workers and start every dispatcher-side RPC listener.
//! - Forward requests to the coordinator in call order.
//! - Expose `compress`/`decompress` conveniences over the generic `request`.
//! - Tear the pool down, either unconditionally or after draining.

use crate::{
    codec::{Codec, CompressionKind, Operation, codec_args},
    config::PoolConfig,
    dispatch::{
        AdmissionController, Dispatcher, Pending, PoolStats, QueuedRequest,
        coordinator::{Command, dispatch_loop},
    },
    error::{Error, Result},
    pool::WorkerPool,
    rpc::{Args, MessagePort, Method, Payload, TransferList},
};
use bytes::BytesMut;
use std::sync::Arc;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};

/// Bounded-concurrency client for a pool of compression workers.
///
/// Dropping the client destroys the pool.
pub struct CompressionClient {
    pool: WorkerPool,
    commands: mpsc::UnboundedSender<Command>,
    coordinator: Option<JoinHandle<()>>,
}

impl CompressionClient {
    /// Creates a pool of `config.pool_size()` workers running `codec`.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] when no Tokio runtime is available.
    pub fn new<C: Codec>(config: PoolConfig, codec: C) -> Result<Self> {
        Self::with_shared_codec(config, Arc::new(codec))
    }

    /// Like [`CompressionClient::new`], for a codec that is already shared.
    pub fn with_shared_codec(config: PoolConfig, codec: Arc<dyn Codec>) -> Result<Self> {
        let (pool, ports) = WorkerPool::create(config.pool_size(), codec)?;

        let (senders, listeners): (Vec<_>, Vec<_>) =
            ports.into_iter().map(MessagePort::start).unzip();
        let controller = AdmissionController::new(Dispatcher::new(senders)?);

        let (commands, command_rx) = mpsc::unbounded_channel();
        let coordinator = tokio::spawn(dispatch_loop(
            controller,
            command_rx,
            listeners,
            pool.shutdown_token().child_token(),
        ));

        #[cfg(feature = "tracing")]
        tracing::info!("Compression pool started with {} workers", pool.size());

        Ok(Self {
            pool,
            commands,
            coordinator: Some(coordinator),
        })
    }

    pub const fn pool_size(&self) -> usize {
        self.pool.size()
    }

    pub fn is_destroyed(&self) -> bool {
        self.pool.is_destroyed()
    }

    /// Submits a request and returns the future of its result.
    ///
    /// Admission happens at call time, not when the future is first polled, so
    /// queued requests are served in the order `request` was called. Buffers in
    /// `transfer` move to the worker.
    ///
    /// The future resolves to [`Error::Operation`] when the worker rejects the
    /// request, and to [`Error::PoolDestroyed`] if the pool is (or gets)
    /// destroyed before a response arrives.
    pub fn request(
        &self,
        method: impl Into<Method>,
        args: Args,
        transfer: TransferList,
    ) -> Pending {
        let (settle, pending) = Pending::channel();
        if self.pool.is_destroyed() {
            // Dropping the settle handle rejects with `PoolDestroyed`.
            return pending;
        }

        // If the coordinator is gone the request comes back inside the send
        // error and is dropped with it, rejecting with `PoolDestroyed`.
        let _ = self.commands.send(Command::Request(QueuedRequest {
            method: method.into(),
            args,
            transfer,
            settle,
        }));
        pending
    }

    /// Compresses `value` as `kind` on the next free worker.
    pub fn compress(
        &self,
        kind: CompressionKind,
        value: BytesMut,
    ) -> impl Future<Output = Result<BytesMut>> + use<> {
        let pending = self.request(Operation::Compress, codec_args(kind), vec![value]);
        async move { first_buffer(pending.await?) }
    }

    /// Decompresses `value` as `kind` on the next free worker.
    pub fn decompress(
        &self,
        kind: CompressionKind,
        value: BytesMut,
    ) -> impl Future<Output = Result<BytesMut>> + use<> {
        let pending = self.request(Operation::Decompress, codec_args(kind), vec![value]);
        async move { first_buffer(pending.await?) }
    }

    /// Snapshot of the admission and dispatch state.
    pub async fn stats(&self) -> Result<PoolStats> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Stats { reply })
            .map_err(|_| Error::PoolDestroyed)?;
        rx.await.map_err(|_| Error::PoolDestroyed)
    }

    /// Terminates every worker and the coordinator immediately.
    ///
    /// Outstanding and queued requests resolve to [`Error::PoolDestroyed`], as
    /// does every request issued afterwards. Idempotent.
    pub fn destroy(&self) {
        self.pool.destroy();
    }

    /// Gracefully shuts the pool down.
    ///
    /// - Stops admitting requests; new ones fail with
    ///   [`Error::ServiceShutdown`].
    /// - Waits until nothing is in flight or queued.
    /// - Stops every worker and waits for them to exit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PoolDestroyed`] if the pool was destroyed before or
    /// during the drain.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    pub async fn shutdown(&mut self) -> Result<()> {
        if self.pool.is_destroyed() {
            return Err(Error::PoolDestroyed);
        }

        #[cfg(feature = "tracing")]
        tracing::info!("Refusing new requests, draining in-flight work");

        let (reply, drained) = oneshot::channel();
        self.commands
            .send(Command::Drain { reply })
            .map_err(|_| Error::PoolDestroyed)?;
        drained.await.map_err(|_| Error::PoolDestroyed)?;

        self.pool.shutdown().await;
        if let Some(coordinator) = self.coordinator.take() {
            if let Err(_e) = coordinator.await {
                #[cfg(feature = "tracing")]
                tracing::warn!("Coordinator did not stop cleanly: {_e}");
            }
        }

        Ok(())
    }
}

impl Drop for CompressionClient {
    fn drop(&mut self) {
        self.pool.destroy();
    }
}

fn first_buffer(payload: Payload) -> Result<BytesMut> {
    payload
        .buffers
        .into_iter()
        .next()
        .ok_or_else(|| Error::ChannelError {
            context: "worker reply carried no buffer".to_string(),
        })
}
