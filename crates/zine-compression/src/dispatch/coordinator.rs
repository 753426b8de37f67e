use super::{PoolStats, admission::AdmissionController, admission::QueuedRequest};
use crate::{
    error::Error,
    rpc::{PortListener, ResponseFrame},
};
use futures::StreamExt;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// A message sent from a [`CompressionClient`] to the coordinator task.
///
/// [`CompressionClient`]: crate::CompressionClient
#[derive(Debug)]
pub enum Command {
    /// Admit a request.
    Request(QueuedRequest),

    /// Report a snapshot of the admission and dispatch state.
    Stats { reply: oneshot::Sender<PoolStats> },

    /// Stop admitting requests and reply once nothing is in flight or queued.
    Drain { reply: oneshot::Sender<()> },
}

/// Coordinator task owning all dispatch state.
///
/// The cursor, pending table, permit counter and overflow queue live in the
/// [`AdmissionController`] owned by this task and are only ever touched from
/// here, one message at a time, so none of them needs a lock.
///
/// The loop multiplexes caller commands, response frames from every started
/// worker listener and the pool's shutdown token, with shutdown taking
/// priority. When it exits, the controller is dropped together with every
/// pending and queued settle handle, which rejects those callers with
/// [`Error::PoolDestroyed`].
pub async fn dispatch_loop(
    mut controller: AdmissionController,
    mut commands: mpsc::UnboundedReceiver<Command>,
    listeners: Vec<PortListener<ResponseFrame>>,
    shutdown_token: CancellationToken,
) {
    #[cfg(feature = "tracing")]
    tracing::trace!("Coordinator started for {} workers", listeners.len());

    let mut responses = futures::stream::select_all(listeners);
    let mut accepting = true;
    let mut drain_waiters: Vec<oneshot::Sender<()>> = Vec::new();

    loop {
        tokio::select! {
            biased;
            () = shutdown_token.cancelled() => {
                #[cfg(feature = "tracing")]
                tracing::debug!("Coordinator stopping, rejecting {} in flight and {} queued",
                    controller.in_flight(), controller.queued());
                break;
            }
            Some(frame) = responses.next() => {
                controller.on_response(frame);
                if !accepting && controller.is_idle() {
                    for waiter in drain_waiters.drain(..) {
                        let _ = waiter.send(());
                    }
                }
            }
            command = commands.recv() => match command {
                Some(Command::Request(request)) => {
                    if accepting {
                        controller.submit(request);
                    } else {
                        let _ = request.settle.send(Err(Error::ServiceShutdown));
                    }
                }
                Some(Command::Stats { reply }) => {
                    let _ = reply.send(controller.stats());
                }
                Some(Command::Drain { reply }) => {
                    accepting = false;
                    if controller.is_idle() {
                        let _ = reply.send(());
                    } else {
                        drain_waiters.push(reply);
                    }
                }
                None => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!("All clients dropped, coordinator stopping");
                    break;
                }
            },
        }
    }

    #[cfg(feature = "tracing")]
    tracing::trace!("Coordinator stopped");
}
