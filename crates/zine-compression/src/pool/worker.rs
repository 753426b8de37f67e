use crate::{
    codec::{Codec, handle_request},
    error::WorkerError,
    rpc::{ControlFrame, RequestFrame, ResponseFrame},
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Worker task serving requests for one slot of the pool.
///
/// A worker starts with nothing but its control channel. It waits for the
/// [`ControlFrame::Init`] carrying its end of the dedicated RPC channel, starts
/// listening on it, and from then on serves [`RequestFrame`]s strictly in the
/// order they arrive, posting exactly one [`ResponseFrame`] per request.
///
/// Codec work runs on Tokio's blocking pool so that a slow codec never stalls
/// the runtime threads driving the dispatcher.
///
/// # Arguments
///
/// - `worker_id`: Position of this worker in the pool (used for logs/tracing).
/// - `control`: Control channel receiving the init frame.
/// - `codec`: Codec shared by every worker in the pool.
/// - `shutdown_token`: Cancelled by the pool manager on shutdown/destroy.
pub async fn worker_loop(
    worker_id: usize,
    mut control: mpsc::UnboundedReceiver<ControlFrame>,
    codec: Arc<dyn Codec>,
    shutdown_token: CancellationToken,
) {
    #[cfg(feature = "tracing")]
    tracing::trace!("Worker {worker_id} started");

    let port = tokio::select! {
        biased;
        () = shutdown_token.cancelled() => {
            #[cfg(feature = "tracing")]
            tracing::debug!("Worker {worker_id} cancelled before init");
            return;
        }
        frame = control.recv() => match frame {
            Some(ControlFrame::Init { port }) => port,
            None => {
                #[cfg(feature = "tracing")]
                tracing::warn!("Worker {worker_id} control channel closed before init");
                return;
            }
        },
    };
    drop(control);

    let (responses, mut requests) = port.start();

    loop {
        tokio::select! {
            biased;
            () = shutdown_token.cancelled() => {
                #[cfg(feature = "tracing")]
                tracing::debug!("Worker {worker_id} shutdown via cancellation token");
                break;
            }
            frame = requests.recv() => {
                let Some(frame) = frame else {
                    #[cfg(feature = "tracing")]
                    tracing::debug!("Worker {worker_id} channel closed");
                    break;
                };

                let response = serve(worker_id, &codec, frame).await;
                if responses.post(response).is_err() {
                    #[cfg(feature = "tracing")]
                    tracing::debug!("Worker {worker_id} failed to post response, dispatcher gone");
                    break;
                }
            }
        }
    }

    #[cfg(feature = "tracing")]
    tracing::trace!("Worker {worker_id} stopped");
}

async fn serve(_worker_id: usize, codec: &Arc<dyn Codec>, frame: RequestFrame) -> ResponseFrame {
    let id = frame.id;

    #[cfg(feature = "tracing")]
    tracing::trace!("Worker {_worker_id} serving request {id} ({})", frame.method);

    let codec = Arc::clone(codec);
    match tokio::task::spawn_blocking(move || handle_request(codec.as_ref(), frame)).await {
        Ok(response) => response,
        Err(e) => {
            #[cfg(feature = "tracing")]
            tracing::error!("Worker {_worker_id} codec task failed for request {id}: {e}");
            ResponseFrame::error(
                id,
                WorkerError::Panicked {
                    context: e.to_string(),
                },
            )
        }
    }
}
