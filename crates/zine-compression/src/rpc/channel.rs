//! Dedicated two-way message channel between the dispatcher and one worker.
//!
//! [`message_channel`] creates a pair of entangled [`MessagePort`]s. Each port
//! can post immediately, but frames addressed to it are only observable once
//! it has been [started](MessagePort::start); until then they are buffered.
//! Starting is a separate lifecycle step from creation so that one end can be
//! handed to a worker (inside an init frame) before either side listens.

use core::pin::Pin;
use core::task::{Context, Poll};
use futures::{FutureExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// One endpoint of a two-way channel: posts `Out` frames, receives `In`
/// frames.
#[derive(Debug)]
pub struct MessagePort<Out, In> {
    tx: mpsc::UnboundedSender<Out>,
    rx: mpsc::UnboundedReceiver<In>,
}

/// Creates a fresh pair of entangled ports.
///
/// Frames posted on the first port are received on the second and vice versa.
/// Per-port delivery order is the order of posting.
pub fn message_channel<A, B>() -> (MessagePort<A, B>, MessagePort<B, A>) {
    let (a_tx, a_rx) = mpsc::unbounded_channel();
    let (b_tx, b_rx) = mpsc::unbounded_channel();
    (
        MessagePort { tx: a_tx, rx: b_rx },
        MessagePort { tx: b_tx, rx: a_rx },
    )
}

impl<Out, In> MessagePort<Out, In> {
    /// Activates the listener, splitting the port into its sending half and a
    /// stream of incoming frames.
    pub fn start(self) -> (PortSender<Out>, PortListener<In>) {
        (
            PortSender { tx: self.tx },
            PortListener {
                inner: UnboundedReceiverStream::new(self.rx),
            },
        )
    }
}

/// Sending half of a started [`MessagePort`].
#[derive(Debug)]
pub struct PortSender<T> {
    tx: mpsc::UnboundedSender<T>,
}

impl<T> Clone for PortSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> PortSender<T> {
    /// Posts a frame without waiting.
    ///
    /// Ownership of the frame, and of any buffers it carries, moves to the
    /// receiving side. If the peer has gone away the frame is handed back.
    pub fn post(&self, frame: T) -> Result<(), T> {
        self.tx.send(frame).map_err(|e| e.0)
    }
}

/// Receiving half of a started [`MessagePort`].
///
/// Ends once every sender on the peer side has been dropped.
#[derive(Debug)]
pub struct PortListener<T> {
    inner: UnboundedReceiverStream<T>,
}

impl<T> PortListener<T> {
    pub async fn recv(&mut self) -> Option<T> {
        self.inner.next().await
    }

    /// Returns a frame if one is already buffered.
    pub fn try_recv(&mut self) -> Option<T> {
        self.inner.next().now_or_never().flatten()
    }
}

impl<T> Stream for PortListener<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frames_buffer_until_started() {
        let (left, right) = message_channel::<u32, &'static str>();
        let (left_tx, mut left_rx) = left.start();

        left_tx.post(1).unwrap();
        left_tx.post(2).unwrap();

        let (right_tx, mut right_rx) = right.start();
        assert_eq!(right_rx.next().await, Some(1));
        assert_eq!(right_rx.recv().await, Some(2));

        right_tx.post("pong").unwrap();
        assert_eq!(left_rx.next().await, Some("pong"));
    }

    #[tokio::test]
    async fn post_hands_back_frame_when_peer_is_gone() {
        let (left, right) = message_channel::<u32, u32>();
        let (tx, _rx) = left.start();
        drop(right);

        assert_eq!(tx.post(7), Err(7));
    }
}
