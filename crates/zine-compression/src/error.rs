//! Error types for the compression worker pool.
//!
//! Two layers of errors exist:
//!
//! - [`WorkerError`] is produced inside a worker and travels back to the caller
//!   inside a response frame. It covers everything the worker can reject: an
//!   unrecognised operation, an unrecognised compression kind, malformed
//!   arguments, or a codec failure.
//! - [`Error`] is what a caller of [`CompressionClient`] observes. A worker
//!   failure surfaces as [`Error::Operation`]; the remaining variants describe
//!   the pool itself (destroyed, shutting down, misconfigured).
//!
//! Responses whose correlation id matches nothing are not errors at all; the
//! dispatcher logs and counts them and keeps going.
//!
//! [`CompressionClient`]: crate::CompressionClient

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type returned to callers of the pool.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// The worker handling this request reported a failure.
    #[error("Operation failed: {0}")]
    Operation(#[from] WorkerError),

    /// The pool was destroyed before (or while) this request was served.
    #[error("Worker pool has been destroyed")]
    PoolDestroyed,

    /// The pool is draining for a graceful shutdown and refuses new work.
    #[error("Worker pool is shutting down")]
    ServiceShutdown,

    /// Internal channel send/receive failure or a malformed reply.
    #[error("Channel error: {context}")]
    ChannelError { context: String },

    /// The pool configuration was rejected.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

/// Failure reported by a worker for a single request.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum WorkerError {
    /// The method name on the request frame is not a known operation.
    #[error("unknown operation: {method}")]
    UnknownOperation { method: String },

    /// The `type` argument is not a known compression kind.
    #[error("unknown compression type: {kind}")]
    UnknownKind { kind: String },

    /// The request arguments could not be interpreted.
    #[error("invalid arguments: {reason}")]
    InvalidArgs { reason: String },

    /// The operation needs a transferred buffer and none was sent.
    #[error("no buffer was transferred with the request")]
    MissingBuffer,

    /// The codec rejected the input.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The codec panicked while handling the request.
    #[error("worker panicked: {context}")]
    Panicked { context: String },
}

/// Opaque failure returned by a [`Codec`](crate::Codec) implementation.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
#[error("{message}")]
pub struct CodecError {
    pub message: String,
}

impl CodecError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
