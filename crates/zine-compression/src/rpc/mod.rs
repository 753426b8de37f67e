//! Wire contract between the dispatcher and its workers.
//!
//! Every worker is bootstrapped over its control channel with a single
//! [`ControlFrame::Init`] carrying one end of a dedicated [`message_channel`].
//! From then on all request/response traffic for that worker flows over the
//! dedicated channel only:
//!
//! - dispatcher → worker: [`RequestFrame`] `{id, method, args}` plus the moved
//!   [`TransferList`].
//! - worker → dispatcher: [`ResponseFrame`] `{id, result}` or `{id, error}`.

mod channel;

pub use channel::{MessagePort, PortListener, PortSender, message_channel};

use crate::codec::Operation;
use crate::error::WorkerError;
use bytes::BytesMut;
use core::fmt;
use serde::{Deserialize, Serialize};

/// Opaque structured arguments of a request.
pub type Args = serde_json::Value;

/// Buffers whose ownership moves with a frame.
pub type TransferList = Vec<BytesMut>;

/// Endpoint held by a worker: receives requests, posts responses.
pub type WorkerPort = MessagePort<ResponseFrame, RequestFrame>;

/// Endpoint retained by the dispatcher: posts requests, receives responses.
pub type DispatcherPort = MessagePort<RequestFrame, ResponseFrame>;

/// Token pairing a request frame with its response frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CorrelationId(u64);

impl CorrelationId {
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic source of [`CorrelationId`]s, owned by a single dispatcher.
///
/// Ids start at 1 and are never reused for the lifetime of the owner.
#[derive(Debug)]
pub struct CorrelationIds {
    next: u64,
}

impl CorrelationIds {
    pub const fn new() -> Self {
        Self { next: 1 }
    }

    pub fn next_id(&mut self) -> CorrelationId {
        let id = CorrelationId(self.next);
        self.next += 1;
        id
    }
}

impl Default for CorrelationIds {
    fn default() -> Self {
        Self::new()
    }
}

/// Operation name as carried on a request frame.
///
/// The dispatcher forwards it untouched; only the worker decides whether it
/// names a known [`Operation`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Method(String);

impl Method {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Method {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for Method {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl From<Operation> for Method {
    fn from(op: Operation) -> Self {
        Self(op.as_str().to_string())
    }
}

/// Opaque result of a request: a structured value plus moved buffers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Payload {
    pub value: serde_json::Value,
    pub buffers: TransferList,
}

impl Payload {
    /// A payload carrying a single buffer and no structured value.
    pub fn from_buffer(buffer: BytesMut) -> Self {
        Self {
            value: serde_json::Value::Null,
            buffers: vec![buffer],
        }
    }
}

/// Request frame, dispatcher → worker.
#[derive(Debug)]
pub struct RequestFrame {
    pub id: CorrelationId,
    pub method: Method,
    pub args: Args,
    pub transfer: TransferList,
}

/// Response frame, worker → dispatcher.
#[derive(Debug)]
pub struct ResponseFrame {
    pub id: CorrelationId,
    pub outcome: Result<Payload, WorkerError>,
}

impl ResponseFrame {
    pub fn result(id: CorrelationId, payload: Payload) -> Self {
        Self {
            id,
            outcome: Ok(payload),
        }
    }

    pub fn error(id: CorrelationId, error: WorkerError) -> Self {
        Self {
            id,
            outcome: Err(error),
        }
    }
}

/// Control-plane frame, pool manager → worker.
#[derive(Debug)]
pub enum ControlFrame {
    /// Hands the worker its end of the dedicated RPC channel.
    Init { port: WorkerPort },
}
