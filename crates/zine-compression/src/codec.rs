//! Worker-side routing of operations to a [`Codec`].
//!
//! The codec algorithms (point clouds, depth fields, images, ...) live outside
//! this crate. A worker only needs to know which [`Operation`] a request names
//! and which [`CompressionKind`] it targets; [`handle_request`] parses both,
//! looks the operation up in the handler table and runs it.

use crate::error::{CodecError, WorkerError};
use crate::rpc::{Args, Method, Payload, RequestFrame, ResponseFrame, TransferList};
use bytes::BytesMut;
use core::fmt;
use core::str::FromStr;
use serde::{Deserialize, Serialize};

/// Operations a worker knows how to serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Compress,
    Decompress,
}

impl Operation {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Compress => "compress",
            Self::Decompress => "decompress",
        }
    }
}

impl FromStr for Operation {
    type Err = WorkerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "compress" => Ok(Self::Compress),
            "decompress" => Ok(Self::Decompress),
            other => Err(WorkerError::UnknownOperation {
                method: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of data a compress/decompress request carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CompressionKind {
    Image,
    PointCloud,
    Depth,
    DepthQuantized,
    ByteAttribute,
    Generic,
}

impl CompressionKind {
    pub const ALL: [Self; 6] = [
        Self::Image,
        Self::PointCloud,
        Self::Depth,
        Self::DepthQuantized,
        Self::ByteAttribute,
        Self::Generic,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::PointCloud => "pointCloud",
            Self::Depth => "depth",
            Self::DepthQuantized => "depthQuantized",
            Self::ByteAttribute => "byteAttribute",
            Self::Generic => "generic",
        }
    }
}

impl FromStr for CompressionKind {
    type Err = WorkerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| WorkerError::UnknownKind {
                kind: s.to_string(),
            })
    }
}

impl fmt::Display for CompressionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compression algorithms executed inside a worker.
///
/// Implementations must be shareable across workers; each call receives
/// exclusive ownership of the input buffer and returns the output buffer.
pub trait Codec: Send + Sync + 'static {
    fn compress(&self, kind: CompressionKind, value: BytesMut) -> Result<BytesMut, CodecError>;

    fn decompress(&self, kind: CompressionKind, value: BytesMut)
    -> Result<BytesMut, CodecError>;
}

/// Arguments shared by `compress` and `decompress`.
#[derive(Debug, Deserialize)]
struct CodecArgs {
    #[serde(rename = "type")]
    kind: String,
}

/// Builds the `args` object for a compress/decompress request.
pub fn codec_args(kind: CompressionKind) -> Args {
    serde_json::json!({ "type": kind.as_str() })
}

type Handler = fn(&dyn Codec, Args, TransferList) -> Result<Payload, WorkerError>;

fn handler_for(op: Operation) -> Handler {
    match op {
        Operation::Compress => handle_compress,
        Operation::Decompress => handle_decompress,
    }
}

fn handle_compress(
    codec: &dyn Codec,
    args: Args,
    transfer: TransferList,
) -> Result<Payload, WorkerError> {
    let (kind, value) = codec_input(args, transfer)?;
    Ok(Payload::from_buffer(codec.compress(kind, value)?))
}

fn handle_decompress(
    codec: &dyn Codec,
    args: Args,
    transfer: TransferList,
) -> Result<Payload, WorkerError> {
    let (kind, value) = codec_input(args, transfer)?;
    Ok(Payload::from_buffer(codec.decompress(kind, value)?))
}

fn codec_input(
    args: Args,
    transfer: TransferList,
) -> Result<(CompressionKind, BytesMut), WorkerError> {
    let CodecArgs { kind } =
        serde_json::from_value(args).map_err(|e| WorkerError::InvalidArgs {
            reason: e.to_string(),
        })?;
    let kind = kind.parse()?;
    let value = transfer.into_iter().next().ok_or(WorkerError::MissingBuffer)?;
    Ok((kind, value))
}

/// Serves one request frame and builds the matching response frame.
///
/// Never panics on bad input: unknown operations and kinds, malformed args and
/// codec failures all become an error response for the same id.
pub fn handle_request(codec: &dyn Codec, frame: RequestFrame) -> ResponseFrame {
    let RequestFrame {
        id,
        method,
        args,
        transfer,
    } = frame;

    match run(codec, &method, args, transfer) {
        Ok(payload) => ResponseFrame::result(id, payload),
        Err(e) => ResponseFrame::error(id, e),
    }
}

fn run(
    codec: &dyn Codec,
    method: &Method,
    args: Args,
    transfer: TransferList,
) -> Result<Payload, WorkerError> {
    let op: Operation = method.as_str().parse()?;
    handler_for(op)(codec, args, transfer)
}
