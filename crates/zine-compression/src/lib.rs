#![doc = include_str!("../README.md")]

pub mod codec;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod pool;
pub mod rpc;
pub mod telemetry;

mod client;

pub use client::CompressionClient;
pub use codec::{Codec, CompressionKind, Operation};
pub use config::{DEFAULT_POOL_SIZE, PoolConfig};
pub use dispatch::{Pending, PoolStats};
pub use error::{CodecError, Error, Result, WorkerError};
pub use rpc::{Args, CorrelationId, Method, Payload, TransferList};
