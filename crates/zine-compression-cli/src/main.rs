#![doc = include_str!("../README.md")]

mod codec;
mod config;
mod telemetry;

use bytes::{BufMut, BytesMut};
use clap::Parser;
use codec::{DepthCodec, MAX_DEPTH};
use config::{CliArgs, RunConfig};
use futures::future::join_all;
use serde::Serialize;
use std::time::Instant;
use telemetry::init_telemetry;
use tokio::signal;
use zine_compression::{CompressionClient, CompressionKind, PoolStats};

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// Summary printed once a burst completes.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BurstReport {
    kind: CompressionKind,
    requests: usize,
    failed: usize,
    input_bytes: usize,
    compressed_bytes: usize,
    restored_bytes: usize,
    elapsed_ms: f64,
    stats: PoolStats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = RunConfig::try_from(args)?;

    let providers = init_telemetry()?;
    log_startup_info(&config);

    let result = run(&config).await;

    providers.shutdown();
    result
}

async fn run(config: &RunConfig) -> anyhow::Result<()> {
    let mut client = CompressionClient::new(config.pool, DepthCodec)?;

    let report = tokio::select! {
        report = run_burst(&client, config) => Some(report?),
        () = shutdown_signal() => None,
    };

    let Some(report) = report else {
        client.destroy();
        #[cfg(feature = "tracing")]
        tracing::warn!("Burst interrupted, worker pool destroyed");
        return Ok(());
    };

    println!("{}", serde_json::to_string_pretty(&report)?);

    client.shutdown().await?;

    #[cfg(feature = "tracing")]
    tracing::info!("Worker pool shut down successfully");
    Ok(())
}

#[cfg_attr(
    feature = "tracing",
    tracing::instrument(skip_all, fields(requests = config.num_requests, kind = %config.kind))
)]
async fn run_burst(client: &CompressionClient, config: &RunConfig) -> anyhow::Result<BurstReport> {
    let start = Instant::now();
    let mut failed = 0;

    // Every request is admitted before the first one is awaited, so the burst
    // overflows the pool and exercises the queue.
    let compressed = join_all(
        (0..config.num_requests)
            .map(|seed| client.compress(config.kind, depth_frame(seed, config.depth_samples))),
    )
    .await;

    let mut packed = Vec::with_capacity(compressed.len());
    for result in compressed {
        match result {
            Ok(buffer) => packed.push(buffer),
            Err(_e) => {
                failed += 1;
                #[cfg(feature = "tracing")]
                tracing::warn!("Compression failed: {_e}");
            }
        }
    }
    let compressed_bytes = packed.iter().map(BytesMut::len).sum();

    #[cfg(feature = "tracing")]
    tracing::debug!(
        "Compressed {} buffers in {:?}",
        packed.len(),
        start.elapsed()
    );

    let restored = join_all(
        packed
            .into_iter()
            .map(|buffer| client.decompress(config.kind, buffer)),
    )
    .await;

    let mut restored_bytes = 0;
    for result in restored {
        match result {
            Ok(buffer) => restored_bytes += buffer.len(),
            Err(_e) => {
                failed += 1;
                #[cfg(feature = "tracing")]
                tracing::warn!("Decompression failed: {_e}");
            }
        }
    }

    let stats = client.stats().await?;

    Ok(BurstReport {
        kind: config.kind,
        requests: config.num_requests,
        failed,
        input_bytes: config.num_requests * config.buffer_bytes,
        compressed_bytes,
        restored_bytes,
        elapsed_ms: start.elapsed().as_secs_f64() * 1000.0,
        stats,
    })
}

/// Synthetic depth map: a ramp offset by `seed`, within `[0, MAX_DEPTH]`.
fn depth_frame(seed: usize, samples: usize) -> BytesMut {
    let mut buffer = BytesMut::with_capacity(samples * size_of::<f32>());
    for i in 0..samples {
        let depth = (seed.wrapping_mul(31).wrapping_add(i) % 10_000) as f32 + 0.5;
        buffer.put_f32_le(depth.min(MAX_DEPTH));
    }
    buffer
}

fn log_startup_info(_config: &RunConfig) {
    if cfg!(debug_assertions) {
        #[cfg(feature = "tracing")]
        tracing::info!("Starting compression burst with full config: {:#?}", _config);
    } else {
        #[cfg(feature = "tracing")]
        tracing::info!(
            "Starting compression burst of {} requests on {} workers",
            _config.num_requests,
            _config.pool.pool_size()
        );
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
            }
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!("Failed to install SIGTERM handler: {_e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        if let Err(_e) = signal::ctrl_c().await {
            #[cfg(feature = "tracing")]
            tracing::warn!("Failed to install Ctrl+C handler: {_e}");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => {
            #[cfg(feature = "tracing")]
            tracing::info!("Received Ctrl+C signal");
        },
        () = terminate => {
            #[cfg(feature = "tracing")]
            tracing::info!("Received SIGTERM signal");
        },
    }
}
