use anyhow::{Context, bail};
use clap::Parser;
use zine_compression::{CompressionKind, PoolConfig};

/// Runtime configuration for the `zine-compression` load driver.
///
/// These settings control how large the worker pool is and what burst of work
/// is pushed through it. All values are parsed from CLI arguments or
/// environment variables (a `.env` file is honoured), with defaults that
/// exercise the queueing path on a typical machine.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "zine-compression",
    version,
    about = "Drive a burst of compression requests through a bounded worker pool"
)]
pub struct CliArgs {
    /// Number of long-lived compression workers.
    ///
    /// This is also the admission limit: at most this many requests are in
    /// flight at once, the rest wait in FIFO order.
    ///
    /// Environment variable: `POOL_SIZE`
    #[arg(long, env = "POOL_SIZE", default_value_t = zine_compression::DEFAULT_POOL_SIZE)]
    pub pool_size: usize,

    /// Number of buffers compressed, then decompressed again, in one burst.
    ///
    /// Environment variable: `NUM_REQUESTS`
    #[arg(long, env = "NUM_REQUESTS", default_value_t = 64)]
    pub num_requests: usize,

    /// Number of `f32` depth samples per buffer.
    ///
    /// Environment variable: `DEPTH_SAMPLES`
    #[arg(long, env = "DEPTH_SAMPLES", default_value_t = 512 * 512)]
    pub depth_samples: usize,

    /// Compression kind sent with every request, e.g. `depth` or
    /// `depthQuantized`.
    ///
    /// Environment variable: `KIND`
    #[arg(long, env = "KIND", default_value_t = String::from("depthQuantized"))]
    pub kind: String,
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub pool: PoolConfig,
    pub num_requests: usize,
    pub depth_samples: usize,
    pub buffer_bytes: usize,
    pub kind: CompressionKind,
}

impl TryFrom<CliArgs> for RunConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.pool_size == 0 {
            bail!("POOL_SIZE must be greater than 0");
        }

        if args.num_requests == 0 {
            bail!("NUM_REQUESTS must be greater than 0");
        }

        if args.depth_samples == 0 {
            bail!("DEPTH_SAMPLES must be greater than 0");
        }

        let buffer_bytes = args
            .depth_samples
            .checked_mul(size_of::<f32>())
            .ok_or_else(|| anyhow::anyhow!("Overflow in buffer_bytes computation"))?;

        let kind = args
            .kind
            .parse::<CompressionKind>()
            .with_context(|| {
                let kinds = CompressionKind::ALL.map(CompressionKind::as_str);
                format!("KIND must be one of: {}", kinds.join(", "))
            })?;

        Ok(Self {
            pool: PoolConfig::new(args.pool_size)?,
            num_requests: args.num_requests,
            depth_samples: args.depth_samples,
            buffer_bytes,
            kind,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> CliArgs {
        let mut argv = vec!["zine-compression"];
        argv.extend_from_slice(extra);
        CliArgs::parse_from(argv)
    }

    #[test]
    fn explicit_arguments_are_validated_into_a_run_config() {
        let config = RunConfig::try_from(args(&[
            "--pool-size",
            "2",
            "--num-requests",
            "5",
            "--depth-samples",
            "16",
            "--kind",
            "depth",
        ]))
        .unwrap();

        assert_eq!(config.pool.pool_size(), 2);
        assert_eq!(config.num_requests, 5);
        assert_eq!(config.buffer_bytes, 64);
        assert_eq!(config.kind, CompressionKind::Depth);
    }

    #[test]
    fn zero_sizes_and_unknown_kinds_are_rejected() {
        assert!(RunConfig::try_from(args(&["--pool-size", "0"])).is_err());
        assert!(RunConfig::try_from(args(&["--num-requests", "0"])).is_err());
        assert!(RunConfig::try_from(args(&["--depth-samples", "0"])).is_err());

        let err = RunConfig::try_from(args(&["--kind", "voxels"])).unwrap_err();
        assert!(err.to_string().starts_with("KIND must be one of"));
    }
}
