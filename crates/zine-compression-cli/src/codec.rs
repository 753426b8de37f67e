//! Reference depth codec used by the load driver.
//!
//! - `depthQuantized`: `f32` samples in `[0, MAX_DEPTH]` quantized to `u16`.
//! - `depth`: the same quantization, delta-encoded between neighbouring
//!   samples.
//! - `byteAttribute`, `generic`: passed through unchanged.
//! - `image`, `pointCloud`: not supported.
//!
//! All samples are little-endian.

use bytes::{BufMut, BytesMut};
use zine_compression::{Codec, CodecError, CompressionKind};

/// Largest representable depth. Samples beyond it are clamped.
pub const MAX_DEPTH: f32 = 10_000.0;

/// Bits per quantized depth sample.
pub const QUANTIZATION_BITS: u32 = 16;

const LEVELS: f32 = ((1u32 << QUANTIZATION_BITS) - 1) as f32;

#[derive(Debug, Default, Clone, Copy)]
pub struct DepthCodec;

impl Codec for DepthCodec {
    fn compress(&self, kind: CompressionKind, value: BytesMut) -> Result<BytesMut, CodecError> {
        match kind {
            CompressionKind::DepthQuantized => quantize(&value, false),
            CompressionKind::Depth => quantize(&value, true),
            CompressionKind::ByteAttribute | CompressionKind::Generic => Ok(value),
            CompressionKind::Image | CompressionKind::PointCloud => Err(unsupported(kind)),
        }
    }

    fn decompress(&self, kind: CompressionKind, value: BytesMut) -> Result<BytesMut, CodecError> {
        match kind {
            CompressionKind::DepthQuantized => dequantize(&value, false),
            CompressionKind::Depth => dequantize(&value, true),
            CompressionKind::ByteAttribute | CompressionKind::Generic => Ok(value),
            CompressionKind::Image | CompressionKind::PointCloud => Err(unsupported(kind)),
        }
    }
}

fn unsupported(kind: CompressionKind) -> CodecError {
    CodecError::new(format!("{kind} is not supported by the depth codec"))
}

fn quantize(samples: &[u8], delta: bool) -> Result<BytesMut, CodecError> {
    if samples.len() % 4 != 0 {
        return Err(CodecError::new(format!(
            "depth buffer of {} bytes is not a whole number of f32 samples",
            samples.len()
        )));
    }

    let mut out = BytesMut::with_capacity(samples.len() / 2);
    let mut previous = 0u16;
    for chunk in samples.chunks_exact(4) {
        let depth = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        let depth = if depth.is_nan() { 0.0 } else { depth.clamp(0.0, MAX_DEPTH) };
        let level = (depth / MAX_DEPTH * LEVELS).round() as u16;

        if delta {
            out.put_u16_le(level.wrapping_sub(previous));
            previous = level;
        } else {
            out.put_u16_le(level);
        }
    }
    Ok(out)
}

fn dequantize(levels: &[u8], delta: bool) -> Result<BytesMut, CodecError> {
    if levels.len() % 2 != 0 {
        return Err(CodecError::new(format!(
            "quantized buffer of {} bytes is not a whole number of u16 samples",
            levels.len()
        )));
    }

    let mut out = BytesMut::with_capacity(levels.len() * 2);
    let mut previous = 0u16;
    for chunk in levels.chunks_exact(2) {
        let mut level = u16::from_le_bytes([chunk[0], chunk[1]]);
        if delta {
            level = previous.wrapping_add(level);
            previous = level;
        }
        out.put_f32_le(f32::from(level) / LEVELS * MAX_DEPTH);
    }
    Ok(out)
}
