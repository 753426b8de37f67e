//! # Metric hooks
//!
//! With the `metrics` feature enabled, the dispatcher records OpenTelemetry
//! instruments through the handles installed by [`init_metric_handles`]. The
//! embedding application owns the meter provider and passes a [`Meter`] in;
//! this crate never configures exporters itself.
//!
//! Without the feature every hook compiles to a no-op.
//!
//! ## Instruments
//!
//! - `requests`: requests submitted to the admission controller.
//! - `requests_inflight`: requests sent to a worker and not yet answered.
//! - `requests_queued`: requests waiting for a free slot.
//! - `request_errors`: requests rejected by a worker or a closed channel.
//! - `unmatched_responses`: response frames with no pending request.
//! - `request_duration` (ms): dispatch-to-response latency.

#[cfg(feature = "metrics")]
use opentelemetry::metrics::{Counter, Histogram, Meter, UpDownCounter};
#[cfg(feature = "metrics")]
use std::sync::OnceLock;

#[cfg(feature = "metrics")]
static REQUESTS: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static REQUESTS_INFLIGHT: OnceLock<UpDownCounter<i64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static REQUESTS_QUEUED: OnceLock<UpDownCounter<i64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static REQUEST_ERRORS: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static UNMATCHED_RESPONSES: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static REQUEST_DURATION_MS: OnceLock<Histogram<f64>> = OnceLock::new();

/// Installs the instruments used by every pool in this process.
///
/// Only the first call has an effect.
#[cfg(feature = "metrics")]
pub fn init_metric_handles(meter: &Meter) {
    let _ = REQUESTS.set(
        meter
            .u64_counter("requests")
            .with_description("Requests submitted to the worker pool")
            .build(),
    );

    let _ = REQUESTS_INFLIGHT.set(
        meter
            .i64_up_down_counter("requests_inflight")
            .with_description("Requests currently being served by a worker")
            .build(),
    );

    let _ = REQUESTS_QUEUED.set(
        meter
            .i64_up_down_counter("requests_queued")
            .with_description("Requests waiting for a free worker slot")
            .build(),
    );

    let _ = REQUEST_ERRORS.set(
        meter
            .u64_counter("request_errors")
            .with_description("Requests rejected by a worker or a closed channel")
            .build(),
    );

    let _ = UNMATCHED_RESPONSES.set(
        meter
            .u64_counter("unmatched_responses")
            .with_description("Response frames dropped for lack of a pending request")
            .build(),
    );

    let _ = REQUEST_DURATION_MS.set(
        meter
            .f64_histogram("request_duration")
            .with_unit("ms")
            .with_description("Dispatch-to-response latency")
            .build(),
    );
}

#[cfg(feature = "metrics")]
pub fn increment_requests() {
    if let Some(counter) = REQUESTS.get() {
        counter.add(1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_requests() {}

#[cfg(feature = "metrics")]
pub fn increment_requests_inflight() {
    if let Some(counter) = REQUESTS_INFLIGHT.get() {
        counter.add(1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_requests_inflight() {}

#[cfg(feature = "metrics")]
pub fn decrement_requests_inflight() {
    if let Some(counter) = REQUESTS_INFLIGHT.get() {
        counter.add(-1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn decrement_requests_inflight() {}

#[cfg(feature = "metrics")]
pub fn increment_requests_queued() {
    if let Some(counter) = REQUESTS_QUEUED.get() {
        counter.add(1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_requests_queued() {}

#[cfg(feature = "metrics")]
pub fn decrement_requests_queued() {
    if let Some(counter) = REQUESTS_QUEUED.get() {
        counter.add(-1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn decrement_requests_queued() {}

#[cfg(feature = "metrics")]
pub fn increment_request_errors() {
    if let Some(counter) = REQUEST_ERRORS.get() {
        counter.add(1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_request_errors() {}

#[cfg(feature = "metrics")]
pub fn increment_unmatched_responses() {
    if let Some(counter) = UNMATCHED_RESPONSES.get() {
        counter.add(1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_unmatched_responses() {}

#[cfg(feature = "metrics")]
pub fn record_request_duration(duration_ms: f64) {
    if let Some(histogram) = REQUEST_DURATION_MS.get() {
        histogram.record(duration_ms, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn record_request_duration(_duration_ms: f64) {}
