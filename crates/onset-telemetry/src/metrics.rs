//! Prometheus metrics for the onset engine.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. If registration fails,
//! it indicates a fatal configuration error (e.g., duplicate metric names)
//! that should cause an immediate crash at startup rather than silent failure.
//! These panics only occur during static initialization, never at runtime.

use crate::error::TelemetryResult;
use once_cell::sync::Lazy;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Encoder, Histogram, IntCounter, IntCounterVec, IntGauge, TextEncoder,
};

// Labels stay bounded: no per-entity series, entity ids go to the logs.

/// Feature rows seen by the candidate gate.
pub static ROWS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "onset_rows_total",
        "Feature rows processed by the candidate gate"
    )
    .unwrap()
});

/// Rows skipped because a required feature was missing or non-finite.
pub static ROWS_SKIPPED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "onset_rows_skipped_total",
        "Rows skipped for missing or non-finite features",
        &["field"]
    )
    .unwrap()
});

/// CPD gate openings.
pub static CPD_OPEN_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "onset_cpd_open_total",
        "Change-point gate openings",
        &["axis"]
    )
    .unwrap()
});

/// Candidates emitted.
pub static CANDIDATES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "onset_candidates_total",
        "Candidate events emitted by the score gate"
    )
    .unwrap()
});

/// Confirmed onsets.
pub static CONFIRMED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "onset_confirmed_total",
        "Confirmed onset alerts",
        &["axes"]
    )
    .unwrap()
});

/// Candidates blocked by the refractory period.
pub static REJECTED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "onset_rejected_total",
        "Candidates rejected by the refractory period",
        &["policy"]
    )
    .unwrap()
});

/// Time-to-alert in milliseconds.
pub static TTA_MS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "onset_tta_ms",
        "Latency from candidate to confirmation in milliseconds",
        vec![1000.0, 2000.0, 3000.0, 5000.0, 8000.0, 10000.0, 15000.0, 20000.0, 30000.0, 60000.0]
    )
    .unwrap()
});

/// Rows currently held by the streaming ring buffer.
pub static STREAM_BUFFER_ROWS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "onset_stream_buffer_rows",
        "Rows held by the streaming ring buffer"
    )
    .unwrap()
});

/// Pending candidates awaiting confirmation in streaming mode.
pub static STREAM_PENDING: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "onset_stream_pending_candidates",
        "Candidates awaiting confirmation in streaming mode"
    )
    .unwrap()
});

/// Metrics helper.
pub struct Metrics;

impl Metrics {
    /// Record a row entering the candidate gate.
    pub fn row_processed() {
        ROWS_TOTAL.inc();
    }

    /// Record a row skipped for a missing feature.
    pub fn row_skipped(field: &str) {
        ROWS_SKIPPED_TOTAL.with_label_values(&[field]).inc();
    }

    /// Record a CPD gate opening. `axis` is "price", "volume" or "both".
    pub fn cpd_opened(axis: &str) {
        CPD_OPEN_TOTAL.with_label_values(&[axis]).inc();
    }

    /// Record a candidate.
    pub fn candidate_emitted() {
        CANDIDATES_TOTAL.inc();
    }

    /// Record a confirmation and its time-to-alert.
    pub fn onset_confirmed(axes: &str, tta_ms: f64) {
        CONFIRMED_TOTAL.with_label_values(&[axes]).inc();
        TTA_MS.observe(tta_ms);
    }

    /// Record a refractory rejection.
    pub fn candidate_rejected(policy: &str) {
        REJECTED_TOTAL.with_label_values(&[policy]).inc();
    }

    /// Set streaming buffer occupancy and pending candidate count.
    pub fn stream_occupancy(buffer_rows: usize, pending: usize) {
        STREAM_BUFFER_ROWS.set(buffer_rows as i64);
        STREAM_PENDING.set(pending as i64);
    }

    /// Render every registered metric in the Prometheus text format.
    pub fn render() -> TelemetryResult<String> {
        let encoder = TextEncoder::new();
        let families = prometheus::gather();
        let mut buf = Vec::new();
        encoder.encode(&families, &mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}
