//! Batch run results.

use onset_core::{CandidateEvent, ConfirmedEvent, OnsetEvent, RejectedEvent};
use onset_detector::median;
use serde::Serialize;

/// Event counts of one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunCounts {
    pub rows: usize,
    pub candidates: usize,
    pub allowed: usize,
    pub rejected: usize,
    pub confirmed: usize,
}

/// Time-to-alert distribution over confirmed events.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TtaSummary {
    pub count: usize,
    pub mean_ms: f64,
    pub median_ms: f64,
    pub min_ms: i64,
    pub max_ms: i64,
}

impl TtaSummary {
    /// Summary of `events`, or None when there are none.
    pub fn from_events(events: &[ConfirmedEvent]) -> Option<Self> {
        let mut tta: Vec<i64> = events.iter().map(ConfirmedEvent::tta_ms).collect();
        tta.sort_unstable();
        let (&min_ms, &max_ms) = (tta.first()?, tta.last()?);
        let mut values: Vec<f64> = tta.iter().map(|v| *v as f64).collect();
        let mean_ms = values.iter().sum::<f64>() / values.len() as f64;
        let median_ms = median(&mut values)?;
        Some(Self {
            count: tta.len(),
            mean_ms,
            median_ms,
            min_ms,
            max_ms,
        })
    }
}

/// Intermediate artifacts kept when diagnostics are on.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Diagnostics {
    /// Every candidate in timestamp order, before refractory filtering.
    pub candidates: Vec<CandidateEvent>,
    /// Admitted candidates that did not confirm.
    pub unconfirmed: Vec<CandidateEvent>,
}

/// Output of [`OnsetPipeline::run_batch`](crate::OnsetPipeline::run_batch).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PipelineReport {
    pub counts: RunCounts,
    pub tta: Option<TtaSummary>,
    /// Confirmed onsets in timestamp order.
    pub confirmed: Vec<ConfirmedEvent>,
    /// Refractory rejections in timestamp order.
    pub rejected: Vec<RejectedEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<Diagnostics>,
}

impl PipelineReport {
    /// Confirmed and rejected records merged by timestamp.
    pub fn events(&self) -> Vec<OnsetEvent> {
        let mut events: Vec<OnsetEvent> = self
            .confirmed
            .iter()
            .cloned()
            .map(OnsetEvent::from)
            .chain(self.rejected.iter().cloned().map(OnsetEvent::from))
            .collect();
        events.sort_by_key(|e| e.header().ts);
        events
    }
}
