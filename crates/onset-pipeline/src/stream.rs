//! Tick-by-tick orchestration over a bounded ring buffer.
//!
//! Each row advances CPD and candidate scoring exactly once. Admitted
//! candidates stay pending and are re-checked against the buffer as later
//! rows of their entity arrive, until they confirm, are blocked by a newer
//! confirmation, or can no longer confirm.

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::{record_confirmation, record_rejection, required_fields};
use onset_core::{
    CandidateEvent, ConfirmedEvent, EntityId, FeatureField, FeatureRow, FeatureSchema,
    RejectedEvent, TimestampMs,
};
use onset_detector::{CandidateGate, ConfirmationEngine, WindowBounds};
use onset_refractory::{build_policy, Admission, RefractoryPolicy};
use onset_telemetry::Metrics;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use tracing::trace;

/// Running counters of a streaming session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StreamStats {
    pub ticks: u64,
    pub candidates: u64,
    pub rejected: u64,
    pub confirmed: u64,
    /// Pending candidates dropped without confirming.
    pub expired: u64,
    pub buffer_rows: usize,
    pub pending: usize,
}

#[derive(Debug, Clone)]
struct Pending {
    candidate: CandidateEvent,
    bounds: WindowBounds,
}

/// Streaming onset detector.
pub struct StreamingPipeline {
    gate: CandidateGate,
    engine: ConfirmationEngine,
    refractory: Box<dyn RefractoryPolicy>,
    capacity: usize,
    buffer: VecDeque<FeatureRow>,
    /// Latest timestamp and buffered row count per entity. An entry goes
    /// away once the entity's last row leaves the buffer.
    last_ts: HashMap<EntityId, (TimestampMs, usize)>,
    pending: Vec<Pending>,
    rejected: VecDeque<RejectedEvent>,
    stats: StreamStats,
}

impl StreamingPipeline {
    pub fn new(config: PipelineConfig) -> PipelineResult<Self> {
        config.validate()?;
        let refractory = build_policy(&config.refractory)?;
        Self::with_policy(config, refractory)
    }

    pub fn with_policy(
        config: PipelineConfig,
        refractory: Box<dyn RefractoryPolicy>,
    ) -> PipelineResult<Self> {
        let gate = CandidateGate::new(config.detector, config.cpd)?;
        let engine = ConfirmationEngine::new(config.confirm)?;
        let capacity = config.stream.buffer_rows.max(1);
        Ok(Self {
            gate,
            engine,
            refractory,
            capacity,
            buffer: VecDeque::with_capacity(capacity),
            last_ts: HashMap::new(),
            pending: Vec::new(),
            rejected: VecDeque::new(),
            stats: StreamStats::default(),
        })
    }

    pub fn required_fields(&self) -> Vec<FeatureField> {
        required_fields(self.refractory.as_ref())
    }

    /// Fail if `schema` lacks a required column. Call once the source's
    /// schema is known.
    pub fn check_schema(&self, schema: &FeatureSchema) -> PipelineResult<()> {
        schema.require(&self.required_fields())?;
        Ok(())
    }

    /// Process one row. Returns the newest confirmation of this tick.
    pub fn on_tick(&mut self, row: FeatureRow) -> PipelineResult<Option<ConfirmedEvent>> {
        if let Some(&(prev_ts, _)) = self.last_ts.get(&row.entity_id) {
            if row.ts < prev_ts {
                return Err(PipelineError::OutOfOrder {
                    entity_id: row.entity_id,
                    prev_ts,
                    ts: row.ts,
                });
            }
        }
        let entry = self.last_ts.entry(row.entity_id.clone()).or_insert((row.ts, 0));
        entry.0 = row.ts;
        entry.1 += 1;
        self.stats.ticks += 1;

        self.refractory.observe(&row);
        if let Some(candidate) = self.gate.evaluate(&row) {
            self.stats.candidates += 1;
            self.admit(candidate);
        }

        let entity_id = row.entity_id.clone();
        let now = row.ts;
        self.push_row(row);

        let alert = self.evaluate_pending(&entity_id, now);

        self.stats.buffer_rows = self.buffer.len();
        self.stats.pending = self.pending.len();
        Metrics::stream_occupancy(self.buffer.len(), self.pending.len());
        Ok(alert)
    }

    fn admit(&mut self, candidate: CandidateEvent) {
        match self.refractory.admit(&candidate) {
            Admission::Allowed => {
                let bounds = self.engine.bounds(&candidate);
                self.pending.push(Pending { candidate, bounds });
            }
            Admission::Rejected(event) => self.reject(event),
        }
    }

    fn reject(&mut self, event: RejectedEvent) {
        record_rejection(&event, self.refractory.name());
        self.stats.rejected += 1;
        if self.rejected.len() == self.capacity {
            self.rejected.pop_front();
        }
        self.rejected.push_back(event);
    }

    fn push_row(&mut self, row: FeatureRow) {
        self.buffer.push_back(row);
        if self.buffer.len() <= self.capacity {
            return;
        }
        let Some(evicted) = self.buffer.pop_front() else {
            return;
        };
        if let Some(entry) = self.last_ts.get_mut(&evicted.entity_id) {
            entry.1 = entry.1.saturating_sub(1);
            if entry.1 == 0 {
                self.last_ts.remove(&evicted.entity_id);
            }
        }
        // Rows of one entity leave in order, so once a row at or after the
        // candidate's own timestamp is gone the whole pre-window is gone.
        let before = self.pending.len();
        self.pending.retain(|p| {
            p.candidate.entity_id() != &evicted.entity_id || evicted.ts <= p.bounds.pre_end
        });
        self.stats.expired += (before - self.pending.len()) as u64;
    }

    /// Re-check the pending candidates of the entity that just ticked.
    fn evaluate_pending(&mut self, entity_id: &EntityId, now: TimestampMs) -> Option<ConfirmedEvent> {
        let mut newest: Option<ConfirmedEvent> = None;
        let mut i = 0;
        while i < self.pending.len() {
            if self.pending[i].candidate.entity_id() != entity_id {
                i += 1;
                continue;
            }

            let confirmed = self
                .engine
                .confirm(self.buffer.iter(), &self.pending[i].candidate);
            match confirmed {
                Some(event) => {
                    self.pending.remove(i);
                    record_confirmation(&event);
                    self.refractory.on_confirm(&event);
                    self.stats.confirmed += 1;
                    self.readmit(entity_id);
                    if newest.as_ref().map_or(true, |n| event.ts() >= n.ts()) {
                        newest = Some(event);
                    }
                    // Pending was reshuffled; start over for this entity.
                    i = 0;
                }
                None if now > self.pending[i].bounds.confirm_end => {
                    let expired = self.pending.remove(i);
                    trace!(
                        entity_id = %expired.candidate.entity_id(),
                        ts = expired.candidate.ts(),
                        "Pending candidate expired"
                    );
                    self.stats.expired += 1;
                }
                None => i += 1,
            }
        }
        newest
    }

    /// Run the remaining pending candidates of `entity_id` through the
    /// refractory again after a confirmation.
    fn readmit(&mut self, entity_id: &EntityId) {
        let (ours, others): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|p| p.candidate.entity_id() == entity_id);
        self.pending = others;
        for p in ours {
            match self.refractory.admit(&p.candidate) {
                Admission::Allowed => self.pending.push(p),
                Admission::Rejected(event) => self.reject(event),
            }
        }
    }

    /// Drain the refractory rejections recorded so far.
    pub fn take_rejected(&mut self) -> Vec<RejectedEvent> {
        self.rejected.drain(..).collect()
    }

    pub fn stats(&self) -> StreamStats {
        self.stats
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Entities with at least one row in the buffer.
    pub fn tracked_entities(&self) -> usize {
        self.last_ts.len()
    }

    /// Drop buffered rows, pending candidates and all per-entity state.
    pub fn reset(&mut self) {
        self.gate.reset();
        self.refractory.reset();
        self.buffer.clear();
        self.last_ts.clear();
        self.pending.clear();
        self.rejected.clear();
        self.stats = StreamStats::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet(ts: i64) -> FeatureRow {
        FeatureRow {
            ret_1s: Some(0.0),
            accel_1s: Some(0.0),
            z_vol_1s: Some(0.0),
            ticks_per_sec: Some(1.0),
            spread: Some(0.02),
            microprice_slope: Some(0.0),
            price: Some(100.0),
            ..FeatureRow::empty(ts, "ABC")
        }
    }

    #[test]
    fn test_out_of_order_is_fatal() {
        let mut stream = StreamingPipeline::new(PipelineConfig::default()).unwrap();
        stream.on_tick(quiet(2_000)).unwrap();
        let err = stream.on_tick(quiet(1_000)).unwrap_err();
        assert!(matches!(err, PipelineError::OutOfOrder { prev_ts: 2_000, ts: 1_000, .. }));
    }

    #[test]
    fn test_buffer_is_bounded() {
        let mut config = PipelineConfig::default();
        config.stream.buffer_rows = 5;
        let mut stream = StreamingPipeline::new(config).unwrap();
        for i in 0..20 {
            assert!(stream.on_tick(quiet(i * 1_000)).unwrap().is_none());
        }
        assert_eq!(stream.buffer_len(), 5);
        let stats = stream.stats();
        assert_eq!(stats.ticks, 20);
        assert_eq!(stats.buffer_rows, 5);
        assert_eq!(stats.candidates, 0);
    }

    #[test]
    fn test_entity_tracking_follows_buffer() {
        let mut config = PipelineConfig::default();
        config.stream.buffer_rows = 3;
        let mut stream = StreamingPipeline::new(config).unwrap();
        for (i, entity) in ["A", "B", "C", "D", "E"].iter().enumerate() {
            let mut row = quiet(i as i64 * 1_000);
            row.entity_id = EntityId::new(*entity);
            stream.on_tick(row).unwrap();
        }
        assert_eq!(stream.buffer_len(), 3);
        assert_eq!(stream.tracked_entities(), 3);

        // E is still buffered, so ordering is still enforced for it.
        let mut late = quiet(0);
        late.entity_id = EntityId::new("E");
        assert!(matches!(
            stream.on_tick(late),
            Err(PipelineError::OutOfOrder { .. })
        ));
    }

    #[test]
    fn test_reset_clears_state() {
        let mut stream = StreamingPipeline::new(PipelineConfig::default()).unwrap();
        stream.on_tick(quiet(2_000)).unwrap();
        stream.reset();
        assert_eq!(stream.buffer_len(), 0);
        assert!(stream.on_tick(quiet(1_000)).is_ok());
    }
}
