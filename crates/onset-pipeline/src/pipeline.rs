//! Batch orchestration.
//!
//! `CandidateGate` → `RefractoryPolicy::admit` → `ConfirmationEngine` →
//! `RefractoryPolicy::on_confirm`, over a whole batch at once. Refractory and
//! CPD state carry over to the next batch.

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::report::{Diagnostics, PipelineReport, RunCounts, TtaSummary};
use onset_core::{
    ts_to_utc, CandidateEvent, ConfirmedEvent, EntityId, FeatureBatch, FeatureField,
    FeatureRow, FeatureSchema, RejectedEvent, TimestampMs,
};
use onset_detector::{CandidateGate, ConfirmationEngine};
use onset_refractory::{build_policy, Admission, RefractoryPolicy};
use onset_telemetry::Metrics;
use std::collections::HashMap;
use tracing::{debug, info};

/// Columns the detector needs plus whatever the refractory policy adds.
pub(crate) fn required_fields(policy: &dyn RefractoryPolicy) -> Vec<FeatureField> {
    let mut fields = FeatureField::REQUIRED.to_vec();
    for field in policy.required_fields() {
        if !fields.contains(field) {
            fields.push(*field);
        }
    }
    fields
}

/// Reject rows whose timestamp goes backwards within their entity.
pub(crate) fn check_order<'a, I>(rows: I) -> PipelineResult<()>
where
    I: IntoIterator<Item = &'a FeatureRow>,
{
    let mut last: HashMap<&EntityId, TimestampMs> = HashMap::new();
    for row in rows {
        if let Some(prev_ts) = last.insert(&row.entity_id, row.ts) {
            if row.ts < prev_ts {
                return Err(PipelineError::OutOfOrder {
                    entity_id: row.entity_id.clone(),
                    prev_ts,
                    ts: row.ts,
                });
            }
        }
    }
    Ok(())
}

pub(crate) fn record_confirmation(event: &ConfirmedEvent) {
    let axes = event.evidence.axes.to_string();
    info!(
        entity_id = %event.entity_id(),
        ts = event.ts(),
        at = ?ts_to_utc(event.ts()),
        confirmed_from = event.confirmed_from,
        tta_ms = event.tta_ms(),
        axes = %axes,
        onset_strength = event.evidence.onset_strength,
        "Onset confirmed"
    );
    Metrics::onset_confirmed(&axes, event.tta_ms() as f64);
}

pub(crate) fn record_rejection(event: &RejectedEvent, policy: &str) {
    debug!(
        entity_id = %event.entity_id(),
        ts = event.ts(),
        score = event.original_score,
        remaining_seconds = event.refractory_info.remaining_seconds,
        phase = ?event.refractory_info.phase,
        policy,
        "Candidate rejected by refractory"
    );
    Metrics::candidate_rejected(policy);
}

/// Whole-batch onset detector.
pub struct OnsetPipeline {
    config: PipelineConfig,
    gate: CandidateGate,
    engine: ConfirmationEngine,
    refractory: Box<dyn RefractoryPolicy>,
    diagnostics: bool,
}

impl OnsetPipeline {
    /// Build a pipeline with the refractory policy selected by the config.
    pub fn new(config: PipelineConfig) -> PipelineResult<Self> {
        config.validate()?;
        let refractory = build_policy(&config.refractory)?;
        Self::with_policy(config, refractory)
    }

    /// Build a pipeline around a caller-supplied refractory policy.
    pub fn with_policy(
        config: PipelineConfig,
        refractory: Box<dyn RefractoryPolicy>,
    ) -> PipelineResult<Self> {
        let gate = CandidateGate::new(config.detector.clone(), config.cpd.clone())?;
        let engine = ConfirmationEngine::new(config.confirm.clone())?;
        Ok(Self {
            config,
            gate,
            engine,
            refractory,
            diagnostics: false,
        })
    }

    /// Keep candidate artifacts in the report.
    pub fn with_diagnostics(mut self, enabled: bool) -> Self {
        self.diagnostics = enabled;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn refractory(&self) -> &dyn RefractoryPolicy {
        self.refractory.as_ref()
    }

    /// Columns a source must carry.
    pub fn required_fields(&self) -> Vec<FeatureField> {
        required_fields(self.refractory.as_ref())
    }

    /// Fail if `schema` lacks a required column.
    pub fn check_schema(&self, schema: &FeatureSchema) -> PipelineResult<()> {
        schema.require(&self.required_fields())?;
        Ok(())
    }

    /// Run a decoded batch. Schema and ordering are checked before anything
    /// is emitted.
    pub fn run_batch(&mut self, batch: &FeatureBatch) -> PipelineResult<PipelineReport> {
        if batch.is_empty() {
            return Ok(PipelineReport::default());
        }
        self.check_schema(&batch.schema)?;
        self.run_rows(&batch.rows)
    }

    /// Run in-memory rows, which are assumed to carry every column.
    pub fn run_rows(&mut self, rows: &[FeatureRow]) -> PipelineResult<PipelineReport> {
        check_order(rows)?;

        // 1. Score every row.
        let mut candidates = self.gate.scan(rows);
        candidates.sort_by_key(CandidateEvent::ts);

        // 2. Refractory admission, against state from earlier batches.
        let policy = self.refractory.name();
        let mut allowed = Vec::with_capacity(candidates.len());
        let mut rejected = Vec::new();
        for candidate in &candidates {
            match self.refractory.admit(candidate) {
                Admission::Allowed => allowed.push(candidate),
                Admission::Rejected(event) => {
                    record_rejection(&event, policy);
                    rejected.push(event);
                }
            }
        }

        // 3. Confirmation against the candidate's own entity rows.
        let mut by_entity: HashMap<&EntityId, Vec<&FeatureRow>> = HashMap::new();
        for row in rows {
            by_entity.entry(&row.entity_id).or_default().push(row);
        }
        let mut confirmed = Vec::new();
        let mut unconfirmed = Vec::new();
        for candidate in allowed.iter().copied() {
            let entity_rows = by_entity
                .get(candidate.entity_id())
                .map(Vec::as_slice)
                .unwrap_or_default();
            match self.engine.confirm(entity_rows.iter().copied(), candidate) {
                Some(event) => {
                    record_confirmation(&event);
                    confirmed.push(event);
                }
                None if self.diagnostics => unconfirmed.push(candidate.clone()),
                None => {}
            }
        }
        confirmed.sort_by_key(ConfirmedEvent::ts);

        // 4. Replay rows so the refractory state is current for the next batch.
        self.replay(rows, &confirmed);

        let counts = RunCounts {
            rows: rows.len(),
            candidates: candidates.len(),
            allowed: allowed.len(),
            rejected: rejected.len(),
            confirmed: confirmed.len(),
        };
        let tta = TtaSummary::from_events(&confirmed);
        info!(
            rows = counts.rows,
            candidates = counts.candidates,
            rejected = counts.rejected,
            confirmed = counts.confirmed,
            median_tta_ms = tta.map(|t| t.median_ms),
            "Batch complete"
        );

        let diagnostics = self.diagnostics.then(|| Diagnostics {
            candidates,
            unconfirmed,
        });
        Ok(PipelineReport {
            counts,
            tta,
            confirmed,
            rejected,
            diagnostics,
        })
    }

    /// Feed rows to `observe` in timestamp order, applying each confirmation
    /// just before the first row at or after its timestamp.
    fn replay(&mut self, rows: &[FeatureRow], confirmed: &[ConfirmedEvent]) {
        let mut ordered: Vec<&FeatureRow> = rows.iter().collect();
        ordered.sort_by_key(|row| row.ts);

        let mut pending = confirmed.iter().peekable();
        for row in ordered {
            while let Some(event) = pending.next_if(|event| event.ts() <= row.ts) {
                self.refractory.on_confirm(event);
            }
            self.refractory.observe(row);
        }
        for event in pending {
            self.refractory.on_confirm(event);
        }
    }

    /// Drop all per-entity state.
    pub fn reset(&mut self) {
        self.gate.reset();
        self.refractory.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(ts: i64, entity: &str) -> FeatureRow {
        FeatureRow::empty(ts, entity)
    }

    #[test]
    fn test_check_order_per_entity() {
        let rows = vec![row(2_000, "A"), row(1_000, "B"), row(2_000, "A"), row(3_000, "B")];
        assert!(check_order(&rows).is_ok());

        let rows = vec![row(2_000, "A"), row(3_000, "B"), row(1_000, "A")];
        match check_order(&rows) {
            Err(PipelineError::OutOfOrder {
                entity_id,
                prev_ts,
                ts,
            }) => {
                assert_eq!(entity_id.as_str(), "A");
                assert_eq!(prev_ts, 2_000);
                assert_eq!(ts, 1_000);
            }
            other => panic!("expected OutOfOrder, got {other:?}"),
        }
    }

    #[test]
    fn test_required_fields_follow_policy() {
        let pipeline = OnsetPipeline::new(PipelineConfig::default()).unwrap();
        assert!(!pipeline.required_fields().contains(&FeatureField::Price));

        let mut config = PipelineConfig::default();
        config.refractory.mode = onset_refractory::RefractoryMode::StateMachine;
        let pipeline = OnsetPipeline::new(config).unwrap();
        assert!(pipeline.required_fields().contains(&FeatureField::Price));
    }

    #[test]
    fn test_empty_batch() {
        let mut pipeline = OnsetPipeline::new(PipelineConfig::default()).unwrap();
        let report = pipeline.run_batch(&FeatureBatch::default()).unwrap();
        assert_eq!(report, PipelineReport::default());
    }
}
