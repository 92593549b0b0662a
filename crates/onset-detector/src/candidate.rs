//! Rule-based candidate scoring.
//!
//! A row becomes a candidate when its weighted score, volume z-score and
//! tick rate all clear their thresholds. With the CPD pre-filter enabled the
//! row must additionally fall on a gate opening.

use crate::config::{CpdConfig, DetectorConfig};
use crate::cpd::{CpdGate, CpdState};
use crate::error::DetectorResult;
use onset_core::{
    CandidateEvent, CandidateEvidence, EntityId, EventHeader, FeatureField, FeatureRow,
};
use onset_telemetry::Metrics;
use tracing::trace;

/// Features that must be present for a row to be scored: every required
/// numeric column, including the ones only confirmation reads.
pub const NON_NULL_FIELDS: [FeatureField; 6] = [
    FeatureField::Ret1s,
    FeatureField::Accel1s,
    FeatureField::ZVol1s,
    FeatureField::TicksPerSec,
    FeatureField::Spread,
    FeatureField::MicropriceSlope,
];

/// Candidate gate.
///
/// Stateless apart from the optional CPD accumulators.
#[derive(Debug, Clone)]
pub struct CandidateGate {
    config: DetectorConfig,
    cpd: Option<CpdGate>,
}

impl CandidateGate {
    /// Create a gate. Both configs are validated; CPD is attached only when enabled.
    pub fn new(config: DetectorConfig, cpd_config: CpdConfig) -> DetectorResult<Self> {
        config.validate()?;
        cpd_config.validate()?;
        let cpd = cpd_config.enabled.then(|| CpdGate::new(cpd_config));
        Ok(Self { config, cpd })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn cpd_enabled(&self) -> bool {
        self.cpd.is_some()
    }

    pub fn cpd_state(&self, entity_id: &EntityId) -> Option<&CpdState> {
        self.cpd.as_ref().and_then(|gate| gate.state(entity_id))
    }

    /// Evaluate one row.
    ///
    /// The CPD state (if enabled) advances on every row, including rows that
    /// are then skipped for missing features.
    pub fn evaluate(&mut self, row: &FeatureRow) -> Option<CandidateEvent> {
        Metrics::row_processed();

        let gate_open = match self.cpd.as_mut() {
            Some(gate) => gate.observe(row).gate_open,
            None => true,
        };

        if let Some(missing) = row.first_missing(&NON_NULL_FIELDS) {
            trace!(
                entity_id = %row.entity_id,
                ts = row.ts,
                field = %missing,
                "Row skipped: missing feature"
            );
            Metrics::row_skipped(missing.column());
            return None;
        }

        if !gate_open {
            return None;
        }

        let (ret, accel, z_vol, ticks) = match (row.ret(), row.accel(), row.z_vol(), row.ticks()) {
            (Some(r), Some(a), Some(z), Some(t)) => (r, a, z, t),
            _ => return None,
        };

        let score = self.config.weights.score(ret, accel, z_vol, ticks);
        if score < self.config.score_threshold
            || z_vol < self.config.vol_z_min
            || ticks < self.config.ticks_min
        {
            return None;
        }

        Metrics::candidate_emitted();
        Some(CandidateEvent {
            header: EventHeader::new(row.ts, row.entity_id.clone()),
            score,
            evidence: CandidateEvidence {
                ret_1s: ret,
                accel_1s: accel,
                z_vol_1s: z_vol,
                ticks_per_sec: ticks,
                spread: row.spread(),
                microprice_slope: row.microprice_slope(),
                price: row.price(),
            },
        })
    }

    /// Evaluate rows in order, returning candidates in the same order.
    pub fn scan<'a, I>(&mut self, rows: I) -> Vec<CandidateEvent>
    where
        I: IntoIterator<Item = &'a FeatureRow>,
    {
        rows.into_iter().filter_map(|row| self.evaluate(row)).collect()
    }

    /// Drop CPD state.
    pub fn reset(&mut self) {
        if let Some(gate) = self.cpd.as_mut() {
            gate.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CpdPriceConfig, ScoreWeights};

    fn config() -> DetectorConfig {
        DetectorConfig {
            score_threshold: 5.0,
            vol_z_min: 2.0,
            ticks_min: 3.0,
            weights: ScoreWeights {
                ret: 1000.0,
                accel: 0.0,
                z_vol: 1.0,
                ticks: 0.0,
            },
        }
    }

    fn row(ts: i64, ret: f64, z_vol: f64, ticks: f64) -> FeatureRow {
        FeatureRow {
            ret_1s: Some(ret),
            accel_1s: Some(0.0),
            z_vol_1s: Some(z_vol),
            ticks_per_sec: Some(ticks),
            spread: Some(0.01),
            microprice_slope: Some(0.0),
            price: Some(100.0),
            ..FeatureRow::empty(ts, "ABC")
        }
    }

    fn gate() -> CandidateGate {
        CandidateGate::new(config(), CpdConfig::default()).unwrap()
    }

    #[test]
    fn test_emits_when_all_thresholds_pass() {
        let mut gate = gate();
        // score = 1000 * 0.003 + 1 * 2.5 = 5.5
        let c = gate.evaluate(&row(1_000, 0.003, 2.5, 4.0)).unwrap();
        assert_eq!(c.ts(), 1_000);
        assert!((c.score - 5.5).abs() < 1e-9);
        assert_eq!(c.evidence.price, Some(100.0));
    }

    #[test]
    fn test_each_threshold_is_required() {
        let mut gate = gate();
        // score too low: 1000 * 0.001 + 2.5 = 3.5
        assert!(gate.evaluate(&row(0, 0.001, 2.5, 4.0)).is_none());
        // z_vol below vol_z_min though score is high
        assert!(gate.evaluate(&row(0, 0.010, 1.5, 4.0)).is_none());
        // ticks below ticks_min
        assert!(gate.evaluate(&row(0, 0.010, 2.5, 2.0)).is_none());
    }

    #[test]
    fn test_boundaries_are_inclusive() {
        let mut gate = gate();
        // score = 3 + 2 = 5 exactly, z_vol = 2, ticks = 3
        assert!(gate.evaluate(&row(0, 0.003, 2.0, 3.0)).is_some());
    }

    #[test]
    fn test_missing_feature_skips_row() {
        let mut gate = gate();
        let mut r = row(0, 0.01, 5.0, 10.0);
        r.accel_1s = None;
        assert!(gate.evaluate(&r).is_none());
        r.accel_1s = Some(f64::NAN);
        assert!(gate.evaluate(&r).is_none());
    }

    #[test]
    fn test_null_spread_or_slope_skips_row() {
        let mut gate = gate();
        let mut r = row(0, 0.003, 3.0, 5.0);
        assert!(gate.evaluate(&r).is_some());

        r.spread = None;
        assert!(gate.evaluate(&r).is_none());

        r.spread = Some(0.01);
        r.microprice_slope = None;
        assert!(gate.evaluate(&r).is_none());
    }

    #[test]
    fn test_scan_preserves_order() {
        let mut gate = gate();
        let rows = vec![
            row(3_000, 0.01, 3.0, 5.0),
            row(1_000, 0.0, 0.0, 0.0),
            row(2_000, 0.01, 3.0, 5.0),
        ];
        let ts: Vec<_> = gate.scan(&rows).iter().map(|c| c.ts()).collect();
        assert_eq!(ts, vec![3_000, 2_000]);
    }

    #[test]
    fn test_cpd_gate_blocks_rows_without_shift() {
        let cpd = CpdConfig {
            enabled: true,
            price: CpdPriceConfig {
                k_sigma: 0.5,
                h_mult: 4.0,
                min_pre_s: 10.0,
            },
            ..Default::default()
        };
        let mut gate = CandidateGate::new(config(), cpd).unwrap();
        assert!(gate.cpd_enabled());

        // Qualifying rows during bootstrap never pass the closed gate.
        for i in 0..10 {
            let ret = if i % 2 == 0 { 0.006 } else { 0.004 };
            assert!(gate.evaluate(&row(i * 1000, ret, 3.0, 5.0)).is_none());
        }
        assert_eq!(
            gate.cpd_state(&EntityId::new("ABC")).unwrap().samples(),
            10
        );

        // A jump well above the baseline opens the gate and scores.
        let c = gate.evaluate(&row(10_000, 0.05, 3.0, 5.0));
        assert!(c.is_some());
    }
}
