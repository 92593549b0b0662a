//! Relative confirmation of candidates.
//!
//! A candidate is confirmed when the rows following it improve on the
//! rows preceding it, persistently:
//! - Baseline: per-field median over the pre-window `(ts − pre_window_s, ts)`
//! - Each confirm-window row is checked on three axes against the baseline
//! - The alert fires at the earliest row closing a run of `persistent_n`
//!   satisfied rows
//!
//! Axis definitions (deltas from `ConfirmConfig::delta`):
//! - price: `ret − base.ret ≥ ret_min` or `slope − base.slope ≥ ret_min`
//! - volume: `z_vol − base.z_vol ≥ zvol_min`
//! - friction: `base.spread − spread ≥ spread_drop`

use crate::config::ConfirmConfig;
use crate::error::DetectorResult;
use crate::persistence::PersistenceWindow;
use onset_core::{
    secs_to_ms, AxisSet, CandidateEvent, ConfirmedEvent, ConfirmedEvidence, EventHeader,
    FeatureRow, TimestampMs,
};
use tracing::trace;

/// Median of `values`, averaging the two middle values for even counts.
pub fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

/// Pre-window medians. A field with no values in the window has no baseline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Baseline {
    pub ret: Option<f64>,
    pub z_vol: Option<f64>,
    pub spread: Option<f64>,
    pub microprice_slope: Option<f64>,
}

impl Baseline {
    /// Median of each field over `rows`.
    pub fn from_rows<'a, I>(rows: I) -> Self
    where
        I: IntoIterator<Item = &'a FeatureRow>,
    {
        let mut ret = Vec::new();
        let mut z_vol = Vec::new();
        let mut spread = Vec::new();
        let mut slope = Vec::new();
        for row in rows {
            ret.extend(row.ret());
            z_vol.extend(row.z_vol());
            spread.extend(row.spread());
            slope.extend(row.microprice_slope());
        }
        Self {
            ret: median(&mut ret),
            z_vol: median(&mut z_vol),
            spread: median(&mut spread),
            microprice_slope: median(&mut slope),
        }
    }
}

/// Window bounds for one candidate, in epoch ms (both ends inclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowBounds {
    pub pre_start: TimestampMs,
    /// Last timestamp of the pre-window (`candidate.ts − 1`).
    pub pre_end: TimestampMs,
    pub confirm_start: TimestampMs,
    pub confirm_end: TimestampMs,
}

impl WindowBounds {
    pub fn in_pre(&self, ts: TimestampMs) -> bool {
        ts >= self.pre_start && ts <= self.pre_end
    }

    pub fn in_confirm(&self, ts: TimestampMs) -> bool {
        ts >= self.confirm_start && ts <= self.confirm_end
    }
}

/// Confirmation engine.
#[derive(Debug, Clone)]
pub struct ConfirmationEngine {
    config: ConfirmConfig,
}

impl ConfirmationEngine {
    pub fn new(config: ConfirmConfig) -> DetectorResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ConfirmConfig {
        &self.config
    }

    /// Pre- and confirm-window bounds of a candidate. Saturates at the
    /// ends of the timestamp range.
    pub fn bounds(&self, candidate: &CandidateEvent) -> WindowBounds {
        let ts = candidate.ts();
        let confirm_start = if self.config.exclude_candidate_row {
            ts.saturating_add(1)
        } else {
            ts
        };
        WindowBounds {
            // Open at the far end.
            pre_start: ts
                .saturating_sub(secs_to_ms(self.config.pre_window_s))
                .saturating_add(1),
            pre_end: ts.saturating_sub(1),
            confirm_start,
            confirm_end: ts.saturating_add(secs_to_ms(self.config.window_s)),
        }
    }

    /// Axes satisfied by `row` relative to `baseline`.
    pub fn axes(&self, row: &FeatureRow, baseline: &Baseline) -> AxisSet {
        let delta = &self.config.delta;
        let rise = |value: Option<f64>, base: Option<f64>, min: f64| match (value, base) {
            (Some(v), Some(b)) => v - b >= min,
            _ => false,
        };

        let price = rise(row.ret(), baseline.ret, delta.ret_min)
            || rise(
                row.microprice_slope(),
                baseline.microprice_slope,
                delta.ret_min,
            );
        let volume = rise(row.z_vol(), baseline.z_vol, delta.zvol_min);
        let friction = match (row.spread(), baseline.spread) {
            (Some(s), Some(b)) => b - s >= delta.spread_drop,
            _ => false,
        };
        AxisSet::new(price, volume, friction)
    }

    /// Whether a row with `axes` counts toward persistence.
    pub fn row_satisfied(&self, axes: &AxisSet) -> bool {
        if self.config.require_price_axis {
            axes.price && axes.non_price_count() + 1 >= self.config.min_axes
        } else {
            axes.len() >= self.config.min_axes
        }
    }

    /// Try to confirm `candidate` against `rows`.
    ///
    /// `rows` may hold several entities; only the candidate's entity is
    /// used, and its rows must be in timestamp order. Returns the
    /// confirmation at the earliest qualifying row, or None.
    pub fn confirm<'a, I>(&self, rows: I, candidate: &CandidateEvent) -> Option<ConfirmedEvent>
    where
        I: IntoIterator<Item = &'a FeatureRow>,
    {
        let bounds = self.bounds(candidate);
        let mut pre = Vec::new();
        let mut window = Vec::new();
        for row in rows {
            if &row.entity_id != candidate.entity_id() {
                continue;
            }
            if bounds.in_pre(row.ts) {
                pre.push(row);
            } else if bounds.in_confirm(row.ts) {
                window.push(row);
            }
        }

        let n = self.config.persistent_n;
        if pre.is_empty() || window.len() < n {
            trace!(
                entity_id = %candidate.entity_id(),
                ts = candidate.ts(),
                pre_rows = pre.len(),
                confirm_rows = window.len(),
                "Confirmation windows too short"
            );
            return None;
        }

        let baseline = Baseline::from_rows(pre.iter().copied());
        let mut persistence = PersistenceWindow::new(n);
        for row in window {
            let axes = self.axes(row, &baseline);
            persistence.push(self.row_satisfied(&axes));
            if persistence.is_complete() {
                return Some(self.build_event(candidate, row, &baseline, axes));
            }
        }
        None
    }

    fn build_event(
        &self,
        candidate: &CandidateEvent,
        row: &FeatureRow,
        baseline: &Baseline,
        axes: AxisSet,
    ) -> ConfirmedEvent {
        let diff = |value: Option<f64>, base: Option<f64>| value.zip(base).map(|(v, b)| v - b);
        ConfirmedEvent {
            header: EventHeader::new(row.ts, row.entity_id.clone()),
            confirmed_from: candidate.ts(),
            evidence: ConfirmedEvidence {
                axes,
                onset_strength: axes.strength(),
                ret_1s: row.ret(),
                z_vol_1s: row.z_vol(),
                spread: row.spread(),
                microprice_slope: row.microprice_slope(),
                delta_ret: diff(row.ret(), baseline.ret),
                delta_zvol: diff(row.z_vol(), baseline.z_vol),
                delta_spread: diff(baseline.spread, row.spread()),
            },
            price: row.price(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeltaConfig;
    use onset_core::{CandidateEvidence, EntityId};

    const T: i64 = 1_000_000;

    fn config(persistent_n: usize) -> ConfirmConfig {
        ConfirmConfig {
            window_s: 20.0,
            pre_window_s: 10.0,
            min_axes: 2,
            persistent_n,
            require_price_axis: true,
            exclude_candidate_row: true,
            delta: DeltaConfig {
                ret_min: 0.001,
                zvol_min: 1.0,
                spread_drop: 0.005,
            },
        }
    }

    fn candidate(ts: i64) -> CandidateEvent {
        CandidateEvent {
            header: EventHeader::new(ts, EntityId::new("XYZ")),
            score: 10.0,
            evidence: CandidateEvidence {
                ret_1s: 0.002,
                accel_1s: 0.0,
                z_vol_1s: 3.0,
                ticks_per_sec: 6.0,
                spread: None,
                microprice_slope: None,
                price: None,
            },
        }
    }

    fn row(ts: i64, ret: f64, z_vol: f64, spread: f64) -> FeatureRow {
        FeatureRow {
            ret_1s: Some(ret),
            accel_1s: Some(0.0),
            z_vol_1s: Some(z_vol),
            ticks_per_sec: Some(5.0),
            spread: Some(spread),
            microprice_slope: Some(0.0),
            price: Some(100.0),
            ..FeatureRow::empty(ts, "XYZ")
        }
    }

    /// Ten quiet pre-window rows: ret 0.001, z_vol 0, spread 0.02.
    fn quiet_pre() -> Vec<FeatureRow> {
        (1..=10).map(|i| row(T - i * 1000, 0.0010, 0.0, 0.02)).rev().collect()
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&mut Vec::<f64>::new()), None);
        assert_eq!(median(&mut [3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&mut [4.0, 1.0, 3.0, 2.0]), Some(2.5));
    }

    #[test]
    fn test_bounds() {
        let engine = ConfirmationEngine::new(config(3)).unwrap();
        let b = engine.bounds(&candidate(T));
        assert_eq!(b.pre_start, T - 9_999);
        assert_eq!(b.pre_end, T - 1);
        assert_eq!(b.confirm_start, T + 1);
        assert_eq!(b.confirm_end, T + 20_000);
        assert!(!b.in_pre(T - 10_000));
        assert!(b.in_pre(T - 9_999));
        assert!(!b.in_pre(T));

        let inclusive = ConfirmationEngine::new(ConfirmConfig {
            exclude_candidate_row: false,
            ..config(3)
        })
        .unwrap();
        assert_eq!(inclusive.bounds(&candidate(T)).confirm_start, T);
    }

    #[test]
    fn test_huge_windows_saturate() {
        let engine = ConfirmationEngine::new(ConfirmConfig {
            window_s: 1e17,
            pre_window_s: 1e17,
            ..config(2)
        })
        .unwrap();
        let b = engine.bounds(&candidate(T));
        assert_eq!(b.confirm_end, i64::MAX);
        assert_eq!(b.pre_start, T - i64::MAX + 1);

        let mut rows = quiet_pre();
        rows.push(row(T + 1000, 0.004, 2.0, 0.02));
        rows.push(row(T + 2000, 0.004, 2.0, 0.02));
        assert_eq!(
            engine.confirm(&rows, &candidate(T)).unwrap().ts(),
            T + 2_000
        );
    }

    #[test]
    fn test_fires_exactly_when_run_completes() {
        // persistent_n = 15, rows T+1s..T+15s all satisfy price + volume.
        let engine = ConfirmationEngine::new(config(15)).unwrap();
        let mut rows = quiet_pre();
        rows.push(row(T, 0.003, 3.0, 0.02));
        for i in 1..=15 {
            rows.push(row(T + i * 1000, 0.004, 2.0, 0.02));
        }
        let confirmed = engine.confirm(&rows, &candidate(T)).unwrap();
        assert_eq!(confirmed.ts(), T + 15_000);
        assert_eq!(confirmed.confirmed_from, T);
        assert_eq!(confirmed.tta_ms(), 15_000);
        assert!(confirmed.evidence.axes.price);
        assert!(confirmed.evidence.axes.volume);
        assert!(!confirmed.evidence.axes.friction);
        assert!((confirmed.evidence.onset_strength - 2.0 / 3.0).abs() < 1e-12);
        assert!((confirmed.evidence.delta_ret.unwrap() - 0.003).abs() < 1e-12);
        assert_eq!(confirmed.evidence.delta_zvol, Some(2.0));
        assert_eq!(confirmed.evidence.delta_spread, Some(0.0));
    }

    #[test]
    fn test_earliest_qualifying_row_wins() {
        let engine = ConfirmationEngine::new(config(3)).unwrap();
        let mut rows = quiet_pre();
        // T+1 fails, T+2..T+4 pass, T+5.. pass too.
        rows.push(row(T + 1000, 0.001, 0.0, 0.02));
        for i in 2..=8 {
            rows.push(row(T + i * 1000, 0.004, 2.0, 0.02));
        }
        let confirmed = engine.confirm(&rows, &candidate(T)).unwrap();
        assert_eq!(confirmed.ts(), T + 4_000);
    }

    #[test]
    fn test_interrupted_run_restarts() {
        let engine = ConfirmationEngine::new(config(3)).unwrap();
        let mut rows = quiet_pre();
        rows.push(row(T + 1000, 0.004, 2.0, 0.02));
        rows.push(row(T + 2000, 0.004, 2.0, 0.02));
        rows.push(row(T + 3000, 0.001, 0.0, 0.02));
        rows.push(row(T + 4000, 0.004, 2.0, 0.02));
        rows.push(row(T + 5000, 0.004, 2.0, 0.02));
        assert!(engine.confirm(&rows, &candidate(T)).is_none());
        rows.push(row(T + 6000, 0.004, 2.0, 0.02));
        assert_eq!(
            engine.confirm(&rows, &candidate(T)).unwrap().ts(),
            T + 6_000
        );
    }

    #[test]
    fn test_volume_and_friction_without_price_never_confirm() {
        // min_axes = 2, require_price_axis: volume + friction is not enough.
        let engine = ConfirmationEngine::new(config(3)).unwrap();
        let mut rows = quiet_pre();
        for i in 1..=20 {
            rows.push(row(T + i * 1000, 0.001, 5.0, 0.001));
        }
        assert!(engine.confirm(&rows, &candidate(T)).is_none());
    }

    #[test]
    fn test_without_price_requirement_two_axes_suffice() {
        let engine = ConfirmationEngine::new(ConfirmConfig {
            require_price_axis: false,
            ..config(3)
        })
        .unwrap();
        let mut rows = quiet_pre();
        for i in 1..=3 {
            rows.push(row(T + i * 1000, 0.001, 5.0, 0.001));
        }
        let confirmed = engine.confirm(&rows, &candidate(T)).unwrap();
        assert_eq!(confirmed.evidence.axes, AxisSet::new(false, true, true));
        assert!((confirmed.evidence.delta_spread.unwrap() - 0.019).abs() < 1e-12);
    }

    #[test]
    fn test_microprice_slope_satisfies_price_axis() {
        let engine = ConfirmationEngine::new(config(1)).unwrap();
        let baseline = Baseline {
            ret: Some(0.001),
            z_vol: Some(0.0),
            spread: Some(0.02),
            microprice_slope: Some(0.0),
        };
        let mut r = row(T + 1000, 0.001, 2.0, 0.02);
        r.microprice_slope = Some(0.002);
        let axes = engine.axes(&r, &baseline);
        assert!(axes.price);
        assert!(engine.row_satisfied(&axes));
    }

    #[test]
    fn test_short_or_empty_windows() {
        let engine = ConfirmationEngine::new(config(5)).unwrap();

        // Empty pre-window.
        let rows: Vec<_> = (1..=10).map(|i| row(T + i * 1000, 0.01, 5.0, 0.0)).collect();
        assert!(engine.confirm(&rows, &candidate(T)).is_none());

        // Confirm window shorter than persistent_n.
        let mut rows = quiet_pre();
        for i in 1..=4 {
            rows.push(row(T + i * 1000, 0.01, 5.0, 0.0));
        }
        assert!(engine.confirm(&rows, &candidate(T)).is_none());
    }

    #[test]
    fn test_rows_after_window_end_ignored() {
        let engine = ConfirmationEngine::new(config(3)).unwrap();
        let mut rows = quiet_pre();
        for i in 21..=30 {
            rows.push(row(T + i * 1000, 0.01, 5.0, 0.0));
        }
        assert!(engine.confirm(&rows, &candidate(T)).is_none());
    }

    #[test]
    fn test_other_entities_ignored() {
        let engine = ConfirmationEngine::new(config(2)).unwrap();
        let mut rows = quiet_pre();
        for i in 1..=5 {
            let mut other = row(T + i * 1000, 0.01, 5.0, 0.0);
            other.entity_id = EntityId::new("OTHER");
            rows.push(other);
        }
        assert!(engine.confirm(&rows, &candidate(T)).is_none());
    }

    #[test]
    fn test_missing_fields_count_as_unsatisfied() {
        let engine = ConfirmationEngine::new(config(2)).unwrap();
        let mut rows = quiet_pre();
        let mut gap = row(T + 1000, 0.004, 2.0, 0.02);
        gap.ret_1s = None;
        gap.microprice_slope = None;
        rows.push(gap);
        rows.push(row(T + 2000, 0.004, 2.0, 0.02));
        rows.push(row(T + 3000, 0.004, 2.0, 0.02));
        assert_eq!(
            engine.confirm(&rows, &candidate(T)).unwrap().ts(),
            T + 3_000
        );
    }

    #[test]
    fn test_onset_strength_is_never_zero() {
        let engine = ConfirmationEngine::new(ConfirmConfig {
            min_axes: 1,
            require_price_axis: false,
            ..config(1)
        })
        .unwrap();
        let mut rows = quiet_pre();
        rows.push(row(T + 1000, 0.001, 0.0, 0.02));
        rows.push(row(T + 2000, 0.001, 0.0, 0.01));
        let confirmed = engine.confirm(&rows, &candidate(T)).unwrap();
        assert_eq!(confirmed.ts(), T + 2_000);
        assert!((confirmed.evidence.onset_strength - 1.0 / 3.0).abs() < 1e-12);
    }
}
