//! Online change-point pre-filter.
//!
//! Suppresses scoring until a statistically significant shift is seen:
//! - Price axis: one-sided CUSUM on the standardized 1-second return,
//!   against a Welford running mean/variance.
//! - Volume axis: Page–Hinkley test on the volume z-score.
//!
//! Each entity bootstraps first (baseline accumulation only, gate closed).
//! After any opening the entity's gate stays shut for `cooldown_s`, shared
//! across both axes.

use crate::config::CpdConfig;
use onset_core::{secs_to_ms, EntityId, FeatureRow, TimestampMs};
use onset_telemetry::Metrics;
use std::collections::HashMap;
use tracing::debug;

/// Input of one CPD step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CpdSample {
    pub ts: TimestampMs,
    pub ret: Option<f64>,
    pub z_vol: Option<f64>,
}

impl From<&FeatureRow> for CpdSample {
    fn from(row: &FeatureRow) -> Self {
        Self {
            ts: row.ts,
            ret: row.ret(),
            z_vol: row.z_vol(),
        }
    }
}

/// Outcome of one CPD step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpdDecision {
    /// CUSUM on return crossed its threshold.
    pub price_fired: bool,
    /// Page–Hinkley on volume crossed its threshold.
    pub volume_fired: bool,
    /// A detection outside the cooldown: the row may be scored.
    pub gate_open: bool,
}

impl CpdDecision {
    pub fn detected(&self) -> bool {
        self.price_fired || self.volume_fired
    }

    fn axis_label(&self) -> &'static str {
        match (self.price_fired, self.volume_fired) {
            (true, true) => "both",
            (true, false) => "price",
            (false, true) => "volume",
            (false, false) => "none",
        }
    }
}

/// Per-entity CPD accumulators.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CpdState {
    /// Rows seen, with or without values.
    samples: u64,
    // Welford baseline of the return.
    ret_n: u64,
    ret_mean: f64,
    ret_m2: f64,
    cusum_pos: f64,
    cusum_neg: f64,
    // Page–Hinkley on volume z-score.
    ph_n: u64,
    ph_mean: f64,
    ph_sum: f64,
    ph_max: f64,
    last_open_ts: Option<TimestampMs>,
}

impl CpdState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the baseline has accumulated `min_pre_s` worth of samples.
    pub fn is_bootstrapped(&self, config: &CpdConfig) -> bool {
        self.samples as f64 * config.sample_interval_s >= config.price.min_pre_s
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }

    pub fn ret_mean(&self) -> f64 {
        self.ret_mean
    }

    /// Sample standard deviation of the return baseline (0 with fewer than 2 values).
    pub fn ret_std(&self) -> f64 {
        if self.ret_n < 2 {
            return 0.0;
        }
        (self.ret_m2 / (self.ret_n - 1) as f64).sqrt()
    }

    pub fn cusum_pos(&self) -> f64 {
        self.cusum_pos
    }

    pub fn cusum_neg(&self) -> f64 {
        self.cusum_neg
    }

    /// Page–Hinkley distance from the running maximum, `M − S`.
    pub fn ph_drawdown(&self) -> f64 {
        self.ph_max - self.ph_sum
    }

    pub fn last_open_ts(&self) -> Option<TimestampMs> {
        self.last_open_ts
    }

    /// Pure step: returns the next state and the decision, leaving `self` intact.
    pub fn step(&self, sample: CpdSample, config: &CpdConfig) -> (CpdState, CpdDecision) {
        let mut next = self.clone();
        let decision = next.update(sample, config);
        (next, decision)
    }

    /// Advance the state by one sample.
    ///
    /// Never fails. A missing value makes its axis non-firing and leaves
    /// that axis' statistics untouched.
    pub fn update(&mut self, sample: CpdSample, config: &CpdConfig) -> CpdDecision {
        let armed = self.is_bootstrapped(config);

        let price_fired = match sample.ret {
            Some(x) => {
                let fired = armed && self.cusum_step(x, config);
                self.welford_push(x);
                fired
            }
            None => false,
        };

        let volume_fired = match sample.z_vol {
            Some(x) => {
                let drawdown = self.page_hinkley_push(x, config);
                let fired = armed && drawdown > config.volume.lambda;
                if fired {
                    self.ph_sum = 0.0;
                    self.ph_max = 0.0;
                }
                fired
            }
            None => false,
        };

        self.samples += 1;

        let mut decision = CpdDecision {
            price_fired,
            volume_fired,
            gate_open: false,
        };
        if decision.detected() {
            let cooldown_ms = secs_to_ms(config.cooldown_s);
            let cooled = self
                .last_open_ts
                .map_or(true, |last| sample.ts.saturating_sub(last) >= cooldown_ms);
            if cooled {
                self.last_open_ts = Some(sample.ts);
                decision.gate_open = true;
            }
        }
        decision
    }

    fn welford_push(&mut self, x: f64) {
        self.ret_n += 1;
        let delta = x - self.ret_mean;
        self.ret_mean += delta / self.ret_n as f64;
        self.ret_m2 += delta * (x - self.ret_mean);
    }

    /// CUSUM on the standardized return with allowance `k = k_sigma · σ`
    /// and threshold `h_mult · k`. Returns true when the positive side fires.
    fn cusum_step(&mut self, x: f64, config: &CpdConfig) -> bool {
        let sigma = self.ret_std();
        if !(sigma.is_finite() && sigma > 0.0) {
            return false;
        }
        let z = (x - self.ret_mean) / sigma;
        let k = config.price.k_sigma * sigma;
        self.cusum_pos = (self.cusum_pos + z - k).max(0.0);
        self.cusum_neg = (self.cusum_neg - z - k).max(0.0);

        let fired = self.cusum_pos > config.price.h_mult * k;
        if fired {
            self.cusum_pos = 0.0;
        }
        fired
    }

    /// Update the Page–Hinkley statistics; returns `M − S`.
    fn page_hinkley_push(&mut self, x: f64, config: &CpdConfig) -> f64 {
        self.ph_n += 1;
        self.ph_mean += (x - self.ph_mean) / self.ph_n as f64;
        self.ph_sum += x - self.ph_mean - config.volume.delta;
        self.ph_max = self.ph_max.max(self.ph_sum);
        self.ph_drawdown()
    }
}

/// Per-entity CPD gate.
#[derive(Debug, Clone)]
pub struct CpdGate {
    config: CpdConfig,
    states: HashMap<EntityId, CpdState>,
}

impl CpdGate {
    pub fn new(config: CpdConfig) -> Self {
        Self {
            config,
            states: HashMap::new(),
        }
    }

    pub fn config(&self) -> &CpdConfig {
        &self.config
    }

    /// Feed one row; returns whether the gate opened for it.
    pub fn observe(&mut self, row: &FeatureRow) -> CpdDecision {
        let state = self.states.entry(row.entity_id.clone()).or_default();
        let decision = state.update(CpdSample::from(row), &self.config);

        if decision.gate_open {
            debug!(
                entity_id = %row.entity_id,
                ts = row.ts,
                axis = decision.axis_label(),
                "CPD gate opened"
            );
            Metrics::cpd_opened(decision.axis_label());
        } else if decision.detected() {
            debug!(
                entity_id = %row.entity_id,
                ts = row.ts,
                axis = decision.axis_label(),
                "CPD detection suppressed by cooldown"
            );
        }
        decision
    }

    pub fn state(&self, entity_id: &EntityId) -> Option<&CpdState> {
        self.states.get(entity_id)
    }

    /// Drop all per-entity state.
    pub fn reset(&mut self) {
        self.states.clear();
    }
}
