//! Price-driven refractory state machine.
//!
//! After a confirmation the entity walks IDLE → ONSET → PEAK → DECAY → IDLE
//! and only admits new candidates once back in IDLE. The walk is driven by
//! the `price` column fed through [`RefractoryPolicy::observe`].

use crate::config::{RefractoryConfig, StateMachineConfig};
use crate::error::RefractoryResult;
use crate::policy::{Admission, RefractoryPolicy};
use onset_core::{
    secs_to_ms, CandidateEvent, ConfirmedEvent, EntityId, FeatureField, FeatureRow,
    RefractoryInfo, RefractoryPhase, RejectedEvent, TimestampMs,
};
use std::collections::HashMap;
use tracing::debug;

/// Fraction of the peak a decaying price must regain to count as a new peak.
const RECOVERY_RATIO: f64 = 0.99;

const REQUIRED: [FeatureField; 1] = [FeatureField::Price];

#[derive(Debug, Clone, Copy)]
struct Params {
    peak_window_ms: i64,
    min_decay_ms: i64,
    decay_ratio: f64,
}

/// Per-entity phase and price tracking.
#[derive(Debug, Clone, Default)]
pub struct PhaseState {
    phase: RefractoryPhase,
    onset_ts: TimestampMs,
    peak: Option<f64>,
    decay_since: Option<TimestampMs>,
    last_price: Option<f64>,
}

impl PhaseState {
    pub fn phase(&self) -> RefractoryPhase {
        self.phase
    }

    /// Running max price since onset.
    pub fn peak(&self) -> Option<f64> {
        self.peak
    }

    pub fn last_price(&self) -> Option<f64> {
        self.last_price
    }

    fn track_peak(&mut self, price: f64) {
        self.peak = Some(self.peak.map_or(price, |peak| peak.max(price)));
    }

    fn enter_onset(&mut self, ts: TimestampMs, price: Option<f64>) {
        self.phase = RefractoryPhase::Onset;
        self.onset_ts = ts;
        self.peak = price.or(self.last_price);
        self.decay_since = None;
    }

    /// Apply one observation. Returns the new phase if it changed.
    fn advance(
        &mut self,
        ts: TimestampMs,
        price: Option<f64>,
        params: Params,
    ) -> Option<RefractoryPhase> {
        let before = self.phase;
        match self.phase {
            RefractoryPhase::Idle => {}
            RefractoryPhase::Onset => {
                if let Some(p) = price {
                    self.track_peak(p);
                }
                if ts.saturating_sub(self.onset_ts) >= params.peak_window_ms {
                    self.phase = RefractoryPhase::Peak;
                }
            }
            RefractoryPhase::Peak => {
                if let Some(p) = price {
                    self.track_peak(p);
                    if let Some(peak) = self.peak {
                        if p <= peak * params.decay_ratio {
                            self.phase = RefractoryPhase::Decay;
                            self.decay_since = Some(ts);
                        }
                    }
                }
            }
            RefractoryPhase::Decay => {
                if let (Some(p), Some(peak)) = (price, self.peak) {
                    let since = self.decay_since.unwrap_or(ts);
                    if p >= peak * RECOVERY_RATIO {
                        self.phase = RefractoryPhase::Peak;
                        self.decay_since = None;
                        self.track_peak(p);
                    } else if ts.saturating_sub(since) >= params.min_decay_ms {
                        self.phase = RefractoryPhase::Idle;
                        self.peak = None;
                        self.decay_since = None;
                    }
                }
            }
        }
        (self.phase != before).then_some(self.phase)
    }

    /// Lower bound on the time until IDLE, assuming the fastest possible walk.
    fn remaining_ms(&self, ts: TimestampMs, params: Params) -> i64 {
        match self.phase {
            RefractoryPhase::Idle => 0,
            RefractoryPhase::Onset => {
                self.onset_ts
                    .saturating_add(params.peak_window_ms)
                    .saturating_sub(ts)
                    .max(0)
                    .saturating_add(params.min_decay_ms)
            }
            RefractoryPhase::Peak => params.min_decay_ms,
            RefractoryPhase::Decay => {
                let since = self.decay_since.unwrap_or(ts);
                since
                    .saturating_add(params.min_decay_ms)
                    .saturating_sub(ts)
                    .max(0)
            }
        }
    }
}

/// Refractory policy that waits for the surge to peak and decay.
#[derive(Debug, Clone)]
pub struct PriceStateMachine {
    config: StateMachineConfig,
    params: Params,
    states: HashMap<EntityId, PhaseState>,
}

impl PriceStateMachine {
    pub fn new(config: RefractoryConfig) -> RefractoryResult<Self> {
        config.validate()?;
        let sm = config.state_machine;
        let params = Params {
            peak_window_ms: secs_to_ms(sm.peak_detect_window_s),
            min_decay_ms: secs_to_ms(sm.min_decay_duration_s),
            decay_ratio: 1.0 - sm.decay_threshold_pct / 100.0,
        };
        Ok(Self {
            config: sm,
            params,
            states: HashMap::new(),
        })
    }

    pub fn config(&self) -> &StateMachineConfig {
        &self.config
    }

    pub fn state(&self, entity_id: &EntityId) -> Option<&PhaseState> {
        self.states.get(entity_id)
    }

    pub fn phase(&self, entity_id: &EntityId) -> RefractoryPhase {
        self.state(entity_id)
            .map(PhaseState::phase)
            .unwrap_or_default()
    }
}

impl RefractoryPolicy for PriceStateMachine {
    fn name(&self) -> &'static str {
        "state_machine"
    }

    fn observe(&mut self, row: &FeatureRow) {
        let state = self.states.entry(row.entity_id.clone()).or_default();
        let price = row.price();
        if price.is_some() {
            state.last_price = price;
        }
        if let Some(phase) = state.advance(row.ts, price, self.params) {
            debug!(
                entity_id = %row.entity_id,
                ts = row.ts,
                phase = %phase,
                peak = ?state.peak,
                "Refractory phase changed"
            );
        }
    }

    fn admit(&self, candidate: &CandidateEvent) -> Admission {
        let Some(state) = self.states.get(candidate.entity_id()) else {
            return Admission::Allowed;
        };
        if state.phase == RefractoryPhase::Idle {
            return Admission::Allowed;
        }
        let remaining_ms = state.remaining_ms(candidate.ts(), self.params);
        Admission::Rejected(RejectedEvent::for_candidate(
            candidate,
            RefractoryInfo {
                remaining_seconds: remaining_ms as f64 / 1000.0,
                phase: Some(state.phase),
            },
        ))
    }

    fn on_confirm(&mut self, confirmed: &ConfirmedEvent) {
        let state = self
            .states
            .entry(confirmed.entity_id().clone())
            .or_default();
        state.enter_onset(confirmed.ts(), confirmed.price);
        debug!(
            entity_id = %confirmed.entity_id(),
            ts = confirmed.ts(),
            peak = ?state.peak,
            "Refractory phase changed to ONSET"
        );
    }

    fn required_fields(&self) -> &'static [FeatureField] {
        &REQUIRED
    }

    fn reset(&mut self) {
        self.states.clear();
    }
}
