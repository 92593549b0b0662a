//! Fixed-duration refractory tracker.

use crate::config::RefractoryConfig;
use crate::error::RefractoryResult;
use crate::policy::{Admission, RefractoryPolicy};
use onset_core::{
    secs_to_ms, CandidateEvent, ConfirmedEvent, EntityId, RefractoryInfo, RejectedEvent,
    TimestampMs,
};
use std::collections::HashMap;
use tracing::debug;

/// Shared admit rule for the time-based variants.
pub(crate) fn admit_after(
    last_confirm_ts: Option<TimestampMs>,
    cooldown_ms: i64,
    candidate: &CandidateEvent,
) -> Admission {
    let Some(last) = last_confirm_ts else {
        return Admission::Allowed;
    };
    let until = last.saturating_add(cooldown_ms);
    if candidate.ts() >= until {
        return Admission::Allowed;
    }
    Admission::Rejected(RejectedEvent::for_candidate(
        candidate,
        RefractoryInfo {
            remaining_seconds: until.saturating_sub(candidate.ts()) as f64 / 1000.0,
            phase: None,
        },
    ))
}

/// Next stored confirmation timestamp. Never moves backwards.
pub(crate) fn next_confirm_ts(
    current: Option<TimestampMs>,
    confirmed_ts: TimestampMs,
    extend_on_confirm: bool,
) -> TimestampMs {
    match current {
        None => confirmed_ts,
        Some(last) if extend_on_confirm => last.max(confirmed_ts),
        Some(last) => last,
    }
}

/// Blocks candidates for `duration_s` after each confirmation of the same entity.
#[derive(Debug, Clone)]
pub struct RefractoryTracker {
    cooldown_ms: i64,
    extend_on_confirm: bool,
    last_confirm: HashMap<EntityId, TimestampMs>,
}

impl RefractoryTracker {
    pub fn new(config: RefractoryConfig) -> RefractoryResult<Self> {
        config.validate()?;
        Ok(Self {
            cooldown_ms: secs_to_ms(config.duration_s),
            extend_on_confirm: config.extend_on_confirm,
            last_confirm: HashMap::new(),
        })
    }

    pub fn last_confirm_ts(&self, entity_id: &EntityId) -> Option<TimestampMs> {
        self.last_confirm.get(entity_id).copied()
    }

    pub fn tracked_entities(&self) -> usize {
        self.last_confirm.len()
    }
}

impl RefractoryPolicy for RefractoryTracker {
    fn name(&self) -> &'static str {
        "time_based"
    }

    fn admit(&self, candidate: &CandidateEvent) -> Admission {
        admit_after(
            self.last_confirm_ts(candidate.entity_id()),
            self.cooldown_ms,
            candidate,
        )
    }

    fn on_confirm(&mut self, confirmed: &ConfirmedEvent) {
        let current = self.last_confirm_ts(confirmed.entity_id());
        let next = next_confirm_ts(current, confirmed.ts(), self.extend_on_confirm);
        self.last_confirm.insert(confirmed.entity_id().clone(), next);
        debug!(
            entity_id = %confirmed.entity_id(),
            last_confirm_ts = next,
            cooldown_ms = self.cooldown_ms,
            "Refractory period started"
        );
    }

    fn reset(&mut self) {
        self.last_confirm.clear();
    }
}
