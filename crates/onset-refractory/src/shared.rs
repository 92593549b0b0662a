//! Concurrent time-based refractory store.
//!
//! Same rule as [`RefractoryTracker`](crate::RefractoryTracker), but the
//! per-entity timestamps live in a `DashMap` so callers working on disjoint
//! entities from several threads never contend on a single lock.

use crate::config::RefractoryConfig;
use crate::error::RefractoryResult;
use crate::policy::{Admission, RefractoryPolicy};
use crate::time_based::{admit_after, next_confirm_ts};
use dashmap::DashMap;
use onset_core::{secs_to_ms, CandidateEvent, ConfirmedEvent, EntityId, TimestampMs};
use std::sync::Arc;
use tracing::debug;

/// Cloneable handle to a shared per-entity refractory map.
#[derive(Debug, Clone)]
pub struct SharedRefractoryStore {
    cooldown_ms: i64,
    extend_on_confirm: bool,
    last_confirm: Arc<DashMap<EntityId, TimestampMs>>,
}

impl SharedRefractoryStore {
    pub fn new(config: RefractoryConfig) -> RefractoryResult<Self> {
        config.validate()?;
        Ok(Self {
            cooldown_ms: secs_to_ms(config.duration_s),
            extend_on_confirm: config.extend_on_confirm,
            last_confirm: Arc::new(DashMap::new()),
        })
    }

    /// Admit check. Takes only a shared read guard on the entity's shard.
    pub fn try_admit(&self, candidate: &CandidateEvent) -> Admission {
        let last = self
            .last_confirm
            .get(candidate.entity_id())
            .map(|entry| *entry.value());
        admit_after(last, self.cooldown_ms, candidate)
    }

    /// Record a confirmation under the entity's entry lock. Returns the stored timestamp.
    pub fn record_confirm(&self, confirmed: &ConfirmedEvent) -> TimestampMs {
        let mut entry = self
            .last_confirm
            .entry(confirmed.entity_id().clone())
            .or_insert(confirmed.ts());
        let next = next_confirm_ts(Some(*entry), confirmed.ts(), self.extend_on_confirm);
        *entry = next;
        next
    }

    pub fn last_confirm_ts(&self, entity_id: &EntityId) -> Option<TimestampMs> {
        self.last_confirm.get(entity_id).map(|entry| *entry.value())
    }

    pub fn tracked_entities(&self) -> usize {
        self.last_confirm.len()
    }

    pub fn clear(&self) {
        self.last_confirm.clear();
    }
}

impl RefractoryPolicy for SharedRefractoryStore {
    fn name(&self) -> &'static str {
        "shared_time_based"
    }

    fn admit(&self, candidate: &CandidateEvent) -> Admission {
        self.try_admit(candidate)
    }

    fn on_confirm(&mut self, confirmed: &ConfirmedEvent) {
        let next = self.record_confirm(confirmed);
        debug!(
            entity_id = %confirmed.entity_id(),
            last_confirm_ts = next,
            cooldown_ms = self.cooldown_ms,
            "Refractory period started"
        );
    }

    fn reset(&mut self) {
        self.clear();
    }
}
