//! Refractory policy seam.

use crate::config::{RefractoryConfig, RefractoryMode};
use crate::error::RefractoryResult;
use crate::state_machine::PriceStateMachine;
use crate::time_based::RefractoryTracker;
use onset_core::{CandidateEvent, ConfirmedEvent, FeatureField, FeatureRow, RejectedEvent};

/// Outcome of asking a policy whether a candidate may proceed.
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    Allowed,
    Rejected(RejectedEvent),
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }

    pub fn rejection(self) -> Option<RejectedEvent> {
        match self {
            Self::Allowed => None,
            Self::Rejected(event) => Some(event),
        }
    }
}

/// Per-entity suppression of repeat alerts.
///
/// Callers must feed each entity's rows, candidates and confirmations in
/// non-decreasing timestamp order. Interleaving across entities is fine.
pub trait RefractoryPolicy: Send {
    /// Short label used in logs and metrics.
    fn name(&self) -> &'static str;

    /// Observe a raw row. Only price-driven policies care.
    fn observe(&mut self, _row: &FeatureRow) {}

    /// Decide whether `candidate` may go on to confirmation.
    fn admit(&self, candidate: &CandidateEvent) -> Admission;

    /// Record a confirmed onset.
    fn on_confirm(&mut self, confirmed: &ConfirmedEvent);

    /// Columns this policy needs beyond the scored features.
    fn required_fields(&self) -> &'static [FeatureField] {
        &[]
    }

    /// Forget all entity state.
    fn reset(&mut self);
}

/// Build the policy selected by `config.mode`.
pub fn build_policy(config: &RefractoryConfig) -> RefractoryResult<Box<dyn RefractoryPolicy>> {
    config.validate()?;
    let policy: Box<dyn RefractoryPolicy> = match config.mode {
        RefractoryMode::TimeBased => Box::new(RefractoryTracker::new(config.clone())?),
        RefractoryMode::StateMachine => Box::new(PriceStateMachine::new(config.clone())?),
    };
    Ok(policy)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_policy_by_mode() {
        let time = build_policy(&RefractoryConfig::default()).unwrap();
        assert_eq!(time.name(), "time_based");
        assert!(time.required_fields().is_empty());

        let sm = build_policy(&RefractoryConfig {
            mode: RefractoryMode::StateMachine,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(sm.name(), "state_machine");
        assert_eq!(sm.required_fields(), &[FeatureField::Price]);
    }

    #[test]
    fn test_build_policy_validates() {
        let config = RefractoryConfig {
            duration_s: f64::NAN,
            ..Default::default()
        };
        assert!(build_policy(&config).is_err());
    }
}
