//! Refractory configuration.

use crate::error::{RefractoryError, RefractoryResult};
use serde::{Deserialize, Serialize};

/// Which refractory policy to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefractoryMode {
    /// Fixed cooldown after each confirmation.
    #[default]
    TimeBased,
    /// Price-driven IDLE → ONSET → PEAK → DECAY → IDLE cycle.
    StateMachine,
}

/// Parameters of the price-driven state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateMachineConfig {
    /// Time after onset before the peak phase starts (seconds).
    #[serde(default = "default_peak_detect_window_s")]
    pub peak_detect_window_s: f64,
    /// Drop below the tracked peak that starts the decay phase (percent).
    #[serde(default = "default_decay_threshold_pct")]
    pub decay_threshold_pct: f64,
    /// Continuous decay needed to return to idle (seconds).
    #[serde(default = "default_min_decay_duration_s")]
    pub min_decay_duration_s: f64,
}

fn default_peak_detect_window_s() -> f64 {
    10.0
}

fn default_decay_threshold_pct() -> f64 {
    2.0
}

fn default_min_decay_duration_s() -> f64 {
    30.0
}

impl Default for StateMachineConfig {
    fn default() -> Self {
        Self {
            peak_detect_window_s: default_peak_detect_window_s(),
            decay_threshold_pct: default_decay_threshold_pct(),
            min_decay_duration_s: default_min_decay_duration_s(),
        }
    }
}

/// Refractory configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefractoryConfig {
    #[serde(default)]
    pub mode: RefractoryMode,
    /// Cooldown after a confirmation (seconds).
    #[serde(default = "default_duration_s")]
    pub duration_s: f64,
    /// Restart the cooldown on every confirmation. When false the first
    /// confirmation timestamp is kept.
    #[serde(default = "default_extend_on_confirm")]
    pub extend_on_confirm: bool,
    #[serde(default)]
    pub state_machine: StateMachineConfig,
}

fn default_duration_s() -> f64 {
    45.0
}

fn default_extend_on_confirm() -> bool {
    true
}

impl Default for RefractoryConfig {
    fn default() -> Self {
        Self {
            mode: RefractoryMode::default(),
            duration_s: default_duration_s(),
            extend_on_confirm: default_extend_on_confirm(),
            state_machine: StateMachineConfig::default(),
        }
    }
}

impl RefractoryConfig {
    /// Validate configuration values.
    ///
    /// Returns Err if:
    /// - duration_s is negative or not finite
    /// - (state machine) a window is negative, or decay_threshold_pct is outside (0, 100)
    pub fn validate(&self) -> RefractoryResult<()> {
        if !(self.duration_s.is_finite() && self.duration_s >= 0.0) {
            return Err(RefractoryError::ConfigError(format!(
                "duration_s ({}) must be non-negative",
                self.duration_s
            )));
        }

        if self.mode == RefractoryMode::StateMachine {
            let sm = &self.state_machine;
            if !(sm.peak_detect_window_s.is_finite() && sm.peak_detect_window_s >= 0.0) {
                return Err(RefractoryError::ConfigError(format!(
                    "peak_detect_window_s ({}) must be non-negative",
                    sm.peak_detect_window_s
                )));
            }
            if !(sm.min_decay_duration_s.is_finite() && sm.min_decay_duration_s >= 0.0) {
                return Err(RefractoryError::ConfigError(format!(
                    "min_decay_duration_s ({}) must be non-negative",
                    sm.min_decay_duration_s
                )));
            }
            if !(sm.decay_threshold_pct > 0.0 && sm.decay_threshold_pct < 100.0) {
                return Err(RefractoryError::ConfigError(format!(
                    "decay_threshold_pct ({}) must be within (0, 100)",
                    sm.decay_threshold_pct
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid_time_based() {
        let config = RefractoryConfig::default();
        assert_eq!(config.mode, RefractoryMode::TimeBased);
        assert_eq!(config.duration_s, 45.0);
        assert!(config.extend_on_confirm);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_negative_duration_rejected() {
        let config = RefractoryConfig {
            duration_s: -1.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_state_machine_pct_range() {
        let mut config = RefractoryConfig {
            mode: RefractoryMode::StateMachine,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        config.state_machine.decay_threshold_pct = 0.0;
        assert!(config.validate().is_err());
        config.state_machine.decay_threshold_pct = 100.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_mode() {
        let config: RefractoryConfig = toml::from_str(
            r#"
            mode = "state_machine"
            duration_s = 60

            [state_machine]
            decay_threshold_pct = 1.5
            "#,
        )
        .unwrap();
        assert_eq!(config.mode, RefractoryMode::StateMachine);
        assert_eq!(config.duration_s, 60.0);
        assert_eq!(config.state_machine.decay_threshold_pct, 1.5);
        assert_eq!(config.state_machine.min_decay_duration_s, 30.0);
    }
}
