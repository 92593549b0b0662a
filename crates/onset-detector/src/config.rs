//! Detector configuration.
//!
//! Three sections, each deserializable on its own:
//! - `DetectorConfig`: score gate thresholds and weights
//! - `ConfirmConfig`: pre/confirm windows, axis deltas and persistence
//! - `CpdConfig`: change-point pre-filter (CUSUM on return, Page–Hinkley on volume)

use crate::error::{DetectorError, DetectorResult};
use serde::{Deserialize, Serialize};

fn ensure(cond: bool, msg: impl FnOnce() -> String) -> DetectorResult<()> {
    if cond {
        Ok(())
    } else {
        Err(DetectorError::ConfigError(msg()))
    }
}

fn ensure_finite(name: &str, value: f64) -> DetectorResult<()> {
    ensure(value.is_finite(), || format!("{name} ({value}) must be finite"))
}

fn ensure_positive(name: &str, value: f64) -> DetectorResult<()> {
    ensure(value.is_finite() && value > 0.0, || {
        format!("{name} ({value}) must be positive")
    })
}

// ============================================================================
// Score gate
// ============================================================================

/// Per-feature weights of the candidate score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub ret: f64,
    pub accel: f64,
    pub z_vol: f64,
    pub ticks: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            ret: 1000.0,
            accel: 500.0,
            z_vol: 1.0,
            ticks: 0.1,
        }
    }
}

impl ScoreWeights {
    /// Weighted sum of the four scored features.
    pub fn score(&self, ret: f64, accel: f64, z_vol: f64, ticks: f64) -> f64 {
        self.ret * ret + self.accel * accel + self.z_vol * z_vol + self.ticks * ticks
    }
}

/// Configuration for the candidate score gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Minimum weighted score.
    #[serde(default = "default_score_threshold")]
    pub score_threshold: f64,
    /// Minimum 1-second volume z-score.
    #[serde(default = "default_vol_z_min")]
    pub vol_z_min: f64,
    /// Minimum ticks per second.
    #[serde(default = "default_ticks_min")]
    pub ticks_min: f64,
    #[serde(default)]
    pub weights: ScoreWeights,
}

fn default_score_threshold() -> f64 {
    4.0
}

fn default_vol_z_min() -> f64 {
    2.0
}

fn default_ticks_min() -> f64 {
    3.0
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            score_threshold: default_score_threshold(),
            vol_z_min: default_vol_z_min(),
            ticks_min: default_ticks_min(),
            weights: ScoreWeights::default(),
        }
    }
}

impl DetectorConfig {
    /// Validate configuration values.
    ///
    /// Every threshold and weight must be finite.
    pub fn validate(&self) -> DetectorResult<()> {
        ensure_finite("score_threshold", self.score_threshold)?;
        ensure_finite("vol_z_min", self.vol_z_min)?;
        ensure_finite("ticks_min", self.ticks_min)?;
        ensure_finite("weights.ret", self.weights.ret)?;
        ensure_finite("weights.accel", self.weights.accel)?;
        ensure_finite("weights.z_vol", self.weights.z_vol)?;
        ensure_finite("weights.ticks", self.weights.ticks)?;
        Ok(())
    }
}

// ============================================================================
// Confirmation
// ============================================================================

/// Minimum improvements over the pre-window baseline, per axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeltaConfig {
    /// Return (or microprice slope) rise for the price axis.
    pub ret_min: f64,
    /// Volume z-score rise for the volume axis.
    pub zvol_min: f64,
    /// Spread tightening for the friction axis.
    pub spread_drop: f64,
}

impl Default for DeltaConfig {
    fn default() -> Self {
        Self {
            ret_min: 0.0005,
            zvol_min: 0.5,
            spread_drop: 0.0,
        }
    }
}

/// Configuration for the confirmation engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmConfig {
    /// Confirm window length after the candidate (seconds).
    #[serde(default = "default_window_s")]
    pub window_s: f64,
    /// Baseline window length before the candidate (seconds).
    #[serde(default = "default_pre_window_s")]
    pub pre_window_s: f64,
    /// Axes a row must satisfy (1..=3).
    #[serde(default = "default_min_axes")]
    pub min_axes: usize,
    /// Consecutive satisfied rows needed to confirm.
    #[serde(default = "default_persistent_n")]
    pub persistent_n: usize,
    /// Price axis is mandatory for a row to count.
    #[serde(default = "default_require_price_axis")]
    pub require_price_axis: bool,
    /// Start the confirm window 1 ms after the candidate, leaving its own row out.
    #[serde(default = "default_exclude_candidate_row")]
    pub exclude_candidate_row: bool,
    #[serde(default)]
    pub delta: DeltaConfig,
}

fn default_window_s() -> f64 {
    20.0
}

fn default_pre_window_s() -> f64 {
    10.0
}

fn default_min_axes() -> usize {
    2
}

fn default_persistent_n() -> usize {
    3
}

fn default_require_price_axis() -> bool {
    true
}

fn default_exclude_candidate_row() -> bool {
    true
}

impl Default for ConfirmConfig {
    fn default() -> Self {
        Self {
            window_s: default_window_s(),
            pre_window_s: default_pre_window_s(),
            min_axes: default_min_axes(),
            persistent_n: default_persistent_n(),
            require_price_axis: default_require_price_axis(),
            exclude_candidate_row: default_exclude_candidate_row(),
            delta: DeltaConfig::default(),
        }
    }
}

impl ConfirmConfig {
    /// Validate configuration values.
    ///
    /// Returns Err if:
    /// - persistent_n is 0
    /// - min_axes is outside 1..=3
    /// - either window is not positive
    /// - a delta is not finite
    pub fn validate(&self) -> DetectorResult<()> {
        ensure(self.persistent_n > 0, || {
            "persistent_n must be at least 1".to_string()
        })?;
        ensure((1..=3).contains(&self.min_axes), || {
            format!("min_axes ({}) must be between 1 and 3", self.min_axes)
        })?;
        ensure_positive("window_s", self.window_s)?;
        ensure_positive("pre_window_s", self.pre_window_s)?;
        ensure_finite("delta.ret_min", self.delta.ret_min)?;
        ensure_finite("delta.zvol_min", self.delta.zvol_min)?;
        ensure_finite("delta.spread_drop", self.delta.spread_drop)?;
        Ok(())
    }
}

// ============================================================================
// Change-point pre-filter
// ============================================================================

/// CUSUM parameters for the return axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CpdPriceConfig {
    /// Drift allowance in standard deviations.
    pub k_sigma: f64,
    /// Decision threshold as a multiple of the allowance.
    pub h_mult: f64,
    /// Baseline accumulation before the test is armed (seconds).
    pub min_pre_s: f64,
}

impl Default for CpdPriceConfig {
    fn default() -> Self {
        Self {
            k_sigma: 0.5,
            h_mult: 8.0,
            min_pre_s: 30.0,
        }
    }
}

/// Page–Hinkley parameters for the volume axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CpdVolumeConfig {
    /// Magnitude tolerance subtracted from each deviation.
    pub delta: f64,
    /// Alarm threshold.
    #[serde(rename = "lambda_")]
    pub lambda: f64,
}

impl Default for CpdVolumeConfig {
    fn default() -> Self {
        Self {
            delta: 0.05,
            lambda: 5.0,
        }
    }
}

/// Configuration for the change-point pre-filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpdConfig {
    /// Enable the pre-filter. When false every complete row reaches scoring.
    #[serde(rename = "use", default)]
    pub enabled: bool,
    /// Spacing of feature rows (seconds), used to size the bootstrap.
    #[serde(default = "default_sample_interval_s")]
    pub sample_interval_s: f64,
    #[serde(default)]
    pub price: CpdPriceConfig,
    #[serde(default)]
    pub volume: CpdVolumeConfig,
    /// Minimum spacing between gate openings per entity (seconds).
    #[serde(default = "default_cpd_cooldown_s")]
    pub cooldown_s: f64,
}

fn default_sample_interval_s() -> f64 {
    1.0
}

fn default_cpd_cooldown_s() -> f64 {
    5.0
}

impl Default for CpdConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            sample_interval_s: default_sample_interval_s(),
            price: CpdPriceConfig::default(),
            volume: CpdVolumeConfig::default(),
            cooldown_s: default_cpd_cooldown_s(),
        }
    }
}

impl CpdConfig {
    /// Validate configuration values. Only checked when enabled.
    pub fn validate(&self) -> DetectorResult<()> {
        if !self.enabled {
            return Ok(());
        }
        ensure_positive("cpd.sample_interval_s", self.sample_interval_s)?;
        ensure_positive("cpd.price.k_sigma", self.price.k_sigma)?;
        ensure_positive("cpd.price.h_mult", self.price.h_mult)?;
        ensure(
            self.price.min_pre_s.is_finite() && self.price.min_pre_s >= 0.0,
            || format!("cpd.price.min_pre_s ({}) must be non-negative", self.price.min_pre_s),
        )?;
        ensure(
            self.volume.delta.is_finite() && self.volume.delta >= 0.0,
            || format!("cpd.volume.delta ({}) must be non-negative", self.volume.delta),
        )?;
        ensure_positive("cpd.volume.lambda_", self.volume.lambda)?;
        ensure(
            self.cooldown_s.is_finite() && self.cooldown_s >= 0.0,
            || format!("cpd.cooldown_s ({}) must be non-negative", self.cooldown_s),
        )?;
        Ok(())
    }
}
