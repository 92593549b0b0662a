//! Surge onset detection stages.
//!
//! - `CpdGate`: online change-point pre-filter (CUSUM on return, Page–Hinkley on volume)
//! - `CandidateGate`: weighted score and threshold check producing candidates
//! - `ConfirmationEngine`: pre-window baseline vs. confirm-window persistence check

pub mod candidate;
pub mod config;
pub mod confirm;
pub mod cpd;
pub mod error;
pub mod persistence;

pub use candidate::{CandidateGate, NON_NULL_FIELDS};
pub use config::{
    ConfirmConfig, CpdConfig, CpdPriceConfig, CpdVolumeConfig, DeltaConfig, DetectorConfig,
    ScoreWeights,
};
pub use confirm::{median, Baseline, ConfirmationEngine, WindowBounds};
pub use cpd::{CpdDecision, CpdGate, CpdSample, CpdState};
pub use error::{DetectorError, DetectorResult};
pub use persistence::PersistenceWindow;
