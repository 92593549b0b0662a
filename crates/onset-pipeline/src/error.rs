//! Pipeline error types.

use onset_core::{CoreError, EntityId, SchemaError, TimestampMs};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Detector error: {0}")]
    Detector(#[from] onset_detector::DetectorError),

    #[error("Refractory error: {0}")]
    Refractory(#[from] onset_refractory::RefractoryError),

    #[error("Out-of-order row for {entity_id}: ts {ts} after {prev_ts}")]
    OutOfOrder {
        entity_id: EntityId,
        prev_ts: TimestampMs,
        ts: TimestampMs,
    },

    #[error("Input error: {0}")]
    Input(#[from] CoreError),
}

impl PipelineError {
    /// Error caused by invalid parameters rather than input data.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::Detector(_) | Self::Refractory(_)
        )
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
