//! Runner error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] onset_pipeline::PipelineError),

    #[error("Input error: {0}")]
    Input(#[from] onset_core::CoreError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] onset_telemetry::TelemetryError),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for RunnerError {
    fn from(e: config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}

pub type RunnerResult<T> = Result<T, RunnerError>;
