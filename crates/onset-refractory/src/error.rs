//! Refractory error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RefractoryError {
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

pub type RefractoryResult<T> = Result<T, RefractoryError>;
