//! Error types for onset-core.

use thiserror::Error;

/// Input schema violations.
///
/// A schema error is fatal: the batch or stream it belongs to is aborted
/// before any event is produced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("Required column missing from input schema: {0}")]
    MissingColumn(&'static str),

    #[error("Required column {column} missing at line {line}")]
    MissingInRow { column: &'static str, line: usize },

    #[error("Line {line} is not a JSON object")]
    NotAnObject { line: usize },
}

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Parse error at line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
