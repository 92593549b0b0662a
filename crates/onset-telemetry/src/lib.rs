//! Prometheus metrics and structured logging for the onset engine.
//!
//! - Prometheus collectors for rows, candidates, confirmations and rejections
//! - Structured logging with tracing (JSON in production, pretty otherwise)

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;
