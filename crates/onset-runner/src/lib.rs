//! Command-line runner for the onset detector.
//!
//! - `batch`: score a whole JSON-lines file at once
//! - `stream`: process rows as they arrive on stdin or from a file

pub mod app;
pub mod config;
pub mod error;

pub use app::{run_batch, run_stream};
pub use config::load_config;
pub use error::{RunnerError, RunnerResult};
