//! Onset detection pipeline.
//!
//! Wires the candidate gate, refractory policy and confirmation engine
//! together, either over a whole batch ([`OnsetPipeline`]) or one row at a
//! time ([`StreamingPipeline`]).

pub mod config;
pub mod error;
pub mod pipeline;
pub mod report;
pub mod stream;

pub use config::{PipelineConfig, StreamConfig};
pub use error::{PipelineError, PipelineResult};
pub use pipeline::OnsetPipeline;
pub use report::{Diagnostics, PipelineReport, RunCounts, TtaSummary};
pub use stream::{StreamStats, StreamingPipeline};
