//! Aggregate pipeline configuration.
//!
//! ```toml
//! [detector]
//! score_threshold = 4.0
//!
//! [confirm]
//! window_s = 20
//! persistent_n = 3
//!
//! [refractory]
//! mode = "time_based"
//! duration_s = 45
//!
//! [cpd]
//! use = true
//!
//! [stream]
//! buffer_rows = 1000
//! ```

use crate::error::{PipelineError, PipelineResult};
use onset_detector::{ConfirmConfig, CpdConfig, DetectorConfig};
use onset_refractory::RefractoryConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Streaming ring buffer settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Rows kept in the ring buffer (all entities together).
    #[serde(default = "default_buffer_rows")]
    pub buffer_rows: usize,
}

fn default_buffer_rows() -> usize {
    1000
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            buffer_rows: default_buffer_rows(),
        }
    }
}

/// Every section of the detector configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub confirm: ConfirmConfig,
    #[serde(default)]
    pub refractory: RefractoryConfig,
    #[serde(default)]
    pub cpd: CpdConfig,
    #[serde(default)]
    pub stream: StreamConfig,
}

impl PipelineConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> PipelineResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| PipelineError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load, parse and validate a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> PipelineResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("Failed to read config {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Validate every section.
    pub fn validate(&self) -> PipelineResult<()> {
        self.detector.validate()?;
        self.confirm.validate()?;
        self.cpd.validate()?;
        self.refractory.validate()?;
        if self.stream.buffer_rows == 0 {
            return Err(PipelineError::Config(
                "stream.buffer_rows must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
