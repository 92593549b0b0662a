//! Layered configuration loading.
//!
//! Sources, lowest precedence first:
//! 1. built-in defaults
//! 2. the TOML file, if any
//! 3. `ONSET__<SECTION>__<KEY>` environment variables, e.g.
//!    `ONSET__REFRACTORY__DURATION_S=60` or `ONSET__CPD__USE=true`

use crate::error::RunnerResult;
use config::{Config, Environment, File, FileFormat};
use onset_pipeline::PipelineConfig;
use std::path::Path;

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "ONSET";

/// Config file used when none is given and it exists.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Load the pipeline configuration.
///
/// An explicit `path` must exist. Without one, [`DEFAULT_CONFIG_PATH`] is
/// read when present.
pub fn load_config(path: Option<&Path>) -> RunnerResult<PipelineConfig> {
    let file = match path {
        Some(path) => File::from(path).format(FileFormat::Toml).required(true),
        None => File::new(DEFAULT_CONFIG_PATH, FileFormat::Toml).required(false),
    };

    let config: PipelineConfig = Config::builder()
        .add_source(file)
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()?;

    config.validate()?;
    Ok(config)
}
