//! Node configuration
//!
//! Sources, lowest to highest precedence:
//!
//! | Source | Example |
//! |---|---|
//! | struct defaults | `worker.max_inflight_jobs = 8` |
//! | TOML file (`$MORPHD_CONFIG`, else `config/morphd.toml`, optional) | `[worker]` `max_inflight_jobs = 4` |
//! | `.env` file and process environment | `MORPHD__WORKER__MAX_INFLIGHT_JOBS=16` |
//!
//! Sizes accept units (`MORPHD__TRANSPORT__MAX_MESSAGE_BYTES=4MB`). The merged
//! result is validated before it is handed out.

mod models;
mod sources;
mod validation;

pub use crate::humanize::ByteSize;
pub use models::{
    Config, DeadLetterConfig, DeadLetterSinkKind, FetchConfig, NodeConfig, StorageConfig,
    StorageProvider, TelemetryConfig, TransportConfig, WorkerConfig,
};
pub use validation::ValidationError;

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(#[from] ValidationError),
}

impl Config {
    /// Load and validate. `path` overrides the default file location.
    pub fn load(path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => sources::load_from_sources(path)?,
            None => sources::load()?,
        };
        validation::validate(&config)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_minimal_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        fs::write(&config_path, "[worker]\ntransformer = \"copy\"\n").unwrap();

        let config = Config::load(Some(config_path)).unwrap();
        assert_eq!(config.worker.transformer, "copy");
    }

    #[test]
    fn test_validation_runs_on_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        fs::write(&config_path, "[worker]\nmax_inflight_jobs = 0\n").unwrap();

        let result = Config::load(Some(config_path));
        assert!(matches!(
            result,
            Err(ConfigError::Invalid(ValidationError::ZeroLimit { .. }))
        ));
    }

    #[test]
    fn test_malformed_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        fs::write(&config_path, "[worker\nmax_inflight_jobs = ").unwrap();

        assert!(matches!(
            Config::load(Some(config_path)),
            Err(ConfigError::Load(_))
        ));
    }
}
