use super::models::Config;
use config::{ConfigError, Environment, File, FileFormat};
use std::env;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const CONFIG_PATH_VAR: &str = "MORPHD_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/morphd.toml";
const ENV_PREFIX: &str = "MORPHD";
const ENV_SEPARATOR: &str = "__";

/// Config file location: `$MORPHD_CONFIG` if set (also from `.env`),
/// otherwise `config/morphd.toml`
fn default_path() -> PathBuf {
    let _ = dotenvy::dotenv();

    env::var_os(CONFIG_PATH_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

pub fn load() -> Result<Config, ConfigError> {
    load_from_sources(default_path())
}

/// Merge struct defaults, the TOML file at `config_path` (skipped when it
/// does not exist) and `MORPHD__*` environment variables
pub fn load_from_sources(config_path: PathBuf) -> Result<Config, ConfigError> {
    // .env is optional
    let _ = dotenvy::dotenv();

    let mut builder = config::Config::builder();
    if has_file(&config_path) {
        builder = builder.add_source(File::from(config_path.as_path()).format(FileFormat::Toml));
    }

    // MORPHD__WORKER__MAX_INFLIGHT_JOBS -> worker.max_inflight_jobs
    builder
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator(ENV_SEPARATOR)
                .separator(ENV_SEPARATOR)
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()
}

fn has_file(path: &Path) -> bool {
    let exists = path.is_file();
    if exists {
        info!(path = %path.display(), "Loading configuration file");
    } else {
        warn!(path = %path.display(), "No configuration file, using defaults and environment");
    }
    exists
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DeadLetterSinkKind, StorageProvider};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_defaults_only() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nonexistent.toml");

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.node.http_addr.to_string(), "0.0.0.0:8080");
        assert_eq!(config.worker.transformer, "copy");
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[node]
name = "node-7"
http_addr = "127.0.0.1:9000"

[transport]
request_destination = "jobs.transform"
channel_capacity = 32
max_message_bytes = "64KB"

[worker]
max_inflight_jobs = 2

[dead_letter]
sink = "log"

[storage]
provider = "local"
root = "/var/lib/morphd"

[fetch]
max_retries = 5
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.node.name, "node-7");
        assert_eq!(config.node.http_addr.to_string(), "127.0.0.1:9000");
        assert_eq!(config.transport.request_destination, "jobs.transform");
        assert_eq!(config.transport.channel_capacity, 32);
        assert_eq!(config.transport.max_message_bytes.as_u64(), 64 * 1024);
        assert_eq!(config.worker.max_inflight_jobs, 2);
        assert_eq!(config.dead_letter.sink, DeadLetterSinkKind::Log);
        assert_eq!(config.storage.provider, StorageProvider::Local);
        assert_eq!(config.fetch.max_retries, 5);
        assert_eq!(config.fetch.connect_timeout_ms, 10_000);
    }

    #[test]
    fn test_numeric_message_size() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        fs::write(&config_path, "[transport]\nmax_message_bytes = 2048\n").unwrap();

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.transport.max_message_bytes.as_u64(), 2048);
    }
}
