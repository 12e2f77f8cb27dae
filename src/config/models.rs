use crate::humanize::ByteSize;
use crate::storage::HttpConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub dead_letter: DeadLetterConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Node identity and operator HTTP surface
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NodeConfig {
    #[serde(default = "default_node_name")]
    pub name: String,
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: default_node_name(),
            http_addr: default_http_addr(),
        }
    }
}

fn default_node_name() -> String {
    "morphd".to_string()
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

/// In-process broker settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransportConfig {
    /// Destination the node consumes transformation requests from
    #[serde(default = "default_request_destination")]
    pub request_destination: String,
    /// Queue depth per destination
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: ByteSize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            request_destination: default_request_destination(),
            channel_capacity: default_channel_capacity(),
            max_message_bytes: default_max_message_bytes(),
        }
    }
}

fn default_request_destination() -> String {
    "transform.requests".to_string()
}

fn default_channel_capacity() -> usize {
    256
}

fn default_max_message_bytes() -> ByteSize {
    ByteSize(1024 * 1024) // 1 MB
}

/// Worker pool settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkerConfig {
    /// Upper bound on concurrently running jobs
    #[serde(default = "default_max_inflight_jobs")]
    pub max_inflight_jobs: usize,
    /// Registered transformer to run
    #[serde(default = "default_transformer")]
    pub transformer: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_inflight_jobs: default_max_inflight_jobs(),
            transformer: default_transformer(),
        }
    }
}

fn default_max_inflight_jobs() -> usize {
    8
}

fn default_transformer() -> String {
    "copy".to_string()
}

/// Dead-letter sink kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeadLetterSinkKind {
    /// Log only
    Log,
    /// Persist to Fjall (and log)
    #[default]
    Fjall,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeadLetterConfig {
    #[serde(default)]
    pub sink: DeadLetterSinkKind,
    #[serde(default = "default_dead_letter_path")]
    pub path: PathBuf,
}

impl Default for DeadLetterConfig {
    fn default() -> Self {
        Self {
            sink: DeadLetterSinkKind::default(),
            path: default_dead_letter_path(),
        }
    }
}

fn default_dead_letter_path() -> PathBuf {
    PathBuf::from("data/dead-letters")
}

/// Content storage backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageProvider {
    #[default]
    Memory,
    Local,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub provider: StorageProvider,
    /// Root directory for the local provider
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            provider: StorageProvider::default(),
            root: default_storage_root(),
        }
    }
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("data/content")
}

/// HTTP source fetching
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FetchConfig {
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    pub proxy: Option<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            max_retries: default_max_retries(),
            proxy: None,
        }
    }
}

impl FetchConfig {
    pub fn to_http_config(&self) -> HttpConfig {
        HttpConfig {
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            max_retries: self.max_retries,
            proxy: self.proxy.clone(),
            ..HttpConfig::default()
        }
    }
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_request_timeout_ms() -> u64 {
    60_000
}

fn default_max_retries() -> u32 {
    3
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    /// `tracing_subscriber::EnvFilter` directive used when `RUST_LOG` is unset
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
        }
    }
}

fn default_log_filter() -> String {
    "info".to_string()
}
