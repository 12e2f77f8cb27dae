//! Fetching `http(s)://` transformation sources

use bytes::Bytes;
use reqwest::{Client, Proxy, StatusCode, Url};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("invalid source URL '{0}'")]
    InvalidUrl(String),

    #[error("invalid proxy '{0}'")]
    InvalidProxy(String),

    #[error("{url} answered HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("timed out fetching {0}")]
    Timeout(String),

    #[error("fetching {url} failed: {reason}")]
    Transport { url: String, reason: String },

    #[error("giving up on {url} after {attempts} attempts: {last}")]
    Exhausted {
        url: String,
        attempts: u32,
        last: Box<DownloadError>,
    },
}

impl DownloadError {
    /// Timeouts, transport errors, 5xx and 429 are worth another attempt
    fn is_retryable(&self) -> bool {
        match self {
            DownloadError::Timeout(_) | DownloadError::Transport { .. } => true,
            DownloadError::Status { status, .. } => {
                *status >= 500 || *status == StatusCode::TOO_MANY_REQUESTS.as_u16()
            }
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, DownloadError>;

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    /// Attempts after the first one
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each further retry
    pub retry_backoff: Duration,
    pub user_agent: String,
    pub proxy: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(60),
            max_retries: 3,
            retry_backoff: Duration::from_millis(500),
            user_agent: concat!("morphd/", env!("CARGO_PKG_VERSION")).to_string(),
            proxy: None,
        }
    }
}

pub struct HttpClient {
    client: Client,
    config: HttpConfig,
}

impl HttpClient {
    pub fn new(config: HttpConfig) -> Result<Self> {
        let mut builder = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .user_agent(&config.user_agent);

        if let Some(proxy) = &config.proxy {
            let proxy = Proxy::all(proxy).map_err(|_| DownloadError::InvalidProxy(proxy.clone()))?;
            builder = builder.proxy(proxy);
        }

        let client = builder.build().map_err(|e| DownloadError::Transport {
            url: String::new(),
            reason: e.to_string(),
        })?;

        Ok(Self { client, config })
    }

    /// GET `url`, retrying transient failures with exponential backoff
    pub async fn download(&self, url: &str) -> Result<Bytes> {
        let parsed = Url::parse(url).map_err(|_| DownloadError::InvalidUrl(url.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(DownloadError::InvalidUrl(url.to_string()));
        }

        let mut delay = self.config.retry_backoff;
        let mut attempt = 1;

        loop {
            let err = match self.fetch(&parsed).await {
                Ok(bytes) => return Ok(bytes),
                Err(err) => err,
            };

            if !err.is_retryable() {
                return Err(err);
            }

            if attempt > self.config.max_retries {
                return Err(DownloadError::Exhausted {
                    url: url.to_string(),
                    attempts: attempt,
                    last: Box::new(err),
                });
            }

            warn!(url, attempt, delay_ms = delay.as_millis() as u64, error = %err, "Source fetch failed, retrying");
            tokio::time::sleep(delay).await;
            delay = delay.saturating_mul(2);
            attempt += 1;
        }
    }

    async fn fetch(&self, url: &Url) -> Result<Bytes> {
        let response = self.client.get(url.clone()).send().await.map_err(|e| {
            if e.is_timeout() {
                DownloadError::Timeout(url.to_string())
            } else {
                DownloadError::Transport {
                    url: url.to_string(),
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|e| DownloadError::Transport {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        debug!(url = %url, size = body.len(), "Fetched source");

        Ok(body)
    }
}
