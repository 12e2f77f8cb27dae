//! Content access for built-in transformers
//!
//! [`StorageClient`] wraps an `object_store` backend (in-memory or local
//! filesystem); [`HttpClient`] fetches `http(s)://` sources.

mod http;

pub use http::{DownloadError, HttpClient, HttpConfig};

use bytes::Bytes;
use object_store::{ObjectStore, local::LocalFileSystem, memory::InMemory, path::Path as StoragePath};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("Storage root unavailable: {0}")]
    Root(#[from] std::io::Error),

    #[error("Object store error: {0}")]
    ObjectStoreError(#[from] object_store::Error),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Storage client over any `object_store` backend
#[derive(Clone)]
pub struct StorageClient {
    store: Arc<dyn ObjectStore>,
}

impl StorageClient {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Volatile storage for tests and local runs
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemory::new()))
    }

    /// Files under `root`, which is created if missing
    pub fn local(root: impl AsRef<Path>) -> Result<Self> {
        std::fs::create_dir_all(root.as_ref())?;
        let store = LocalFileSystem::new_with_prefix(root.as_ref())?;
        Ok(Self::new(Arc::new(store)))
    }

    fn path(key: &str) -> Result<StoragePath> {
        StoragePath::parse(key).map_err(|e| StorageError::InvalidKey {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }

    pub async fn read(&self, key: &str) -> Result<Bytes> {
        let path = Self::path(key)?;

        let result = match self.store.get(&path).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => {
                return Err(StorageError::NotFound(key.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let bytes = result.bytes().await?;
        tracing::debug!(key, size = bytes.len(), "Read from storage");

        Ok(bytes)
    }

    pub async fn write(&self, key: &str, data: Bytes) -> Result<()> {
        let path = Self::path(key)?;
        let size = data.len();

        self.store.put(&path, data.into()).await?;
        tracing::debug!(key, size, "Wrote to storage");

        Ok(())
    }

    pub async fn exists(&self, key: &str) -> Result<bool> {
        let path = Self::path(key)?;

        match self.store.head(&path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
