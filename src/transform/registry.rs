use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

use super::copy::CopyTransformer;
use super::traits::ContentTransformer;
use crate::storage::{HttpClient, StorageClient};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("transformer not found: {0}")]
    NotFound(String),
}

/// Named transformer instances; the node runs the one chosen in config
#[derive(Clone, Default)]
pub struct TransformerRegistry {
    transformers: BTreeMap<String, Arc<dyn ContentTransformer>>,
}

impl TransformerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register under the transformer's own name, replacing any previous one
    pub fn register(&mut self, transformer: Arc<dyn ContentTransformer>) {
        self.transformers
            .insert(transformer.name().to_string(), transformer);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn ContentTransformer>, RegistryError> {
        self.transformers
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.transformers.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.transformers.keys().map(String::as_str).collect()
    }

    /// Registry with the built-in transformers
    pub fn with_builtins(storage: Arc<StorageClient>, http: Arc<HttpClient>) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(CopyTransformer::new(storage, http)));
        registry
    }
}
