use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, info};

use super::traits::{ContentTransformer, ProgressCallback, TransformError};
use crate::envelope::{ContentReference, TransformOptions};
use crate::storage::{HttpClient, StorageClient};

/// Identity transformation: copies each source to the target at the same
/// position.
///
/// `http://` and `https://` sources are fetched over HTTP; every other
/// reference is a key in the node's content storage. Progress is reported
/// after each copied pair.
pub struct CopyTransformer {
    storage: Arc<StorageClient>,
    http: Arc<HttpClient>,
}

impl CopyTransformer {
    pub const NAME: &'static str = "copy";

    pub fn new(storage: Arc<StorageClient>, http: Arc<HttpClient>) -> Self {
        Self { storage, http }
    }

    async fn fetch(&self, source: &ContentReference) -> Result<Bytes, TransformError> {
        match source.scheme() {
            Some("http") | Some("https") => self
                .http
                .download(&source.uri)
                .await
                .map_err(|e| TransformError::Content(e.to_string())),
            _ => self
                .storage
                .read(&source.uri)
                .await
                .map_err(|e| TransformError::Content(e.to_string())),
        }
    }
}

#[async_trait]
impl ContentTransformer for CopyTransformer {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn transform(
        &self,
        sources: &[ContentReference],
        targets: &[ContentReference],
        _options: &TransformOptions,
        progress: &dyn ProgressCallback,
    ) -> Result<(), TransformError> {
        if sources.len() != targets.len() {
            return Err(TransformError::Unsupported(format!(
                "copy needs one target per source, got {} sources and {} targets",
                sources.len(),
                targets.len()
            )));
        }

        if let Some(target) = targets.iter().find(|t| t.scheme().is_some()) {
            return Err(TransformError::Unsupported(format!(
                "cannot write to remote target {}",
                target.uri
            )));
        }

        let total = sources.len();
        for (index, (source, target)) in sources.iter().zip(targets).enumerate() {
            let bytes = self.fetch(source).await?;
            let size = bytes.len();

            self.storage
                .write(&target.uri, bytes)
                .await
                .map_err(|e| TransformError::Content(e.to_string()))?;

            debug!(source = %source.uri, target = %target.uri, size, "Copied content");
            progress
                .report_progress((index + 1) as f32 / total as f32)
                .await?;
        }

        info!(pairs = total, "Copy transformation finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::HttpConfig;
    use crate::transform::ReportingError;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Fractions(Mutex<Vec<f32>>);

    #[async_trait]
    impl ProgressCallback for Fractions {
        async fn report_progress(&self, fraction: f32) -> Result<(), ReportingError> {
            self.0.lock().unwrap().push(fraction);
            Ok(())
        }
    }

    fn transformer(storage: Arc<StorageClient>) -> CopyTransformer {
        CopyTransformer::new(storage, Arc::new(HttpClient::new(HttpConfig::default()).unwrap()))
    }

    fn refs(uris: &[&str]) -> Vec<ContentReference> {
        uris.iter().map(|u| ContentReference::new(*u)).collect()
    }

    #[tokio::test]
    async fn test_copies_pairs_and_reports() {
        let storage = Arc::new(StorageClient::in_memory());
        storage.write("in/a", Bytes::from_static(b"alpha")).await.unwrap();
        storage.write("in/b", Bytes::from_static(b"beta")).await.unwrap();

        let progress = Fractions::default();
        transformer(storage.clone())
            .transform(
                &refs(&["in/a", "in/b"]),
                &refs(&["out/a", "out/b"]),
                &TransformOptions::new(),
                &progress,
            )
            .await
            .unwrap();

        assert_eq!(storage.read("out/a").await.unwrap(), Bytes::from_static(b"alpha"));
        assert_eq!(storage.read("out/b").await.unwrap(), Bytes::from_static(b"beta"));
        assert_eq!(*progress.0.lock().unwrap(), vec![0.5, 1.0]);
    }

    #[tokio::test]
    async fn test_missing_source() {
        let storage = Arc::new(StorageClient::in_memory());

        let err = transformer(storage)
            .transform(
                &refs(&["in/missing"]),
                &refs(&["out/x"]),
                &TransformOptions::new(),
                &Fractions::default(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, TransformError::Content(_)));
    }

    #[tokio::test]
    async fn test_mismatched_targets() {
        let storage = Arc::new(StorageClient::in_memory());

        let err = transformer(storage)
            .transform(
                &refs(&["a", "b"]),
                &refs(&["c"]),
                &TransformOptions::new(),
                &Fractions::default(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, TransformError::Unsupported(_)));
    }

    #[tokio::test]
    async fn test_remote_target_rejected() {
        let storage = Arc::new(StorageClient::in_memory());

        let err = transformer(storage)
            .transform(
                &refs(&["a"]),
                &refs(&["https://example.com/out"]),
                &TransformOptions::new(),
                &Fractions::default(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, TransformError::Unsupported(_)));
    }
}
