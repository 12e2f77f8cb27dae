use async_trait::async_trait;
use thiserror::Error;

use super::reporter::ReportingError;
use crate::envelope::{ContentReference, TransformOptions};

#[derive(Debug, Error)]
pub enum TransformError {
    /// Failure reported by the transformation itself; displayed verbatim
    #[error("{0}")]
    Failed(String),

    #[error("unsupported transformation: {0}")]
    Unsupported(String),

    #[error("content access failed: {0}")]
    Content(String),

    #[error("progress reporting failed: {0}")]
    Reporting(#[from] ReportingError),

    #[error("transformation panicked: {0}")]
    Panicked(String),
}

/// Progress surface handed to a transformer
#[async_trait]
pub trait ProgressCallback: Send + Sync {
    /// Report a completion fraction in `[0.0, 1.0]`. Values need not be
    /// monotonic; they are forwarded as given.
    async fn report_progress(&self, fraction: f32) -> Result<(), ReportingError>;
}

/// Pluggable transformation capability.
///
/// Calls may be slow and may fail. A transformer never sees the request
/// identity or the reply destination.
#[async_trait]
pub trait ContentTransformer: Send + Sync {
    fn name(&self) -> &str;

    async fn transform(
        &self,
        sources: &[ContentReference],
        targets: &[ContentReference],
        options: &TransformOptions,
        progress: &dyn ProgressCallback,
    ) -> Result<(), TransformError>;
}
