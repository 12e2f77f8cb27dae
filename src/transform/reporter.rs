use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use thiserror::Error;
use tracing::{debug, error};

use super::traits::ProgressCallback;
use crate::envelope::{Envelope, EnvelopeError, ReplyStatus, TransformationReply, TransformationRequest};
use crate::messaging::{MessageProducer, MessagingError};
use crate::observability::Metrics;

#[derive(Debug, Error)]
pub enum ReportingError {
    #[error("no reply destination")]
    NoReplyDestination,

    #[error("progress fraction {0} is outside [0.0, 1.0]")]
    InvalidProgress(f32),

    #[error("transformation has not been reported as started")]
    NotStarted,

    #[error("transformation already reported as started")]
    AlreadyStarted,

    #[error("reporter already sent a terminal reply")]
    Exhausted,

    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    #[error(transparent)]
    Transport(#[from] MessagingError),
}

const READY: u8 = 0;
const STARTED: u8 = 1;
const FINISHED: u8 = 2;

/// Per-job reply emitter.
///
/// Copies the correlation fields out of the request at construction, so it
/// never needs the request again. Each call sends exactly one reply to the
/// request's `reply_to`; nothing is batched, deduplicated or retried.
///
/// Lifecycle: `report_started` once, `report_progress` any number of times,
/// then one of `report_complete` / `report_error`. Calls out of that order
/// return an error and send nothing.
pub struct ProgressReporter {
    producer: Arc<dyn MessageProducer>,
    metrics: Arc<Metrics>,
    request_id: String,
    reply_to: Option<String>,
    state: AtomicU8,
}

impl ProgressReporter {
    pub fn new(
        request: &TransformationRequest,
        producer: Arc<dyn MessageProducer>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            producer,
            metrics,
            request_id: request.request_id.clone(),
            reply_to: request.reply_destination().map(str::to_string),
            state: AtomicU8::new(READY),
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn reply_to(&self) -> Option<&str> {
        self.reply_to.as_deref()
    }

    pub fn is_finished(&self) -> bool {
        self.state.load(Ordering::Acquire) == FINISHED
    }

    pub async fn report_started(&self) -> Result<(), ReportingError> {
        self.transition(READY, STARTED)?;
        debug!(request_id = %self.request_id, "Starting transformation");

        self.send(self.reply(ReplyStatus::InProgress)).await
    }

    pub async fn report_progress(&self, fraction: f32) -> Result<(), ReportingError> {
        if !(0.0..=1.0).contains(&fraction) {
            return Err(ReportingError::InvalidProgress(fraction));
        }

        match self.state.load(Ordering::Acquire) {
            READY => return Err(ReportingError::NotStarted),
            FINISHED => return Err(self.misuse(ReportingError::Exhausted)),
            _ => {}
        }

        debug!(
            request_id = %self.request_id,
            "{}% progress on transformation",
            fraction * 100.0
        );

        self.send(self.reply(ReplyStatus::InProgress).with_progress(fraction))
            .await
    }

    pub async fn report_complete(&self) -> Result<(), ReportingError> {
        self.transition(STARTED, FINISHED)?;
        debug!(request_id = %self.request_id, "Completed transformation");

        self.send(self.reply(ReplyStatus::Complete)).await
    }

    /// Terminal failure reply carrying `message`
    pub async fn report_error(&self, message: &str) -> Result<(), ReportingError> {
        self.transition(STARTED, FINISHED)?;
        debug!(request_id = %self.request_id, error = message, "Failed transformation");

        self.send(self.reply(ReplyStatus::Error).with_error(message))
            .await
    }

    fn reply(&self, status: ReplyStatus) -> TransformationReply {
        TransformationReply::correlated(&self.request_id, self.reply_to.as_deref(), status)
    }

    fn transition(&self, from: u8, to: u8) -> Result<(), ReportingError> {
        match self
            .state
            .compare_exchange(from, to, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => Ok(()),
            Err(READY) => Err(ReportingError::NotStarted),
            Err(STARTED) => Err(ReportingError::AlreadyStarted),
            Err(_) => Err(self.misuse(ReportingError::Exhausted)),
        }
    }

    fn misuse(&self, err: ReportingError) -> ReportingError {
        error!(request_id = %self.request_id, error = %err, "Progress reporter misused");
        err
    }

    async fn send(&self, reply: TransformationReply) -> Result<(), ReportingError> {
        let destination = self
            .reply_to
            .as_deref()
            .ok_or(ReportingError::NoReplyDestination)?;

        let envelope = Envelope::wrap(&reply)?;
        self.producer.send(destination, &envelope).await?;
        self.metrics.reply_sent();

        Ok(())
    }
}

#[async_trait]
impl ProgressCallback for ProgressReporter {
    async fn report_progress(&self, fraction: f32) -> Result<(), ReportingError> {
        ProgressReporter::report_progress(self, fraction).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::ContentReference;
    use crate::messaging::InMemoryBroker;

    fn request(reply_to: Option<&str>) -> TransformationRequest {
        TransformationRequest::builder()
            .request_id("req-42")
            .source_references(vec![ContentReference::new("a")])
            .maybe_reply_to(reply_to)
            .build()
    }

    fn reporter(broker: &Arc<InMemoryBroker>, reply_to: Option<&str>) -> ProgressReporter {
        ProgressReporter::new(&request(reply_to), broker.clone(), Arc::new(Metrics::new()))
    }

    fn replies(broker: &InMemoryBroker) -> Vec<TransformationReply> {
        broker
            .drain("replies", 100)
            .unwrap()
            .iter()
            .map(|envelope| envelope.open().unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_full_sequence() {
        let broker = Arc::new(InMemoryBroker::new(16, 4096));
        let reporter = reporter(&broker, Some("replies"));

        reporter.report_started().await.unwrap();
        reporter.report_progress(0.5).await.unwrap();
        reporter.report_complete().await.unwrap();

        let replies = replies(&broker);
        assert_eq!(replies.len(), 3);
        assert_eq!(replies[0].status, ReplyStatus::InProgress);
        assert_eq!(replies[0].progress, None);
        assert_eq!(replies[1].progress, Some(0.5));
        assert_eq!(replies[2].status, ReplyStatus::Complete);
        assert!(replies.iter().all(|r| r.request_id == "req-42"));
        assert!(reporter.is_finished());
    }

    #[tokio::test]
    async fn test_progress_out_of_range_rejected() {
        let broker = Arc::new(InMemoryBroker::new(16, 4096));
        let reporter = reporter(&broker, Some("replies"));
        reporter.report_started().await.unwrap();

        for bad in [-0.1, 1.01, f32::NAN] {
            assert!(matches!(
                reporter.report_progress(bad).await,
                Err(ReportingError::InvalidProgress(_))
            ));
        }

        reporter.report_progress(0.0).await.unwrap();
        reporter.report_progress(1.0).await.unwrap();
        assert_eq!(replies(&broker).len(), 3);
    }

    #[tokio::test]
    async fn test_progress_before_start_rejected() {
        let broker = Arc::new(InMemoryBroker::new(16, 4096));
        let reporter = reporter(&broker, Some("replies"));

        assert!(matches!(
            reporter.report_progress(0.2).await,
            Err(ReportingError::NotStarted)
        ));
        assert!(matches!(
            reporter.report_complete().await,
            Err(ReportingError::NotStarted)
        ));
        assert!(replies(&broker).is_empty());
    }

    #[tokio::test]
    async fn test_exhausted_after_terminal() {
        let broker = Arc::new(InMemoryBroker::new(16, 4096));
        let reporter = reporter(&broker, Some("replies"));

        reporter.report_started().await.unwrap();
        reporter.report_complete().await.unwrap();

        assert!(matches!(reporter.report_complete().await, Err(ReportingError::Exhausted)));
        assert!(matches!(reporter.report_error("x").await, Err(ReportingError::Exhausted)));
        assert!(matches!(reporter.report_progress(0.9).await, Err(ReportingError::Exhausted)));
        assert!(matches!(reporter.report_started().await, Err(ReportingError::Exhausted)));
        assert_eq!(replies(&broker).len(), 2);
    }

    #[tokio::test]
    async fn test_started_twice() {
        let broker = Arc::new(InMemoryBroker::new(16, 4096));
        let reporter = reporter(&broker, Some("replies"));

        reporter.report_started().await.unwrap();
        assert!(matches!(
            reporter.report_started().await,
            Err(ReportingError::AlreadyStarted)
        ));
    }

    #[tokio::test]
    async fn test_error_reply_carries_message() {
        let broker = Arc::new(InMemoryBroker::new(16, 4096));
        let reporter = reporter(&broker, Some("replies"));

        reporter.report_started().await.unwrap();
        reporter.report_error("disk full").await.unwrap();

        let replies = replies(&broker);
        assert_eq!(replies[1].status, ReplyStatus::Error);
        assert_eq!(replies[1].error_message.as_deref(), Some("disk full"));
    }

    #[tokio::test]
    async fn test_missing_reply_to() {
        let broker = Arc::new(InMemoryBroker::new(16, 4096));
        let reporter = reporter(&broker, None);

        assert!(matches!(
            reporter.report_started().await,
            Err(ReportingError::NoReplyDestination)
        ));
        assert!(broker.destinations().is_empty());
    }

    #[tokio::test]
    async fn test_transport_failure_surfaces() {
        let broker = Arc::new(InMemoryBroker::new(1, 4096));
        let reporter = reporter(&broker, Some("replies"));

        reporter.report_started().await.unwrap();
        assert!(matches!(
            reporter.report_progress(0.1).await,
            Err(ReportingError::Transport(MessagingError::DestinationFull(_)))
        ));
    }
}
