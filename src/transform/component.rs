use async_trait::async_trait;
use std::sync::Arc;
use tracing::{Instrument, error, info, info_span, warn};

use super::reporter::ProgressReporter;
use super::traits::{ContentTransformer, TransformError};
use crate::deadletter::{DeadLetterEntry, DeadLetterReason, DeadLetterSink};
use crate::envelope::{Envelope, Payload, TransformationRequest};
use crate::messaging::{MessageHandler, MessageProducer};
use crate::observability::Metrics;

/// Transformation node component.
///
/// Receives [`TransformationRequest`] envelopes, runs the configured
/// [`ContentTransformer`] and maps the outcome to status replies:
///
/// 1. Envelope of another type or shape → dead letter, no reply
/// 2. Invalid request or no `reply_to` → dead letter, no reply
/// 3. `IN_PROGRESS` reply; if undeliverable → dead letter, transformer not run
/// 4. Transformer runs on its own task with the reporter as progress callback
/// 5. Success → `COMPLETE`; if undeliverable → dead letter
/// 6. Failure → `ERROR`; if undeliverable → dead letter
///
/// Holds no per-job state, so one instance serves any number of concurrent
/// `handle` calls.
pub struct TransformerComponent {
    transformer: Arc<dyn ContentTransformer>,
    producer: Arc<dyn MessageProducer>,
    dead_letters: Arc<dyn DeadLetterSink>,
    metrics: Arc<Metrics>,
}

impl TransformerComponent {
    pub fn new(
        transformer: Arc<dyn ContentTransformer>,
        producer: Arc<dyn MessageProducer>,
        dead_letters: Arc<dyn DeadLetterSink>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            transformer,
            producer,
            dead_letters,
            metrics,
        }
    }

    pub fn transformer_name(&self) -> &str {
        self.transformer.name()
    }

    /// Process an already-opened request
    pub async fn process(&self, request: TransformationRequest) {
        let span = info_span!("transformation", request_id = %request.request_id);
        self.process_request(request).instrument(span).await
    }

    async fn process_request(&self, request: TransformationRequest) {
        if let Err(detail) = request.validate() {
            warn!(error = %detail, "Rejecting malformed transformation request");
            self.dead_letter(DeadLetterEntry::from_request(
                &request,
                DeadLetterReason::MalformedRequest(detail),
            ));
            return;
        }

        if request.reply_destination().is_none() {
            warn!("Transformation request has no reply destination");
            self.dead_letter(DeadLetterEntry::from_request(
                &request,
                DeadLetterReason::NoReplyDestination,
            ));
            return;
        }

        info!(
            transformer = self.transformer.name(),
            sources = request.source_references.len(),
            targets = request.target_references.len(),
            "Processing transformation request"
        );

        let reporter = Arc::new(ProgressReporter::new(
            &request,
            Arc::clone(&self.producer),
            Arc::clone(&self.metrics),
        ));

        if let Err(e) = reporter.report_started().await {
            error!(error = %e, "Could not report transformation start, abandoning job");
            self.metrics.job_failed();
            self.dead_letter(DeadLetterEntry::from_request(
                &request,
                DeadLetterReason::StartedReplyUndeliverable(e.to_string()),
            ));
            return;
        }

        match self.run_transformer(&request, Arc::clone(&reporter)).await {
            Ok(()) => self.finish_success(&request, &reporter).await,
            Err(e) => self.finish_failure(&request, &reporter, e).await,
        }
    }

    /// Run the transformer on its own task; a panic becomes a failure
    async fn run_transformer(
        &self,
        request: &TransformationRequest,
        reporter: Arc<ProgressReporter>,
    ) -> Result<(), TransformError> {
        let transformer = Arc::clone(&self.transformer);
        let sources = request.source_references.clone();
        let targets = request.target_references.clone();
        let options = request.options.clone();

        let task = tokio::spawn(
            async move {
                transformer
                    .transform(&sources, &targets, &options, reporter.as_ref())
                    .await
            }
            .in_current_span(),
        );

        match task.await {
            Ok(result) => result,
            Err(join_error) => Err(TransformError::Panicked(join_error.to_string())),
        }
    }

    async fn finish_success(&self, request: &TransformationRequest, reporter: &ProgressReporter) {
        match reporter.report_complete().await {
            Ok(()) => {
                info!("Transformation complete");
                self.metrics.job_completed();
            }
            Err(e) => {
                // The work is done but the requester will never hear of it
                error!(error = %e, "Transformation complete but reply undeliverable");
                self.metrics.job_completed();
                self.dead_letter(DeadLetterEntry::from_request(
                    request,
                    DeadLetterReason::ReplyUndeliverable(e.to_string()),
                ));
            }
        }
    }

    async fn finish_failure(
        &self,
        request: &TransformationRequest,
        reporter: &ProgressReporter,
        failure: TransformError,
    ) {
        let message = failure.to_string();
        error!(error = %message, "Transformation failed");
        self.metrics.job_failed();

        if let Err(e) = reporter.report_error(&message).await {
            error!(error = %e, "Error reply undeliverable");
            self.dead_letter(DeadLetterEntry::from_request(
                request,
                DeadLetterReason::TransformationFailed {
                    error: message,
                    reply_error: e.to_string(),
                },
            ));
        }
    }

    fn dead_letter(&self, entry: DeadLetterEntry) {
        if self.dead_letters.receive(Some(&entry)) {
            self.metrics.dead_lettered();
        }
    }
}

#[async_trait]
impl MessageHandler for TransformerComponent {
    fn accepted_message_type(&self) -> &'static str {
        TransformationRequest::MESSAGE_TYPE
    }

    async fn handle(&self, message: Envelope) {
        self.metrics.job_received();

        match message.open::<TransformationRequest>() {
            Ok(request) => self.process(request).await,
            Err(e) => {
                warn!(
                    message_type = %message.message_type,
                    error = %e,
                    "Received message that is not a transformation request"
                );
                self.dead_letter(DeadLetterEntry::from_envelope(
                    &message,
                    DeadLetterReason::UnrecognizedMessageType,
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deadletter::LoggingDeadLetterSink;
    use crate::envelope::{
        ContentReference, ReplyStatus, TransformOptions, TransformationReply,
    };
    use crate::messaging::InMemoryBroker;
    use crate::transform::ProgressCallback;
    use serde_json::json;

    struct Halves;

    #[async_trait]
    impl ContentTransformer for Halves {
        fn name(&self) -> &str {
            "halves"
        }

        async fn transform(
            &self,
            _sources: &[ContentReference],
            _targets: &[ContentReference],
            _options: &TransformOptions,
            progress: &dyn ProgressCallback,
        ) -> Result<(), TransformError> {
            progress.report_progress(0.5).await?;
            Ok(())
        }
    }

    struct Panics;

    #[async_trait]
    impl ContentTransformer for Panics {
        fn name(&self) -> &str {
            "panics"
        }

        async fn transform(
            &self,
            _sources: &[ContentReference],
            _targets: &[ContentReference],
            _options: &TransformOptions,
            _progress: &dyn ProgressCallback,
        ) -> Result<(), TransformError> {
            panic!("codec exploded");
        }
    }

    fn component(
        transformer: Arc<dyn ContentTransformer>,
        broker: &Arc<InMemoryBroker>,
        metrics: &Arc<Metrics>,
    ) -> TransformerComponent {
        TransformerComponent::new(
            transformer,
            broker.clone(),
            Arc::new(LoggingDeadLetterSink::new()),
            metrics.clone(),
        )
    }

    fn request_envelope() -> Envelope {
        let request = TransformationRequest::builder()
            .request_id("job-1")
            .source_references(vec![ContentReference::new("in")])
            .target_references(vec![ContentReference::new("out")])
            .reply_to("replies")
            .build();
        Envelope::wrap(&request).unwrap()
    }

    fn statuses(broker: &InMemoryBroker) -> Vec<TransformationReply> {
        broker
            .drain("replies", 100)
            .unwrap()
            .iter()
            .map(|e| e.open().unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_accepts_request_type() {
        let broker = Arc::new(InMemoryBroker::new(16, 4096));
        let metrics = Arc::new(Metrics::new());
        let component = component(Arc::new(Halves), &broker, &metrics);
        assert_eq!(component.accepted_message_type(), "transformation_request");
        assert_eq!(component.transformer_name(), "halves");
    }

    #[tokio::test]
    async fn test_happy_path() {
        let broker = Arc::new(InMemoryBroker::new(16, 4096));
        let metrics = Arc::new(Metrics::new());
        let component = component(Arc::new(Halves), &broker, &metrics);

        component.handle(request_envelope()).await;

        let replies = statuses(&broker);
        let kinds: Vec<_> = replies.iter().map(|r| (r.status, r.progress)).collect();
        assert_eq!(
            kinds,
            vec![
                (ReplyStatus::InProgress, None),
                (ReplyStatus::InProgress, Some(0.5)),
                (ReplyStatus::Complete, None),
            ]
        );

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.jobs_received, 1);
        assert_eq!(snapshot.jobs_completed, 1);
        assert_eq!(snapshot.replies_sent, 3);
        assert_eq!(snapshot.dead_letters, 0);
    }

    #[tokio::test]
    async fn test_panic_becomes_error_reply() {
        let broker = Arc::new(InMemoryBroker::new(16, 4096));
        let metrics = Arc::new(Metrics::new());
        let component = component(Arc::new(Panics), &broker, &metrics);

        component.handle(request_envelope()).await;

        let replies = statuses(&broker);
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[1].status, ReplyStatus::Error);
        assert!(
            replies[1]
                .error_message
                .as_deref()
                .unwrap()
                .starts_with("transformation panicked")
        );
        assert_eq!(metrics.snapshot().jobs_failed, 1);
    }

    #[tokio::test]
    async fn test_foreign_message_dead_lettered() {
        let broker = Arc::new(InMemoryBroker::new(16, 4096));
        let metrics = Arc::new(Metrics::new());
        let component = component(Arc::new(Halves), &broker, &metrics);

        component
            .handle(Envelope::new("thumbnail_request", json!({"reply_to": "replies"})))
            .await;

        assert!(broker.destinations().is_empty());
        assert_eq!(metrics.snapshot().dead_letters, 1);
    }
}
