use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::{Semaphore, mpsc, watch};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use super::MessageHandler;
use crate::deadletter::{DeadLetterEntry, DeadLetterReason, DeadLetterSink};
use crate::envelope::Envelope;
use crate::observability::Metrics;

/// Dispatch loop between one broker destination and one handler
///
/// Flow per delivery:
/// 1. Decode the envelope; undecodable bytes are dead-lettered
/// 2. Compare the discriminator with `handler.accepted_message_type()`;
///    anything else is dead-lettered without reaching the handler
/// 3. Spawn `handler.handle(envelope)` on its own task
///
/// A permit is taken before each receive, so at most `max_inflight` jobs run
/// at once and no delivery is pulled off the queue without capacity for it.
///
/// A slow job only holds its own permit, so other deliveries keep flowing
/// while permits remain.
pub struct MessageConsumer {
    handler: Arc<dyn MessageHandler>,
    dead_letters: Arc<dyn DeadLetterSink>,
    metrics: Arc<Metrics>,
    permits: Arc<Semaphore>,
    max_inflight: usize,
}

impl MessageConsumer {
    pub fn new(
        handler: Arc<dyn MessageHandler>,
        dead_letters: Arc<dyn DeadLetterSink>,
        metrics: Arc<Metrics>,
        max_inflight: usize,
    ) -> Self {
        let max_inflight = max_inflight.max(1);
        Self {
            handler,
            dead_letters,
            metrics,
            permits: Arc::new(Semaphore::new(max_inflight)),
            max_inflight,
        }
    }

    /// Consume until the channel closes or `shutdown` flips to `true`, then
    /// wait for in-flight jobs to finish.
    pub async fn run(self, mut deliveries: mpsc::Receiver<Bytes>, mut shutdown: watch::Receiver<bool>) {
        info!(
            message_type = self.handler.accepted_message_type(),
            max_inflight = self.max_inflight,
            "Message consumer started"
        );

        let mut jobs = JoinSet::new();

        loop {
            // Capacity first, so a full pool still observes shutdown and reaps jobs
            let permit = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Shutdown signal received, stopping consumer");
                        break;
                    }
                    continue;
                }
                Some(finished) = jobs.join_next(), if !jobs.is_empty() => {
                    log_finished(finished);
                    continue;
                }
                permit = Arc::clone(&self.permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let bytes = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Shutdown signal received, stopping consumer");
                        break;
                    }
                    continue;
                }
                Some(finished) = jobs.join_next(), if !jobs.is_empty() => {
                    log_finished(finished);
                    continue;
                }
                delivery = deliveries.recv() => match delivery {
                    Some(bytes) => bytes,
                    None => {
                        info!("Delivery channel closed, stopping consumer");
                        break;
                    }
                },
            };

            let Some(envelope) = self.accept(&bytes) else {
                continue;
            };

            let handler = Arc::clone(&self.handler);
            jobs.spawn(async move {
                let _permit = permit;
                handler.handle(envelope).await;
            });
        }

        debug!(inflight = jobs.len(), "Waiting for in-flight jobs");
        while let Some(finished) = jobs.join_next().await {
            log_finished(finished);
        }

        info!("Message consumer stopped");
    }

    /// Transport-boundary check: decode once and match the discriminator
    fn accept(&self, bytes: &[u8]) -> Option<Envelope> {
        let expected = self.handler.accepted_message_type();

        let entry = match Envelope::decode(bytes) {
            Ok(envelope) if envelope.message_type == expected => return Some(envelope),
            Ok(envelope) => {
                warn!(
                    message_type = %envelope.message_type,
                    expected,
                    "Dropping message of unrecognized type to dead letters"
                );
                DeadLetterEntry::from_envelope(&envelope, DeadLetterReason::UnrecognizedMessageType)
            }
            Err(e) => {
                warn!(error = %e, size = bytes.len(), "Dropping undecodable message to dead letters");
                DeadLetterEntry::from_raw(bytes, DeadLetterReason::UnrecognizedMessageType)
            }
        };

        if self.dead_letters.receive(Some(&entry)) {
            self.metrics.dead_lettered();
        }
        None
    }
}

fn log_finished(finished: Result<(), JoinError>) {
    if let Err(e) = finished {
        error!(error = %e, "Message handler task failed");
    }
}
