use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{MessageProducer, MessagingError, Result};
use crate::envelope::Envelope;

struct DestinationQueue {
    tx: mpsc::Sender<Bytes>,
    /// Taken by `subscribe`; `None` while a consumer owns the destination
    rx: Option<mpsc::Receiver<Bytes>>,
}

/// Single-process broker with one bounded queue per named destination
///
/// - Destinations are created on first send or subscribe and live until the
///   broker is dropped; each holds at most `capacity` messages, so memory is
///   bounded by the number of distinct reply destinations in use
/// - Messages are JSON-encoded on send and size-checked
/// - A full queue fails the send instead of blocking the sender
/// - One consumer per destination (`subscribe`); destinations without a
///   consumer can be inspected with `drain`
pub struct InMemoryBroker {
    destinations: Mutex<HashMap<String, DestinationQueue>>,
    capacity: usize,
    max_message_bytes: u64,
    sent: AtomicU64,
}

impl InMemoryBroker {
    pub fn new(capacity: usize, max_message_bytes: u64) -> Self {
        Self {
            destinations: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
            max_message_bytes,
            sent: AtomicU64::new(0),
        }
    }

    fn with_queue<R>(&self, destination: &str, f: impl FnOnce(&mut DestinationQueue) -> R) -> R {
        let mut destinations = self
            .destinations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let queue = destinations
            .entry(destination.to_string())
            .or_insert_with(|| {
                let (tx, rx) = mpsc::channel(self.capacity);
                debug!(destination, capacity = self.capacity, "Created destination");
                DestinationQueue { tx, rx: Some(rx) }
            });

        f(queue)
    }

    /// Take the receiving end of a destination for a consumer
    pub fn subscribe(&self, destination: &str) -> Result<mpsc::Receiver<Bytes>> {
        self.with_queue(destination, |queue| queue.rx.take())
            .ok_or_else(|| MessagingError::AlreadySubscribed(destination.to_string()))
    }

    /// Publish pre-encoded bytes, enforcing size and capacity limits
    pub fn publish(&self, destination: &str, payload: Bytes) -> Result<()> {
        if payload.len() as u64 > self.max_message_bytes {
            return Err(MessagingError::MessageTooLarge {
                size: payload.len(),
                limit: self.max_message_bytes,
            });
        }

        let sender = self.with_queue(destination, |queue| queue.tx.clone());

        match sender.try_send(payload) {
            Ok(()) => {
                self.sent.fetch_add(1, Ordering::Relaxed);
                debug!(destination, "Message queued");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(destination, "Destination full, message rejected");
                Err(MessagingError::DestinationFull(destination.to_string()))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(MessagingError::SendFailed {
                destination: destination.to_string(),
                reason: "consumer closed".to_string(),
            }),
        }
    }

    /// Pop up to `limit` queued messages from a destination without a consumer.
    ///
    /// Unknown destinations yield nothing and are not created. Messages that
    /// no longer decode are skipped with a warning.
    pub fn drain(&self, destination: &str, limit: usize) -> Result<Vec<Envelope>> {
        let mut destinations = self
            .destinations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let Some(queue) = destinations.get_mut(destination) else {
            return Ok(Vec::new());
        };
        let rx = queue
            .rx
            .as_mut()
            .ok_or_else(|| MessagingError::AlreadySubscribed(destination.to_string()))?;

        let mut messages = Vec::new();
        while messages.len() < limit {
            let Ok(bytes) = rx.try_recv() else { break };
            match Envelope::decode(&bytes) {
                Ok(envelope) => messages.push(envelope),
                Err(e) => warn!(destination, error = %e, "Skipping undecodable message"),
            }
        }

        Ok(messages)
    }

    /// Names of all known destinations, sorted
    pub fn destinations(&self) -> Vec<String> {
        let destinations = self
            .destinations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut names: Vec<String> = destinations.keys().cloned().collect();
        names.sort();
        names
    }

    /// Total number of messages accepted since startup
    pub fn sent_count(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl MessageProducer for InMemoryBroker {
    async fn send(&self, destination: &str, message: &Envelope) -> Result<()> {
        let payload = message.encode()?;
        self.publish(destination, Bytes::from(payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(n: u64) -> Envelope {
        Envelope::new("test", json!({ "n": n }))
    }

    #[tokio::test]
    async fn test_send_then_drain() {
        let broker = InMemoryBroker::new(10, 1024);

        broker.send("replies", &envelope(1)).await.unwrap();
        broker.send("replies", &envelope(2)).await.unwrap();

        let drained = broker.drain("replies", 10).unwrap();
        assert_eq!(drained, vec![envelope(1), envelope(2)]);
        assert!(broker.drain("replies", 10).unwrap().is_empty());
        assert_eq!(broker.sent_count(), 2);
    }

    #[tokio::test]
    async fn test_drain_respects_limit() {
        let broker = InMemoryBroker::new(10, 1024);
        for n in 0..5 {
            broker.send("q", &envelope(n)).await.unwrap();
        }

        assert_eq!(broker.drain("q", 2).unwrap().len(), 2);
        assert_eq!(broker.drain("q", 10).unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_full_destination_fails_fast() {
        let broker = InMemoryBroker::new(1, 1024);

        broker.send("q", &envelope(1)).await.unwrap();
        let err = broker.send("q", &envelope(2)).await.unwrap_err();
        assert!(matches!(err, MessagingError::DestinationFull(ref d) if d == "q"));
    }

    #[tokio::test]
    async fn test_oversized_message_rejected() {
        let broker = InMemoryBroker::new(10, 16);
        let big = Envelope::new("test", json!({ "data": "x".repeat(64) }));

        let err = broker.send("q", &big).await.unwrap_err();
        assert!(matches!(err, MessagingError::MessageTooLarge { limit: 16, .. }));
    }

    #[tokio::test]
    async fn test_single_subscriber() {
        let broker = InMemoryBroker::new(10, 1024);

        let mut rx = broker.subscribe("requests").unwrap();
        assert!(matches!(
            broker.subscribe("requests"),
            Err(MessagingError::AlreadySubscribed(_))
        ));
        assert!(broker.drain("requests", 1).is_err());

        broker.send("requests", &envelope(7)).await.unwrap();
        let bytes = rx.recv().await.unwrap();
        assert_eq!(Envelope::decode(&bytes).unwrap(), envelope(7));
    }

    #[tokio::test]
    async fn test_closed_consumer_fails_send() {
        let broker = InMemoryBroker::new(10, 1024);
        drop(broker.subscribe("requests").unwrap());

        let err = broker.send("requests", &envelope(1)).await.unwrap_err();
        assert!(matches!(err, MessagingError::SendFailed { .. }));
    }

    #[test]
    fn test_destinations_listed() {
        let broker = InMemoryBroker::new(10, 1024);
        broker.publish("b", Bytes::from_static(b"{}")).unwrap();
        broker.publish("a", Bytes::from_static(b"{}")).unwrap();
        assert_eq!(broker.destinations(), vec!["a", "b"]);
    }

    #[test]
    fn test_drain_does_not_create_destination() {
        let broker = InMemoryBroker::new(10, 1024);

        assert!(broker.drain("nobody-home", 10).unwrap().is_empty());
        assert!(broker.destinations().is_empty());
    }
}
