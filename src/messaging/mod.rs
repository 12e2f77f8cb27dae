//! Message transport abstraction
//!
//! The worker only depends on two capabilities: [`MessageProducer`] to send an
//! envelope to a named destination, and [`MessageHandler`] to receive one.
//! [`InMemoryBroker`] is the single-process transport used by the node and by
//! tests; [`MessageConsumer`] is the dispatch loop sitting between a broker
//! destination and a handler.

pub mod consumer;
pub mod memory;

pub use consumer::MessageConsumer;
pub use memory::InMemoryBroker;

use async_trait::async_trait;
use thiserror::Error;

use crate::envelope::{Envelope, EnvelopeError};

#[derive(Debug, Error)]
pub enum MessagingError {
    #[error("send to '{destination}' failed: {reason}")]
    SendFailed { destination: String, reason: String },

    #[error("message of {size} bytes exceeds limit of {limit} bytes")]
    MessageTooLarge { size: usize, limit: u64 },

    #[error("destination '{0}' is full")]
    DestinationFull(String),

    #[error("destination '{0}' already has a consumer")]
    AlreadySubscribed(String),

    #[error(transparent)]
    Encoding(#[from] EnvelopeError),
}

pub type Result<T> = std::result::Result<T, MessagingError>;

/// Sends typed messages to named destinations
#[async_trait]
pub trait MessageProducer: Send + Sync {
    async fn send(&self, destination: &str, message: &Envelope) -> Result<()>;
}

/// Receives messages of one type from the transport.
///
/// `handle` has no error channel: every outcome must end in a sent reply or a
/// dead letter, so one bad message never stops consumption of the next.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Discriminator of the envelopes this handler consumes
    fn accepted_message_type(&self) -> &'static str;

    async fn handle(&self, message: Envelope);
}
