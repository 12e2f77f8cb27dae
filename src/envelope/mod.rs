//! Job envelope model
//!
//! Every message on the wire is an [`Envelope`]: a JSON object carrying an
//! explicit `type` discriminator next to the payload body. Typed payloads
//! ([`TransformationRequest`], [`TransformationReply`]) implement [`Payload`]
//! and are wrapped/opened through the envelope, so a receiver checks the
//! discriminator exactly once before touching the body.
//!
//! ```rust,ignore
//! use morphd::envelope::{Envelope, TransformationRequest};
//!
//! let envelope = Envelope::wrap(&request)?;
//! let request: TransformationRequest = envelope.open()?;
//! ```

mod reply;
mod request;

pub use reply::{ReplyStatus, TransformationReply};
pub use request::{ContentReference, TransformOptions, TransformationRequest};

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("unexpected message type '{actual}', expected '{expected}'")]
    UnexpectedType {
        expected: &'static str,
        actual: String,
    },

    #[error("invalid message body: {0}")]
    InvalidBody(#[source] serde_json::Error),

    #[error("envelope encoding failed: {0}")]
    Encoding(#[source] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EnvelopeError>;

/// A typed message body with a static discriminator
pub trait Payload: Serialize + DeserializeOwned {
    const MESSAGE_TYPE: &'static str;
}

/// Wire wrapper: `{"type": "...", "body": {...}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub message_type: String,
    #[serde(default)]
    pub body: Value,
}

impl Envelope {
    /// Build an envelope with an arbitrary discriminator
    pub fn new(message_type: impl Into<String>, body: Value) -> Self {
        Self {
            message_type: message_type.into(),
            body,
        }
    }

    pub fn wrap<T: Payload>(payload: &T) -> Result<Self> {
        let body = serde_json::to_value(payload).map_err(EnvelopeError::Encoding)?;
        Ok(Self::new(T::MESSAGE_TYPE, body))
    }

    /// Check the discriminator, then deserialize the body
    pub fn open<T: Payload>(&self) -> Result<T> {
        if !self.is::<T>() {
            return Err(EnvelopeError::UnexpectedType {
                expected: T::MESSAGE_TYPE,
                actual: self.message_type.clone(),
            });
        }

        T::deserialize(&self.body).map_err(EnvelopeError::InvalidBody)
    }

    pub fn is<T: Payload>(&self) -> bool {
        self.message_type == T::MESSAGE_TYPE
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(EnvelopeError::Encoding)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(EnvelopeError::InvalidBody)
    }
}
