//! Dead-letter routing
//!
//! Messages that cannot be processed, and replies that cannot be delivered,
//! end up here instead of being dropped or crashing the consumer. A sink is
//! the last line of defense: [`DeadLetterSink::receive`] never reports an
//! error to its caller and ignores empty input.
//!
//! Entries are never retried by the worker; redelivery is a broker policy.

mod logging;
mod store;

pub use logging::LoggingDeadLetterSink;
pub use store::{DeadLetterRecord, DeadLetterStoreError, DeadLetterView, FjallDeadLetterStore};

use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::envelope::{Envelope, TransformationRequest};

/// Why a message was dead-lettered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeadLetterReason {
    /// The envelope was not a transformation request (or not decodable at all)
    UnrecognizedMessageType,
    /// Right type, but the request violates an envelope invariant
    MalformedRequest(String),
    /// The request carries no reply destination
    NoReplyDestination,
    /// The initial status reply could not be sent; the job was not started
    StartedReplyUndeliverable(String),
    /// The transformation failed and the error reply could not be sent either
    TransformationFailed { error: String, reply_error: String },
    /// The transformation succeeded but the completion reply was lost
    ReplyUndeliverable(String),
}

impl DeadLetterReason {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnrecognizedMessageType => "UNRECOGNIZED_MESSAGE_TYPE",
            Self::MalformedRequest(_) => "MALFORMED_REQUEST",
            Self::NoReplyDestination => "NO_REPLY_DESTINATION",
            Self::StartedReplyUndeliverable(_) => "STARTED_REPLY_UNDELIVERABLE",
            Self::TransformationFailed { .. } => "TRANSFORMATION_FAILED",
            Self::ReplyUndeliverable(_) => "REPLY_UNDELIVERABLE",
        }
    }
}

impl fmt::Display for DeadLetterReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnrecognizedMessageType => f.write_str("unrecognized message type"),
            Self::MalformedRequest(detail) => write!(f, "malformed request: {detail}"),
            Self::NoReplyDestination => f.write_str("no reply destination"),
            Self::StartedReplyUndeliverable(e) => write!(f, "started reply undeliverable: {e}"),
            Self::TransformationFailed { error, reply_error } => write!(
                f,
                "transformation failed: {error} (error reply undeliverable: {reply_error})"
            ),
            Self::ReplyUndeliverable(e) => write!(f, "completed but reply undeliverable: {e}"),
        }
    }
}

/// An undeliverable or unprocessable message plus the reason
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeadLetterEntry {
    pub id: Uuid,
    pub message_type: Option<String>,
    pub request_id: Option<String>,
    pub payload: Value,
    #[serde(serialize_with = "serialize_reason")]
    pub reason: DeadLetterReason,
    #[serde(with = "time::serde::rfc3339")]
    pub recorded_at: OffsetDateTime,
}

fn serialize_reason<S: serde::Serializer>(
    reason: &DeadLetterReason,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(reason)
}

impl DeadLetterEntry {
    pub fn new(payload: Value, reason: DeadLetterReason) -> Self {
        Self {
            id: Uuid::now_v7(),
            message_type: None,
            request_id: None,
            payload,
            reason,
            recorded_at: OffsetDateTime::now_utc(),
        }
    }

    /// Wrap a received envelope as-is
    pub fn from_envelope(envelope: &Envelope, reason: DeadLetterReason) -> Self {
        let mut entry = Self::new(envelope.body.clone(), reason);
        entry.message_type = Some(envelope.message_type.clone());
        entry.request_id = envelope
            .body
            .get("request_id")
            .and_then(Value::as_str)
            .map(str::to_string);
        entry
    }

    /// Wrap raw bytes that never decoded into an envelope
    pub fn from_raw(bytes: &[u8], reason: DeadLetterReason) -> Self {
        let payload = if bytes.is_empty() {
            Value::Null
        } else {
            Value::String(String::from_utf8_lossy(bytes).into_owned())
        };
        Self::new(payload, reason)
    }

    pub fn from_request(request: &TransformationRequest, reason: DeadLetterReason) -> Self {
        let payload = serde_json::to_value(request).unwrap_or(Value::Null);
        let mut entry = Self::new(payload, reason);
        entry.message_type = Some(
            <TransformationRequest as crate::envelope::Payload>::MESSAGE_TYPE.to_string(),
        );
        entry.request_id = Some(request.request_id.clone());
        entry
    }

    /// An entry with nothing to record: no payload and nothing identifying
    /// the message. A bodiless envelope still carries its type.
    pub fn is_empty(&self) -> bool {
        self.payload.is_null() && self.message_type.is_none() && self.request_id.is_none()
    }
}

/// Fail-safe recording sink for dead letters. Safe for concurrent use.
pub trait DeadLetterSink: Send + Sync {
    /// Record one entry. Implementations swallow their own failures.
    fn record(&self, entry: &DeadLetterEntry);

    /// Entry point for callers: `None` and empty entries are no-ops, and a
    /// panicking implementation is contained here.
    ///
    /// Returns `true` when the entry was handed to `record` and it returned.
    fn receive(&self, entry: Option<&DeadLetterEntry>) -> bool {
        let Some(entry) = entry.filter(|entry| !entry.is_empty()) else {
            return false;
        };

        if catch_unwind(AssertUnwindSafe(|| self.record(entry))).is_err() {
            tracing::error!(
                entry_id = %entry.id,
                reason = %entry.reason,
                "Dead letter sink panicked while recording entry"
            );
            return false;
        }

        true
    }
}
