use tracing::{debug, warn};

use super::{DeadLetterEntry, DeadLetterSink};

/// Sink which only logs dead letters
#[derive(Debug, Clone, Default)]
pub struct LoggingDeadLetterSink;

impl LoggingDeadLetterSink {
    pub fn new() -> Self {
        Self
    }
}

impl DeadLetterSink for LoggingDeadLetterSink {
    fn record(&self, entry: &DeadLetterEntry) {
        warn!(
            entry_id = %entry.id,
            reason_code = entry.reason.code(),
            reason = %entry.reason,
            message_type = entry.message_type.as_deref().unwrap_or("-"),
            request_id = entry.request_id.as_deref().unwrap_or("-"),
            "Dead letter received"
        );
        debug!(entry_id = %entry.id, payload = %entry.payload, "Dead letter payload");
    }
}
