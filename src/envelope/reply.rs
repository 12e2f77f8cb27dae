use serde::{Deserialize, Serialize};

use super::{Payload, TransformationRequest};

/// Reply status; "started" and "progress" both travel as `InProgress`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReplyStatus {
    InProgress,
    Complete,
    Error,
}

/// One status event for a job. Never mutated after it is sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformationReply {
    pub request_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    pub status: ReplyStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl Payload for TransformationReply {
    const MESSAGE_TYPE: &'static str = "transformation_reply";
}

impl TransformationReply {
    /// Start a reply correlated to `request`
    pub fn for_request(request: &TransformationRequest, status: ReplyStatus) -> Self {
        Self::correlated(&request.request_id, request.reply_to.as_deref(), status)
    }

    pub(crate) fn correlated(request_id: &str, reply_to: Option<&str>, status: ReplyStatus) -> Self {
        Self {
            request_id: request_id.to_string(),
            reply_to: reply_to.map(str::to_string),
            status,
            progress: None,
            error_message: None,
        }
    }

    pub fn with_progress(mut self, progress: f32) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, ReplyStatus::Complete | ReplyStatus::Error)
    }
}
