use bon::Builder;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::Payload;

/// Transformation-specific options, opaque to the worker
pub type TransformOptions = BTreeMap<String, Value>;

/// Opaque content locator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentReference {
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
}

impl ContentReference {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            media_type: None,
        }
    }

    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }

    /// URI scheme, if the locator has one (`https://host/x` → `https`)
    pub fn scheme(&self) -> Option<&str> {
        self.uri.split_once("://").map(|(scheme, _)| scheme)
    }
}

/// A single transformation job as received from the broker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
pub struct TransformationRequest {
    /// Caller-assigned correlation key
    #[builder(into)]
    pub request_id: String,
    #[serde(default)]
    #[builder(default)]
    pub source_references: Vec<ContentReference>,
    #[serde(default)]
    #[builder(default)]
    pub target_references: Vec<ContentReference>,
    #[serde(default)]
    #[builder(default)]
    pub options: TransformOptions,
    /// Destination for status replies; without it nothing can be reported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(into)]
    pub reply_to: Option<String>,
}

impl Payload for TransformationRequest {
    const MESSAGE_TYPE: &'static str = "transformation_request";
}

impl TransformationRequest {
    /// Check the envelope invariants; returns a description of the first violation
    pub fn validate(&self) -> Result<(), String> {
        if self.request_id.trim().is_empty() {
            return Err("request_id must not be empty".to_string());
        }

        if self.source_references.is_empty() {
            return Err("at least one source reference is required".to_string());
        }

        Ok(())
    }

    /// Reply destination, treating a blank string as absent
    pub fn reply_destination(&self) -> Option<&str> {
        self.reply_to
            .as_deref()
            .map(str::trim)
            .filter(|destination| !destination.is_empty())
    }
}
