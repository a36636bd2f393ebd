//! Message types for queue operations including core domain identifiers.

use crate::error::QueueError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;

/// Queue or message attributes as returned by the provider
pub type Attributes = BTreeMap<String, String>;

// ============================================================================
// Core Domain Identifiers
// ============================================================================

/// Fully qualified queue URL, e.g. `https://sqs.us-east-1.amazonaws.com/123456789012/orders`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueUrl(String);

impl QueueUrl {
    /// Create a queue URL, requiring an absolute http(s) URL with a queue name path
    pub fn new(url: impl Into<String>) -> Result<Self, QueueError> {
        let url = url.into();
        let parsed = url::Url::parse(&url).map_err(|e| {
            QueueError::invalid_arguments(format!("'{}' is not a valid queue URL: {}", url, e))
        })?;

        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(QueueError::invalid_arguments(format!(
                "queue URL '{}' must use http or https",
                url
            )));
        }

        let has_name = parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .is_some_and(|last| !last.is_empty());
        if !has_name {
            return Err(QueueError::invalid_arguments(format!(
                "queue URL '{}' does not name a queue",
                url
            )));
        }

        Ok(Self(url))
    }

    /// Get queue URL as string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Queue name, the last path segment of the URL
    pub fn queue_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or_default()
    }
}

impl std::fmt::Display for QueueUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for QueueUrl {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Account that owns a queue, as reported by the identity service
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Provider-assigned message identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get message ID as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque per-delivery token needed to delete a received message
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReceiptHandle(String);

impl ReceiptHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ReceiptHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Payloads
// ============================================================================

/// Message payload. Text is sent as-is, structured values as JSON text.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Text(String),
    Json(Value),
}

impl Payload {
    /// Serialize any value into a JSON payload
    pub fn json<T: Serialize>(value: &T) -> Result<Self, QueueError> {
        Ok(serde_json::to_value(value)?.into())
    }

    /// Absent-equivalent payloads are rejected by push
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(text) => text.is_empty(),
            Self::Json(value) => value.is_null(),
        }
    }

    /// Wire body for the payload
    pub fn encode(&self) -> Result<String, QueueError> {
        match self {
            Self::Text(text) => Ok(text.clone()),
            Self::Json(value) => Ok(serde_json::to_string(value)?),
        }
    }

    /// Decode a wire body according to `format`
    pub fn decode(body: &str, format: BodyFormat, message_id: &MessageId) -> Result<Self, QueueError> {
        match format {
            BodyFormat::Text => Ok(Self::Text(body.to_string())),
            BodyFormat::Json => serde_json::from_str::<Value>(body)
                .map(Self::from)
                .map_err(|e| QueueError::MalformedBody {
                    message_id: message_id.to_string(),
                    message: e.to_string(),
                }),
            BodyFormat::Auto => Ok(serde_json::from_str::<Value>(body)
                .map(Self::from)
                .unwrap_or_else(|_| Self::Text(body.to_string()))),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Json(_) => None,
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Text(_) => None,
            Self::Json(value) => Some(value),
        }
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        match value {
            Value::String(text) => Self::Text(text),
            other => Self::Json(other),
        }
    }
}

/// How received bodies are decoded before they reach a handler
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyFormat {
    /// JSON when the body parses as JSON, raw text otherwise
    #[default]
    Auto,
    /// Strict JSON; anything else is a malformed body
    Json,
    /// Raw text, never parsed
    Text,
}

// ============================================================================
// Messages
// ============================================================================

/// Message exactly as the provider delivered it
#[derive(Debug, Clone, PartialEq)]
pub struct RawMessage {
    pub message_id: MessageId,
    pub body: String,
    pub receipt_handle: ReceiptHandle,
    pub attributes: Attributes,
}

/// A received message with its decoded body
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedMessage {
    pub message_id: MessageId,
    pub body: Payload,
    pub raw_body: String,
    pub receipt_handle: ReceiptHandle,
    pub attributes: Attributes,
}

impl ReceivedMessage {
    pub(crate) fn decode(raw: RawMessage, format: BodyFormat) -> Result<Self, QueueError> {
        let body = Payload::decode(&raw.body, format, &raw.message_id)?;
        Ok(Self {
            message_id: raw.message_id,
            body,
            raw_body: raw.body,
            receipt_handle: raw.receipt_handle,
            attributes: raw.attributes,
        })
    }

    /// Deserialize the raw body into a typed value
    pub fn decode_json<T: serde::de::DeserializeOwned>(&self) -> Result<T, QueueError> {
        serde_json::from_str(&self.raw_body).map_err(|e| QueueError::MalformedBody {
            message_id: self.message_id.to_string(),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
