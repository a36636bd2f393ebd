//! Error types for queue operations.

use thiserror::Error;

/// Provider error code returned when a queue name cannot be found.
pub const CODE_NON_EXISTENT_QUEUE: &str = "AWS.SimpleQueueService.NonExistentQueue";

/// Provider error code returned when a queue is re-created too soon after deletion.
pub const CODE_QUEUE_DELETED_RECENTLY: &str = "AWS.SimpleQueueService.QueueDeletedRecently";

/// Provider error code returned when a receipt handle is no longer valid.
pub const CODE_INVALID_RECEIPT_HANDLE: &str = "ReceiptHandleIsInvalid";

/// Comprehensive error type for all queue operations
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Invalid arguments: {message}")]
    InvalidArguments { message: String },

    #[error("A message payload is required")]
    MissingPayload,

    #[error("Failed to resolve queue '{queue_name}': {source}")]
    ResolutionFailed {
        queue_name: String,
        #[source]
        source: ProviderError,
    },

    #[error("Message '{message_id}' has a malformed body: {message}")]
    MalformedBody { message_id: String, message: String },

    #[error("Receipt handle is invalid or already consumed: {receipt}")]
    InvalidReceiptHandle { receipt: String },

    #[error("Pull loop aborted in cycle {cycle}: {source}")]
    PullLoopAborted {
        cycle: u64,
        #[source]
        source: Box<QueueError>,
    },

    #[error("Operation '{operation}' was cancelled")]
    Cancelled { operation: String },

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
}

impl QueueError {
    pub(crate) fn invalid_arguments(message: impl Into<String>) -> Self {
        Self::InvalidArguments {
            message: message.into(),
        }
    }

    /// Provider error code, when the failure came from the backend service
    pub fn provider_code(&self) -> Option<&str> {
        match self {
            Self::Provider(e) | Self::ResolutionFailed { source: e, .. } => Some(e.code()),
            Self::PullLoopAborted { source, .. } => source.provider_code(),
            _ => None,
        }
    }
}

/// Classification of the provider error codes this crate reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    NonExistentQueue,
    QueueDeletedRecently,
    InvalidReceiptHandle,
    Other,
}

/// Error reported by the queue or identity backend, passed through unchanged
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Provider error: {code} - {message}")]
pub struct ProviderError {
    code: String,
    message: String,
}

impl ProviderError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn non_existent_queue(queue_name: &str) -> Self {
        Self::new(
            CODE_NON_EXISTENT_QUEUE,
            format!("The specified queue does not exist: {}", queue_name),
        )
    }

    pub fn queue_deleted_recently(queue_name: &str) -> Self {
        Self::new(
            CODE_QUEUE_DELETED_RECENTLY,
            format!(
                "You must wait 60 seconds after deleting a queue before you can create another with the same name: {}",
                queue_name
            ),
        )
    }

    pub fn invalid_receipt_handle(receipt: &str) -> Self {
        Self::new(
            CODE_INVALID_RECEIPT_HANDLE,
            format!("The receipt handle is not valid: {}", receipt),
        )
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Map the raw provider code onto the cases handled locally
    pub fn kind(&self) -> ProviderErrorKind {
        match self.code.as_str() {
            CODE_NON_EXISTENT_QUEUE | "QueueDoesNotExist" => ProviderErrorKind::NonExistentQueue,
            CODE_QUEUE_DELETED_RECENTLY | "QueueDeletedRecently" => {
                ProviderErrorKind::QueueDeletedRecently
            }
            CODE_INVALID_RECEIPT_HANDLE | "InvalidReceiptHandle" => {
                ProviderErrorKind::InvalidReceiptHandle
            }
            _ => ProviderErrorKind::Other,
        }
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required configuration: {key}")]
    Missing { key: String },

    #[error("Configuration parsing failed: {message}")]
    Parsing { message: String },
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
