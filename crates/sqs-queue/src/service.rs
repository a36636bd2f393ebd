//! Backend capabilities consumed by the queue client.
//!
//! The client never talks to a transport directly; it goes through these two
//! traits. [`crate::providers::aws`] implements them over the AWS query API and
//! [`crate::providers::memory`] implements them in-process.

use crate::error::ProviderError;
use crate::message::{AccountId, Attributes, MessageId, QueueUrl, RawMessage, ReceiptHandle};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Largest batch the provider hands out per receive call
pub const MAX_RECEIVE_BATCH: u32 = 10;

/// Longest long-poll wait the provider accepts, in seconds
pub const MAX_WAIT_TIME_SECONDS: u32 = 20;

/// Provider options for a single send
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendOptions {
    pub delay_seconds: Option<u32>,
    pub message_attributes: Attributes,
    pub message_group_id: Option<String>,
    pub message_deduplication_id: Option<String>,
}

/// Provider options for a single receive
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveOptions {
    pub max_messages: Option<u32>,
    pub wait_time_seconds: Option<u32>,
    pub visibility_timeout: Option<u32>,
    pub attribute_names: Vec<String>,
    pub message_attribute_names: Vec<String>,
}

impl ReceiveOptions {
    /// Batch size clamped to the provider limits
    pub fn batch_size(&self) -> u32 {
        self.max_messages.unwrap_or(1).clamp(1, MAX_RECEIVE_BATCH)
    }

    /// Long-poll wait clamped to the provider limits
    pub fn wait_time(&self) -> Option<u32> {
        self.wait_time_seconds.map(|w| w.min(MAX_WAIT_TIME_SECONDS))
    }
}

/// Queue operations provided by the managed queue service
#[async_trait]
pub trait QueueService: Send + Sync {
    /// Create a queue (idempotent for identical attributes)
    async fn create_queue(
        &self,
        name: &str,
        attributes: &Attributes,
    ) -> Result<QueueUrl, ProviderError>;

    /// Look up the URL of an existing queue owned by `owner`
    async fn get_queue_url(
        &self,
        name: &str,
        owner: Option<&AccountId>,
    ) -> Result<QueueUrl, ProviderError>;

    async fn delete_queue(&self, url: &QueueUrl) -> Result<(), ProviderError>;

    async fn purge_queue(&self, url: &QueueUrl) -> Result<(), ProviderError>;

    /// Read queue attributes; an empty filter means all attributes
    async fn get_queue_attributes(
        &self,
        url: &QueueUrl,
        names: &[String],
    ) -> Result<Attributes, ProviderError>;

    async fn send_message(
        &self,
        url: &QueueUrl,
        body: &str,
        options: &SendOptions,
    ) -> Result<MessageId, ProviderError>;

    async fn receive_message(
        &self,
        url: &QueueUrl,
        options: &ReceiveOptions,
    ) -> Result<Vec<RawMessage>, ProviderError>;

    async fn delete_message(
        &self,
        url: &QueueUrl,
        receipt: &ReceiptHandle,
    ) -> Result<(), ProviderError>;
}

/// Caller identity lookup used to scope queue names to an account
#[async_trait]
pub trait IdentityService: Send + Sync {
    async fn get_caller_identity(&self) -> Result<AccountId, ProviderError>;
}
