//! # SQS Queue
//!
//! Convenience façade over AWS SQS for pushing and pulling messages by
//! queue name.
//!
//! This library provides:
//! - Queue name resolution scoped to the caller's account, with a configurable
//!   name prefix
//! - Lazy queue creation on first use, waiting out the post-deletion cooldown
//! - Push with JSON encoding of structured payloads
//! - Batch receive with concurrent handlers and acknowledgment by deletion
//! - A cancellable pull loop
//! - A positional-argument adapter with completion callbacks
//!
//! ## Module Organization
//!
//! - [`error`] - Error types for all queue operations
//! - [`message`] - Identifiers, payloads and received messages
//! - [`config`] - Client configuration and loading
//! - [`service`] - Backend traits consumed by the client
//! - [`providers`] - AWS and in-memory backends
//! - [`request`] - Typed requests and positional-argument normalization
//! - [`client`] - The queue client
//! - [`pull`] - The pull loop
//! - [`dispatch`] - Completion-callback entry points
//!
//! ## Example
//!
//! ```no_run
//! use serde_json::json;
//! use sqs_queue::{ClientConfig, PushRequest, QueueClient, ReceivedMessage};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), sqs_queue::QueueError> {
//! let client = QueueClient::from_config(ClientConfig::load(None)?.with_prefix("app-"))?;
//! client.push(PushRequest::new("orders", json!({"id": 1}))).await?;
//!
//! let handler = |message: ReceivedMessage| async move {
//!     println!("received {}", message.raw_body);
//!     Ok::<(), anyhow::Error>(())
//! };
//! client.pull("orders", &handler, &CancellationToken::new()).await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod handler;
pub mod message;
pub mod providers;
pub mod pull;
pub mod request;
pub mod service;

// Re-export commonly used types at crate root for convenience
pub use client::{BatchOutcome, QueueClient};
pub use config::{ClientConfig, Credentials};
pub use dispatch::{Completion, Outcome};
pub use error::{ConfigurationError, ProviderError, ProviderErrorKind, QueueError};
pub use handler::MessageHandler;
pub use message::{
    AccountId, Attributes, BodyFormat, MessageId, Payload, QueueUrl, RawMessage, ReceiptHandle,
    ReceivedMessage,
};
pub use providers::{AwsSqsService, AwsStsIdentity, InMemoryQueueService};
pub use pull::{PullState, PullSummary};
pub use request::{
    normalize, Arg, AttributesRequest, CreateQueueRequest, DeleteMessageRequest, OperationKind,
    OperationRequest, PushRequest, QueueTarget, ReceiveRequest,
};
pub use service::{IdentityService, QueueService, ReceiveOptions, SendOptions};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
