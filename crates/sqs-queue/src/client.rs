//! Queue client: name resolution, lazy creation and message operations.
//!
//! Every operation addressed by name resolves the queue on each call:
//! the caller's account comes from the identity service, then the URL from
//! the queue service. A queue that does not exist yet is created on the spot.
//! Nothing is cached between calls.

use crate::config::ClientConfig;
use crate::error::{ProviderError, ProviderErrorKind, QueueError};
use crate::handler::MessageHandler;
use crate::message::{AccountId, Attributes, MessageId, QueueUrl, ReceivedMessage};
use crate::providers::{AwsSqsService, AwsStsIdentity};
use crate::request::{
    AttributesRequest, CreateQueueRequest, DeleteMessageRequest, PushRequest, QueueTarget,
    ReceiveRequest,
};
use crate::service::{IdentityService, QueueService};
use futures::future::join_all;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;

/// Result of handing one received batch to a handler
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub received: usize,
    /// Handler succeeded and the message was deleted
    pub acknowledged: usize,
    /// Handler failed; the message stays for redelivery
    pub rejected: usize,
    /// Handler succeeded but the delete call failed
    pub delete_failed: usize,
}

impl BatchOutcome {
    pub fn is_empty(&self) -> bool {
        self.received == 0
    }
}

enum Disposition {
    Acknowledged,
    Rejected,
    DeleteFailed,
}

/// Queue façade over a [`QueueService`] and an [`IdentityService`].
///
/// Cloning is cheap; clones share the backends and the cancellation token.
#[derive(Clone)]
pub struct QueueClient {
    config: ClientConfig,
    queue_service: Arc<dyn QueueService>,
    identity: Arc<dyn IdentityService>,
    shutdown: CancellationToken,
}

impl fmt::Debug for QueueClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueClient")
            .field("config", &self.config)
            .field("cancelled", &self.shutdown.is_cancelled())
            .finish()
    }
}

impl QueueClient {
    /// Client over explicit backends.
    ///
    /// ```
    /// use std::sync::Arc;
    /// use sqs_queue::{ClientConfig, InMemoryQueueService, PushRequest, QueueClient};
    ///
    /// # tokio_test::block_on(async {
    /// let service = InMemoryQueueService::new();
    /// let client = QueueClient::new(
    ///     ClientConfig::default().with_prefix("app-"),
    ///     Arc::new(service.clone()),
    ///     Arc::new(service.clone()),
    /// );
    ///
    /// client.push(PushRequest::new("orders", "hello")).await.unwrap();
    /// assert_eq!(service.queue_names(), vec!["app-orders".to_string()]);
    /// # });
    /// ```
    pub fn new(
        config: ClientConfig,
        queue_service: Arc<dyn QueueService>,
        identity: Arc<dyn IdentityService>,
    ) -> Self {
        Self {
            config,
            queue_service,
            identity,
            shutdown: CancellationToken::new(),
        }
    }

    /// Client backed by AWS SQS and STS
    pub fn from_config(config: ClientConfig) -> Result<Self, QueueError> {
        let queue_service = Arc::new(AwsSqsService::new(&config)?);
        let identity = Arc::new(AwsStsIdentity::new(&config)?);
        info!(
            region = %config.region,
            prefix = %config.queue_name_prefix,
            endpoint = %config.sqs_endpoint(),
            "Created AWS queue client"
        );
        Ok(Self::new(config, queue_service, identity))
    }

    /// Replace the token that stops creation retries and pull loops
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// Cancelling this token stops every long-running operation of the client
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Name used with the backend: the configured prefix plus `name`, unless
    /// `name` already starts with the prefix
    pub fn effective_name(&self, name: &str) -> String {
        let prefix = &self.config.queue_name_prefix;
        if name.starts_with(prefix.as_str()) {
            name.to_string()
        } else {
            format!("{}{}", prefix, name)
        }
    }

    // ========================================================================
    // Resolution
    // ========================================================================

    /// Account the client's queues belong to
    pub async fn get_queue_owner_account_id(&self) -> Result<AccountId, QueueError> {
        let account = self.identity.get_caller_identity().await?;
        debug!(account = %account, "Resolved caller account");
        Ok(account)
    }

    /// Resolve a queue to its URL, creating it when it does not exist
    pub async fn get_queue_url(&self, target: impl Into<QueueTarget>) -> Result<QueueUrl, QueueError> {
        self.resolve(&target.into(), &self.shutdown).await
    }

    /// Resolve `target`; a creation retry also stops when `cancel` fires
    pub(crate) async fn resolve(
        &self,
        target: &QueueTarget,
        cancel: &CancellationToken,
    ) -> Result<QueueUrl, QueueError> {
        let (name, owner) = match target {
            QueueTarget::Url(url) => return Ok(url.clone()),
            QueueTarget::Name { name, owner } => (self.effective_name(name), owner),
        };

        let resolution_failed = |source: ProviderError| QueueError::ResolutionFailed {
            queue_name: name.clone(),
            source,
        };

        let account = match owner {
            Some(owner) => owner.clone(),
            None => self
                .identity
                .get_caller_identity()
                .await
                .map_err(resolution_failed)?,
        };

        match self.queue_service.get_queue_url(&name, Some(&account)).await {
            Ok(url) => {
                debug!(queue = %name, account = %account, url = %url, "Resolved queue URL");
                Ok(url)
            }
            Err(e) if e.kind() == ProviderErrorKind::NonExistentQueue => {
                info!(queue = %name, account = %account, "Queue does not exist, creating it");
                self.create_with_retry(&name, &Attributes::new(), cancel)
                    .await
                    .map_err(|e| match e {
                        QueueError::Provider(source) => resolution_failed(source),
                        other => other,
                    })
            }
            Err(e) => {
                warn!(queue = %name, code = %e.code(), "Failed to resolve queue URL");
                Err(resolution_failed(e))
            }
        }
    }

    // ========================================================================
    // Queue lifecycle
    // ========================================================================

    /// Create a queue, waiting out the provider's cooldown after a deletion.
    ///
    /// Retries are unbounded; cancel [`Self::cancellation_token`] to give up.
    pub async fn create_queue(
        &self,
        request: impl Into<CreateQueueRequest>,
    ) -> Result<QueueUrl, QueueError> {
        let request = request.into();
        if request.name.is_empty() {
            return Err(QueueError::invalid_arguments("queue name must not be empty"));
        }
        let name = self.effective_name(&request.name);
        self.create_with_retry(&name, &request.attributes, &self.shutdown)
            .await
    }

    async fn create_with_retry(
        &self,
        name: &str,
        attributes: &Attributes,
        cancel: &CancellationToken,
    ) -> Result<QueueUrl, QueueError> {
        let delay = self.config.queue_recreate_delay();
        let mut attempt: u32 = 0;

        loop {
            if self.shutdown.is_cancelled() || cancel.is_cancelled() {
                info!(queue = %name, attempt, "Queue creation cancelled");
                return Err(QueueError::Cancelled {
                    operation: "create_queue".to_string(),
                });
            }

            attempt += 1;
            match self.queue_service.create_queue(name, attributes).await {
                Ok(url) => {
                    info!(queue = %name, url = %url, attempt, "Queue created");
                    return Ok(url);
                }
                Err(e) if e.kind() == ProviderErrorKind::QueueDeletedRecently => {
                    warn!(
                        queue = %name,
                        attempt,
                        delay_secs = delay.as_secs(),
                        "Queue was deleted recently, retrying creation after delay"
                    );
                    tokio::select! {
                        _ = self.shutdown.cancelled() => {}
                        _ = cancel.cancelled() => {}
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(e) => {
                    warn!(queue = %name, code = %e.code(), "Queue creation failed");
                    return Err(e.into());
                }
            }
        }
    }

    pub async fn delete_queue(&self, target: impl Into<QueueTarget>) -> Result<(), QueueError> {
        let url = self.resolve(&target.into(), &self.shutdown).await?;
        self.queue_service.delete_queue(&url).await?;
        info!(url = %url, "Queue deleted");
        Ok(())
    }

    pub async fn purge_queue(&self, target: impl Into<QueueTarget>) -> Result<(), QueueError> {
        let url = self.resolve(&target.into(), &self.shutdown).await?;
        self.queue_service.purge_queue(&url).await?;
        info!(url = %url, "Queue purged");
        Ok(())
    }

    pub async fn get_queue_attributes(
        &self,
        request: AttributesRequest,
    ) -> Result<Attributes, QueueError> {
        let url = self.resolve(&request.target, &self.shutdown).await?;
        let attributes = self
            .queue_service
            .get_queue_attributes(&url, &request.attribute_names)
            .await?;
        debug!(url = %url, count = attributes.len(), "Fetched queue attributes");
        Ok(attributes)
    }

    // ========================================================================
    // Messages
    // ========================================================================

    /// Send one message, creating the queue when it cannot be resolved
    pub async fn push(&self, request: PushRequest) -> Result<MessageId, QueueError> {
        let payload = match request.payload {
            Some(payload) if !payload.is_empty() => payload,
            _ => return Err(QueueError::MissingPayload),
        };
        let body = payload.encode()?;

        let url = match self.resolve(&request.target, &self.shutdown).await {
            Ok(url) => url,
            Err(e @ QueueError::Cancelled { .. }) => return Err(e),
            Err(e) => {
                let name = match &request.target {
                    QueueTarget::Name { name, .. } => self.effective_name(name),
                    QueueTarget::Url(url) => url.queue_name().to_string(),
                };
                warn!(queue = %name, error = %e, "Resolution failed, creating queue before sending");
                self.create_with_retry(&name, &Attributes::new(), &self.shutdown)
                    .await?
            }
        };

        let message_id = self
            .queue_service
            .send_message(&url, &body, &request.options)
            .await?;
        info!(url = %url, message_id = %message_id, bytes = body.len(), "Message sent");
        Ok(message_id)
    }

    /// Acknowledge a message by deleting it
    pub async fn delete_message(&self, request: DeleteMessageRequest) -> Result<(), QueueError> {
        let url = self.resolve(&request.target, &self.shutdown).await?;
        match self
            .queue_service
            .delete_message(&url, &request.receipt_handle)
            .await
        {
            Ok(()) => {
                debug!(url = %url, "Message deleted");
                Ok(())
            }
            Err(e) if e.kind() == ProviderErrorKind::InvalidReceiptHandle => {
                Err(QueueError::InvalidReceiptHandle {
                    receipt: request.receipt_handle.to_string(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Receive one batch and hand every message to `handler`.
    ///
    /// Handlers run concurrently; the call returns once all of them settled.
    pub async fn receive_message<H>(
        &self,
        request: impl Into<ReceiveRequest>,
        handler: &H,
    ) -> Result<BatchOutcome, QueueError>
    where
        H: MessageHandler + ?Sized,
    {
        let request = request.into();
        let url = self.resolve(&request.target, &self.shutdown).await?;
        self.receive_batch(&url, &request, handler).await
    }

    pub(crate) async fn receive_batch<H>(
        &self,
        url: &QueueUrl,
        request: &ReceiveRequest,
        handler: &H,
    ) -> Result<BatchOutcome, QueueError>
    where
        H: MessageHandler + ?Sized,
    {
        let raw = self
            .queue_service
            .receive_message(url, &request.options)
            .await?;
        if raw.is_empty() {
            debug!(url = %url, "No messages received");
            return Ok(BatchOutcome::default());
        }

        // Decode everything first so a malformed body fails the batch before any handler runs
        let messages = raw
            .into_iter()
            .map(|m| ReceivedMessage::decode(m, request.body_format))
            .collect::<Result<Vec<_>, _>>()?;

        let mut outcome = BatchOutcome {
            received: messages.len(),
            ..Default::default()
        };

        let dispositions = join_all(
            messages
                .into_iter()
                .map(|message| self.settle(url, message, handler)),
        )
        .await;

        for disposition in dispositions {
            match disposition {
                Disposition::Acknowledged => outcome.acknowledged += 1,
                Disposition::Rejected => outcome.rejected += 1,
                Disposition::DeleteFailed => outcome.delete_failed += 1,
            }
        }

        info!(
            url = %url,
            received = outcome.received,
            acknowledged = outcome.acknowledged,
            rejected = outcome.rejected,
            delete_failed = outcome.delete_failed,
            "Processed message batch"
        );
        Ok(outcome)
    }

    async fn settle<H>(&self, url: &QueueUrl, message: ReceivedMessage, handler: &H) -> Disposition
    where
        H: MessageHandler + ?Sized,
    {
        let message_id = message.message_id.clone();
        let receipt = message.receipt_handle.clone();

        if let Err(e) = handler.handle(message).await {
            warn!(message_id = %message_id, error = %e, "Handler rejected message, leaving it for redelivery");
            return Disposition::Rejected;
        }

        match self.queue_service.delete_message(url, &receipt).await {
            Ok(()) => {
                debug!(message_id = %message_id, "Message acknowledged");
                Disposition::Acknowledged
            }
            Err(e) => {
                warn!(message_id = %message_id, code = %e.code(), "Failed to delete acknowledged message");
                Disposition::DeleteFailed
            }
        }
    }
}
