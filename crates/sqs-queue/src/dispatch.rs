//! Positional-argument entry points with completion callbacks.
//!
//! These wrap the typed client operations for callers that pass a queue
//! name, payload, options and a trailing callback in any of the shapes
//! accepted by [`normalize`]. The completion, when given, sees the result
//! before it is returned. Argument shape errors are returned without calling
//! it, since they are detected before the operation runs.
//!
//! ```no_run
//! use serde_json::json;
//! use sqs_queue::{Arg, ClientConfig, Completion, OperationKind, QueueClient};
//!
//! # async fn example() -> Result<(), sqs_queue::QueueError> {
//! let client = QueueClient::from_config(ClientConfig::new("us-east-1").with_prefix("app-"))?;
//! let completion: Completion = Box::new(|result| println!("pushed: {:?}", result.is_ok()));
//! client
//!     .invoke(
//!         OperationKind::Push,
//!         vec![
//!             Arg::from("orders"),
//!             Arg::from(json!({"id": 1})),
//!             Arg::Handler(completion),
//!         ],
//!     )
//!     .await?;
//! # Ok(())
//! # }
//! ```

use crate::client::{BatchOutcome, QueueClient};
use crate::error::QueueError;
use crate::handler::MessageHandler;
use crate::message::{AccountId, Attributes, MessageId, QueueUrl};
use crate::pull::PullSummary;
use crate::request::{normalize, Arg, OperationKind, OperationRequest};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;

/// Result of a dispatched operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    AccountId(AccountId),
    QueueUrl(QueueUrl),
    Attributes(Attributes),
    Created(QueueUrl),
    Deleted,
    Purged,
    Sent(MessageId),
    MessageDeleted,
}

/// Completion callback for [`QueueClient::invoke`]
pub type Completion = Box<dyn FnOnce(&Result<Outcome, QueueError>) + Send + Sync>;

fn complete(
    completion: Option<Completion>,
    result: Result<Outcome, QueueError>,
) -> Result<Outcome, QueueError> {
    if let Some(completion) = completion {
        completion(&result);
    }
    result
}

impl QueueClient {
    /// Run a queue or message operation from positional arguments.
    ///
    /// Receive and pull take a message handler instead of a completion and
    /// fail here with `InvalidArguments`; use [`Self::invoke_receive`] and
    /// [`Self::invoke_pull`] for those.
    pub async fn invoke(
        &self,
        kind: OperationKind,
        args: Vec<Arg<Completion>>,
    ) -> Result<Outcome, QueueError> {
        let mut request = normalize(kind, args)?;
        let completion = request.take_handler();
        debug!(operation = %kind, has_completion = completion.is_some(), "Dispatching operation");

        let result = self.run(&request).await;
        complete(completion, result)
    }

    async fn run(&self, request: &OperationRequest<Completion>) -> Result<Outcome, QueueError> {
        match request.kind {
            OperationKind::GetQueueUrl => {
                let target = request.target()?;
                Ok(Outcome::QueueUrl(self.get_queue_url(target).await?))
            }
            OperationKind::GetQueueAttributes => {
                let attributes = self
                    .get_queue_attributes(request.to_attributes_request()?)
                    .await?;
                Ok(Outcome::Attributes(attributes))
            }
            OperationKind::CreateQueue => {
                let url = self.create_queue(request.to_create_request()?).await?;
                Ok(Outcome::Created(url))
            }
            OperationKind::DeleteQueue => {
                self.delete_queue(request.target()?).await?;
                Ok(Outcome::Deleted)
            }
            OperationKind::PurgeQueue => {
                self.purge_queue(request.target()?).await?;
                Ok(Outcome::Purged)
            }
            OperationKind::Push => Ok(Outcome::Sent(
                self.push(request.to_push_request()?).await?,
            )),
            OperationKind::DeleteMessage => {
                self.delete_message(request.to_delete_message_request()?)
                    .await?;
                Ok(Outcome::MessageDeleted)
            }
            OperationKind::ReceiveMessage | OperationKind::Pull => {
                Err(QueueError::invalid_arguments(format!(
                    "{} takes a message handler, use invoke_receive or invoke_pull",
                    request.kind
                )))
            }
        }
    }

    /// Caller account lookup with an optional completion
    pub async fn invoke_owner_account_id(
        &self,
        completion: Option<Completion>,
    ) -> Result<Outcome, QueueError> {
        let result = self
            .get_queue_owner_account_id()
            .await
            .map(Outcome::AccountId);
        complete(completion, result)
    }

    /// Receive one batch; the handler slot holds the message handler
    pub async fn invoke_receive(
        &self,
        args: Vec<Arg<Arc<dyn MessageHandler>>>,
    ) -> Result<BatchOutcome, QueueError> {
        let mut request = normalize(OperationKind::ReceiveMessage, args)?;
        let handler = required_handler(&mut request)?;
        let receive = request.to_receive_request()?;
        self.receive_message(receive, handler.as_ref()).await
    }

    /// Run the pull loop; the handler slot holds the message handler
    pub async fn invoke_pull(
        &self,
        args: Vec<Arg<Arc<dyn MessageHandler>>>,
        cancel: &CancellationToken,
    ) -> Result<PullSummary, QueueError> {
        let mut request = normalize(OperationKind::Pull, args)?;
        let handler = required_handler(&mut request)?;
        let receive = request.to_receive_request()?;
        self.pull(receive, handler.as_ref(), cancel).await
    }
}

fn required_handler(
    request: &mut OperationRequest<Arc<dyn MessageHandler>>,
) -> Result<Arc<dyn MessageHandler>, QueueError> {
    request.take_handler().ok_or_else(|| {
        QueueError::invalid_arguments(format!("{} needs a message handler", request.kind))
    })
}
