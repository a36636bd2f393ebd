//! Message handler contract for receive and pull.
//!
//! A handler acknowledges a message by returning `Ok(())`; the message is then
//! deleted. Returning an error leaves the message on the queue, where it
//! becomes visible again once its visibility timeout expires.

use crate::message::ReceivedMessage;
use async_trait::async_trait;
use std::future::Future;

/// Processes received messages
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: ReceivedMessage) -> anyhow::Result<()>;
}

/// Any async closure over a message is a handler
#[async_trait]
impl<F, Fut> MessageHandler for F
where
    F: Fn(ReceivedMessage) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn handle(&self, message: ReceivedMessage) -> anyhow::Result<()> {
        (self)(message).await
    }
}
