//! In-memory queue service for testing and development.
//!
//! Implements both [`QueueService`] and [`IdentityService`] with the provider
//! semantics the client relies on:
//! - queue URLs scoped to a single account
//! - visibility timeouts and receipt handles that die with their delivery
//! - a cooldown after deletion during which the name cannot be re-created
//! - a call log and per-operation fault injection for assertions
//!
//! Long polling is not simulated: a receive on an empty queue returns at once.
//! Time is measured with `tokio::time`, so paused-clock tests behave.

use crate::error::ProviderError;
use crate::message::{AccountId, Attributes, MessageId, QueueUrl, RawMessage, ReceiptHandle};
use crate::service::{IdentityService, QueueService, ReceiveOptions, SendOptions};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

const DEFAULT_ACCOUNT: &str = "000000000000";
const DEFAULT_ENDPOINT: &str = "http://localhost:9324";
const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(30);
const DELETION_COOLDOWN: Duration = Duration::from_secs(60);

/// Backend operations, used to address the call log and fault injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceOperation {
    CreateQueue,
    GetQueueUrl,
    DeleteQueue,
    PurgeQueue,
    GetQueueAttributes,
    SendMessage,
    ReceiveMessage,
    DeleteMessage,
    GetCallerIdentity,
}

/// One recorded backend call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceCall {
    CreateQueue { name: String },
    GetQueueUrl { name: String, owner: Option<String> },
    DeleteQueue { url: String },
    PurgeQueue { url: String },
    GetQueueAttributes { url: String, names: Vec<String> },
    SendMessage { url: String, body: String },
    ReceiveMessage { url: String, max_messages: u32 },
    DeleteMessage { url: String, receipt: String },
    GetCallerIdentity,
}

impl ServiceCall {
    pub fn operation(&self) -> ServiceOperation {
        match self {
            Self::CreateQueue { .. } => ServiceOperation::CreateQueue,
            Self::GetQueueUrl { .. } => ServiceOperation::GetQueueUrl,
            Self::DeleteQueue { .. } => ServiceOperation::DeleteQueue,
            Self::PurgeQueue { .. } => ServiceOperation::PurgeQueue,
            Self::GetQueueAttributes { .. } => ServiceOperation::GetQueueAttributes,
            Self::SendMessage { .. } => ServiceOperation::SendMessage,
            Self::ReceiveMessage { .. } => ServiceOperation::ReceiveMessage,
            Self::DeleteMessage { .. } => ServiceOperation::DeleteMessage,
            Self::GetCallerIdentity => ServiceOperation::GetCallerIdentity,
        }
    }
}

// ============================================================================
// Internal Storage Structures
// ============================================================================

#[derive(Clone)]
struct StoredMessage {
    message_id: MessageId,
    body: String,
    message_group_id: Option<String>,
    available_at: Instant,
    receive_count: u32,
}

struct InFlightMessage {
    message: StoredMessage,
    visible_at: Instant,
}

struct StoredQueue {
    url: QueueUrl,
    attributes: Attributes,
    messages: VecDeque<StoredMessage>,
    in_flight: HashMap<String, InFlightMessage>,
}

impl StoredQueue {
    /// Return expired in-flight messages to the visible queue
    fn release_expired(&mut self, now: Instant) {
        let expired: Vec<String> = self
            .in_flight
            .iter()
            .filter(|(_, m)| now >= m.visible_at)
            .map(|(receipt, _)| receipt.clone())
            .collect();

        for receipt in expired {
            if let Some(in_flight) = self.in_flight.remove(&receipt) {
                self.messages.push_back(in_flight.message);
            }
        }
    }
}

#[derive(Default)]
struct State {
    queues: HashMap<String, StoredQueue>,
    deleted_at: HashMap<String, Instant>,
    calls: Vec<ServiceCall>,
    faults: HashMap<ServiceOperation, VecDeque<ProviderError>>,
}

impl State {
    /// Record the call and pop an injected fault for it, if any
    fn enter(&mut self, call: ServiceCall) -> Result<(), ProviderError> {
        let operation = call.operation();
        self.calls.push(call);
        match self.faults.get_mut(&operation).and_then(|f| f.pop_front()) {
            Some(fault) => Err(fault),
            None => Ok(()),
        }
    }

    fn queue_by_url(&mut self, url: &QueueUrl) -> Result<&mut StoredQueue, ProviderError> {
        self.queues
            .values_mut()
            .find(|q| &q.url == url)
            .ok_or_else(|| ProviderError::non_existent_queue(url.queue_name()))
    }
}

// ============================================================================
// InMemoryQueueService
// ============================================================================

/// In-memory queue and identity backend. Clones share the same storage.
#[derive(Clone)]
pub struct InMemoryQueueService {
    state: Arc<Mutex<State>>,
    account: AccountId,
    endpoint: String,
    deletion_cooldown: Duration,
}

impl Default for InMemoryQueueService {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryQueueService {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            account: AccountId::new(DEFAULT_ACCOUNT),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            deletion_cooldown: DELETION_COOLDOWN,
        }
    }

    pub fn with_account(mut self, account: impl Into<String>) -> Self {
        self.account = AccountId::new(account);
        self
    }

    pub fn with_deletion_cooldown(mut self, cooldown: Duration) -> Self {
        self.deletion_cooldown = cooldown;
        self
    }

    pub fn account(&self) -> &AccountId {
        &self.account
    }

    /// Make the next call of `operation` fail with `error`; faults queue up
    pub fn fail_next(&self, operation: ServiceOperation, error: ProviderError) {
        self.lock()
            .faults
            .entry(operation)
            .or_default()
            .push_back(error);
    }

    /// Every call made so far, in order
    pub fn calls(&self) -> Vec<ServiceCall> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self, operation: ServiceOperation) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.operation() == operation)
            .count()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn queue_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().queues.keys().cloned().collect();
        names.sort();
        names
    }

    /// Messages currently visible in `name`
    pub fn visible_count(&self, name: &str) -> usize {
        let now = Instant::now();
        let mut state = self.lock();
        match state.queues.get_mut(name) {
            Some(queue) => {
                queue.release_expired(now);
                queue.messages.iter().filter(|m| m.available_at <= now).count()
            }
            None => 0,
        }
    }

    /// Messages currently received but not yet deleted
    pub fn in_flight_count(&self, name: &str) -> usize {
        let now = Instant::now();
        let mut state = self.lock();
        match state.queues.get_mut(name) {
            Some(queue) => {
                queue.release_expired(now);
                queue.in_flight.len()
            }
            None => 0,
        }
    }

    fn url_for(&self, name: &str) -> Result<QueueUrl, ProviderError> {
        QueueUrl::new(format!("{}/{}/{}", self.endpoint, self.account, name))
            .map_err(|e| ProviderError::new("InvalidParameterValue", e.to_string()))
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A poisoned lock only means a test thread panicked; the data is still usable
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl QueueService for InMemoryQueueService {
    async fn create_queue(
        &self,
        name: &str,
        attributes: &Attributes,
    ) -> Result<QueueUrl, ProviderError> {
        let url = self.url_for(name)?;
        let now = Instant::now();
        let mut state = self.lock();
        state.enter(ServiceCall::CreateQueue {
            name: name.to_string(),
        })?;

        if let Some(deleted_at) = state.deleted_at.get(name) {
            if now.duration_since(*deleted_at) < self.deletion_cooldown {
                return Err(ProviderError::queue_deleted_recently(name));
            }
        }

        if let Some(existing) = state.queues.get(name) {
            if !attributes.is_empty() && &existing.attributes != attributes {
                return Err(ProviderError::new(
                    "QueueAlreadyExists",
                    format!("A queue named {} already exists with different attributes", name),
                ));
            }
            return Ok(existing.url.clone());
        }

        state.deleted_at.remove(name);
        state.queues.insert(
            name.to_string(),
            StoredQueue {
                url: url.clone(),
                attributes: attributes.clone(),
                messages: VecDeque::new(),
                in_flight: HashMap::new(),
            },
        );
        Ok(url)
    }

    async fn get_queue_url(
        &self,
        name: &str,
        owner: Option<&AccountId>,
    ) -> Result<QueueUrl, ProviderError> {
        let mut state = self.lock();
        state.enter(ServiceCall::GetQueueUrl {
            name: name.to_string(),
            owner: owner.map(|o| o.to_string()),
        })?;

        if owner.is_some_and(|o| o != &self.account) {
            return Err(ProviderError::non_existent_queue(name));
        }

        state
            .queues
            .get(name)
            .map(|q| q.url.clone())
            .ok_or_else(|| ProviderError::non_existent_queue(name))
    }

    async fn delete_queue(&self, url: &QueueUrl) -> Result<(), ProviderError> {
        let now = Instant::now();
        let mut state = self.lock();
        state.enter(ServiceCall::DeleteQueue {
            url: url.to_string(),
        })?;

        let name = url.queue_name().to_string();
        state.queue_by_url(url)?;
        state.queues.remove(&name);
        state.deleted_at.insert(name, now);
        Ok(())
    }

    async fn purge_queue(&self, url: &QueueUrl) -> Result<(), ProviderError> {
        let mut state = self.lock();
        state.enter(ServiceCall::PurgeQueue {
            url: url.to_string(),
        })?;

        let queue = state.queue_by_url(url)?;
        queue.messages.clear();
        queue.in_flight.clear();
        Ok(())
    }

    async fn get_queue_attributes(
        &self,
        url: &QueueUrl,
        names: &[String],
    ) -> Result<Attributes, ProviderError> {
        let now = Instant::now();
        let account = self.account.clone();
        let mut state = self.lock();
        state.enter(ServiceCall::GetQueueAttributes {
            url: url.to_string(),
            names: names.to_vec(),
        })?;

        let queue = state.queue_by_url(url)?;
        queue.release_expired(now);

        let mut all = queue.attributes.clone();
        all.insert(
            "ApproximateNumberOfMessages".to_string(),
            queue.messages.len().to_string(),
        );
        all.insert(
            "ApproximateNumberOfMessagesNotVisible".to_string(),
            queue.in_flight.len().to_string(),
        );
        all.insert(
            "QueueArn".to_string(),
            format!("arn:aws:sqs:local:{}:{}", account, url.queue_name()),
        );

        if names.is_empty() || names.iter().any(|n| n == "All") {
            return Ok(all);
        }

        Ok(all
            .into_iter()
            .filter(|(key, _)| names.iter().any(|n| n == key))
            .collect())
    }

    async fn send_message(
        &self,
        url: &QueueUrl,
        body: &str,
        options: &SendOptions,
    ) -> Result<MessageId, ProviderError> {
        let now = Instant::now();
        let mut state = self.lock();
        state.enter(ServiceCall::SendMessage {
            url: url.to_string(),
            body: body.to_string(),
        })?;

        let queue = state.queue_by_url(url)?;
        let message_id = MessageId::new(uuid::Uuid::new_v4().to_string());
        let delay = Duration::from_secs(u64::from(options.delay_seconds.unwrap_or(0)));
        queue.messages.push_back(StoredMessage {
            message_id: message_id.clone(),
            body: body.to_string(),
            message_group_id: options.message_group_id.clone(),
            available_at: now + delay,
            receive_count: 0,
        });
        Ok(message_id)
    }

    async fn receive_message(
        &self,
        url: &QueueUrl,
        options: &ReceiveOptions,
    ) -> Result<Vec<RawMessage>, ProviderError> {
        let now = Instant::now();
        let batch_size = options.batch_size();
        let mut state = self.lock();
        state.enter(ServiceCall::ReceiveMessage {
            url: url.to_string(),
            max_messages: batch_size,
        })?;

        let queue = state.queue_by_url(url)?;
        queue.release_expired(now);

        let visibility = options
            .visibility_timeout
            .map(|s| Duration::from_secs(u64::from(s)))
            .unwrap_or(DEFAULT_VISIBILITY_TIMEOUT);
        let wants = |name: &str| {
            options
                .attribute_names
                .iter()
                .any(|n| n == "All" || n == name)
        };

        let mut delivered = Vec::new();
        let mut waiting = VecDeque::new();
        while let Some(mut message) = queue.messages.pop_front() {
            if delivered.len() as u32 >= batch_size || message.available_at > now {
                waiting.push_back(message);
                continue;
            }

            message.receive_count += 1;
            let receipt = uuid::Uuid::new_v4().to_string();

            let mut attributes = Attributes::new();
            if wants("ApproximateReceiveCount") {
                attributes.insert(
                    "ApproximateReceiveCount".to_string(),
                    message.receive_count.to_string(),
                );
            }
            if let Some(group) = message.message_group_id.as_ref().filter(|_| wants("MessageGroupId")) {
                attributes.insert("MessageGroupId".to_string(), group.clone());
            }

            delivered.push(RawMessage {
                message_id: message.message_id.clone(),
                body: message.body.clone(),
                receipt_handle: ReceiptHandle::new(receipt.clone()),
                attributes,
            });
            queue.in_flight.insert(
                receipt,
                InFlightMessage {
                    message,
                    visible_at: now + visibility,
                },
            );
        }
        queue.messages = waiting;

        Ok(delivered)
    }

    async fn delete_message(
        &self,
        url: &QueueUrl,
        receipt: &ReceiptHandle,
    ) -> Result<(), ProviderError> {
        let now = Instant::now();
        let mut state = self.lock();
        state.enter(ServiceCall::DeleteMessage {
            url: url.to_string(),
            receipt: receipt.to_string(),
        })?;

        let queue = state.queue_by_url(url)?;
        queue.release_expired(now);
        queue
            .in_flight
            .remove(receipt.as_str())
            .map(|_| ())
            .ok_or_else(|| ProviderError::invalid_receipt_handle(receipt.as_str()))
    }
}

#[async_trait]
impl IdentityService for InMemoryQueueService {
    async fn get_caller_identity(&self) -> Result<AccountId, ProviderError> {
        self.lock().enter(ServiceCall::GetCallerIdentity)?;
        Ok(self.account.clone())
    }
}
