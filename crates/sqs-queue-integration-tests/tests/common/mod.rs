//! Common test utilities for sqs-queue integration tests
//!
//! This module provides:
//! - Client construction over the in-memory backend
//! - Recording message handlers
//! - Log capture for test output

use sqs_queue::{
    ClientConfig, InMemoryQueueService, MessageHandler, Payload, QueueClient, ReceivedMessage,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Route client logs to the test harness output
#[allow(dead_code)]
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("sqs_queue=debug")
        .with_test_writer()
        .try_init();
}

/// Client with the given prefix over a fresh in-memory backend
#[allow(dead_code)]
pub fn in_memory_client(prefix: &str) -> (QueueClient, InMemoryQueueService) {
    init_logging();
    let service = InMemoryQueueService::new();
    let client = QueueClient::new(
        ClientConfig::default().with_prefix(prefix),
        Arc::new(service.clone()),
        Arc::new(service.clone()),
    );
    (client, service)
}

/// Decoded bodies seen by a [`recording_handler`], in completion order
pub type Seen = Arc<Mutex<Vec<Payload>>>;

/// Handler that records every body and rejects the text body `"reject"`
#[allow(dead_code)]
pub fn recording_handler(seen: Seen) -> impl MessageHandler {
    move |message: ReceivedMessage| {
        let seen = seen.clone();
        async move {
            let body = message.body.clone();
            seen.lock().unwrap().push(body.clone());
            if body.as_text() == Some("reject") {
                anyhow::bail!("rejected {}", message.message_id);
            }
            Ok(())
        }
    }
}

/// Handler that sleeps for the number of seconds in its body before recording it
#[allow(dead_code)]
pub fn sleeping_handler(seen: Seen) -> impl MessageHandler {
    move |message: ReceivedMessage| {
        let seen = seen.clone();
        async move {
            let seconds = message.body.as_json().and_then(|v| v.as_u64()).unwrap_or(0);
            tokio::time::sleep(Duration::from_secs(seconds)).await;
            seen.lock().unwrap().push(message.body);
            Ok::<(), anyhow::Error>(())
        }
    }
}
