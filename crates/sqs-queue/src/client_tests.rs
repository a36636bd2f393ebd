//! Tests for the queue client against the in-memory backend.

use super::*;
use crate::error::CODE_NON_EXISTENT_QUEUE;
use crate::message::{BodyFormat, Payload, ReceiptHandle};
use crate::providers::{InMemoryQueueService, ServiceCall, ServiceOperation};
use crate::service::SendOptions;
use serde_json::json;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

fn client_for(service: &InMemoryQueueService, prefix: &str) -> QueueClient {
    QueueClient::new(
        ClientConfig::default().with_prefix(prefix),
        Arc::new(service.clone()),
        Arc::new(service.clone()),
    )
}

/// Handler that records bodies and rejects messages whose text body is "bad"
fn recording_handler(seen: Arc<Mutex<Vec<Payload>>>) -> impl MessageHandler {
    move |message: ReceivedMessage| {
        let seen = seen.clone();
        async move {
            let reject = message.body.as_text() == Some("bad");
            seen.lock().unwrap().push(message.body);
            if reject {
                return Err(anyhow::anyhow!("rejected by handler"));
            }
            Ok::<(), anyhow::Error>(())
        }
    }
}

async fn seed(service: &InMemoryQueueService, name: &str, bodies: &[&str]) -> QueueUrl {
    let url = service.create_queue(name, &Attributes::new()).await.unwrap();
    for body in bodies {
        service
            .send_message(&url, body, &SendOptions::default())
            .await
            .unwrap();
    }
    service.clear_calls();
    url
}

// ============================================================================
// Naming and resolution
// ============================================================================

mod resolution {
    use super::*;

    #[test]
    fn test_effective_name() {
        let service = InMemoryQueueService::new();
        let client = client_for(&service, "app-");
        assert_eq!(client.effective_name("orders"), "app-orders");
        assert_eq!(client.effective_name("app-orders"), "app-orders");

        let unprefixed = client_for(&service, "");
        assert_eq!(unprefixed.effective_name("orders"), "orders");
    }

    #[tokio::test]
    async fn test_owner_account_id() {
        let service = InMemoryQueueService::new().with_account("123456789012");
        let client = client_for(&service, "");
        assert_eq!(
            client.get_queue_owner_account_id().await.unwrap(),
            AccountId::new("123456789012")
        );
    }

    /// Verify resolving an existing queue twice yields the same URL and never creates.
    #[tokio::test]
    async fn test_resolution_is_idempotent() {
        let service = InMemoryQueueService::new();
        let existing = seed(&service, "app-orders", &[]).await;
        let client = client_for(&service, "app-");

        let first = client.get_queue_url("orders").await.unwrap();
        let second = client.get_queue_url("orders").await.unwrap();

        assert_eq!(first, existing);
        assert_eq!(second, existing);
        assert_eq!(service.call_count(ServiceOperation::CreateQueue), 0);
        assert_eq!(service.call_count(ServiceOperation::GetCallerIdentity), 2);
        assert_eq!(service.call_count(ServiceOperation::GetQueueUrl), 2);
    }

    /// Verify a missing queue is created exactly once and the URL is usable.
    #[tokio::test]
    async fn test_create_on_miss() {
        let service = InMemoryQueueService::new();
        let client = client_for(&service, "app-");

        let url = client.get_queue_url("orders").await.unwrap();

        assert_eq!(
            service.calls(),
            vec![
                ServiceCall::GetCallerIdentity,
                ServiceCall::GetQueueUrl {
                    name: "app-orders".to_string(),
                    owner: Some("000000000000".to_string()),
                },
                ServiceCall::CreateQueue {
                    name: "app-orders".to_string()
                },
            ]
        );
        assert_eq!(client.get_queue_url("orders").await.unwrap(), url);
        assert_eq!(service.call_count(ServiceOperation::CreateQueue), 1);
    }

    #[tokio::test]
    async fn test_url_target_skips_lookup() {
        let service = InMemoryQueueService::new();
        let url = seed(&service, "orders", &[]).await;
        let client = client_for(&service, "app-");

        assert_eq!(client.get_queue_url(url.clone()).await.unwrap(), url);
        assert!(service.calls().is_empty());
    }

    #[tokio::test]
    async fn test_owner_override_skips_identity() {
        let service = InMemoryQueueService::new().with_account("111122223333");
        seed(&service, "orders", &[]).await;
        let client = client_for(&service, "");

        let target = QueueTarget::name("orders").with_owner(AccountId::new("111122223333"));
        client.get_queue_url(target).await.unwrap();
        assert_eq!(service.call_count(ServiceOperation::GetCallerIdentity), 0);
    }

    #[tokio::test]
    async fn test_other_lookup_failures_are_resolution_failures() {
        let service = InMemoryQueueService::new();
        service.fail_next(
            ServiceOperation::GetQueueUrl,
            ProviderError::new("AccessDenied", "not allowed"),
        );
        let client = client_for(&service, "app-");

        let err = client.get_queue_url("orders").await.unwrap_err();
        match err {
            QueueError::ResolutionFailed { queue_name, source } => {
                assert_eq!(queue_name, "app-orders");
                assert_eq!(source.code(), "AccessDenied");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(service.call_count(ServiceOperation::CreateQueue), 0);
    }

    #[tokio::test]
    async fn test_identity_failure_is_resolution_failure() {
        let service = InMemoryQueueService::new();
        service.fail_next(
            ServiceOperation::GetCallerIdentity,
            ProviderError::new("ExpiredToken", "expired"),
        );
        let client = client_for(&service, "");

        let err = client.get_queue_url("orders").await.unwrap_err();
        assert!(matches!(err, QueueError::ResolutionFailed { .. }));
        assert_eq!(err.provider_code(), Some("ExpiredToken"));
    }
}

// ============================================================================
// Queue lifecycle
// ============================================================================

mod lifecycle {
    use super::*;

    /// Verify creation waits out the deletion cooldown with a fixed delay.
    #[tokio::test(start_paused = true)]
    async fn test_create_retries_after_recent_deletion() {
        let service = InMemoryQueueService::new();
        for _ in 0..2 {
            service.fail_next(
                ServiceOperation::CreateQueue,
                ProviderError::queue_deleted_recently("app-orders"),
            );
        }
        let client = client_for(&service, "app-");

        let started = Instant::now();
        let url = client.create_queue("orders").await.unwrap();

        assert_eq!(url.queue_name(), "app-orders");
        assert_eq!(service.call_count(ServiceOperation::CreateQueue), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(120));
    }

    /// Verify cancelling during the retry delay stops creation.
    #[tokio::test(start_paused = true)]
    async fn test_create_retry_is_cancellable() {
        let service = InMemoryQueueService::new();
        service.fail_next(
            ServiceOperation::CreateQueue,
            ProviderError::queue_deleted_recently("orders"),
        );
        let client = client_for(&service, "");
        let token = client.cancellation_token().clone();

        let task = tokio::spawn({
            let client = client.clone();
            async move { client.create_queue("orders").await }
        });

        tokio::time::sleep(Duration::from_secs(10)).await;
        token.cancel();

        let result = task.await.unwrap();
        assert!(matches!(result, Err(QueueError::Cancelled { .. })));
        assert_eq!(service.call_count(ServiceOperation::CreateQueue), 1);
    }

    #[tokio::test]
    async fn test_create_on_cancelled_client_makes_no_calls() {
        let service = InMemoryQueueService::new();
        let token = CancellationToken::new();
        token.cancel();
        let client = client_for(&service, "").with_cancellation(token);

        assert!(matches!(
            client.create_queue("orders").await,
            Err(QueueError::Cancelled { .. })
        ));
        assert!(service.calls().is_empty());
    }

    #[tokio::test]
    async fn test_other_create_failures_surface_immediately() {
        let service = InMemoryQueueService::new();
        service.fail_next(
            ServiceOperation::CreateQueue,
            ProviderError::new("InvalidAttributeName", "bad attribute"),
        );
        let client = client_for(&service, "");

        let err = client.create_queue("orders").await.unwrap_err();
        assert_eq!(err.provider_code(), Some("InvalidAttributeName"));
        assert_eq!(service.call_count(ServiceOperation::CreateQueue), 1);
    }

    #[tokio::test]
    async fn test_create_with_attributes() {
        let service = InMemoryQueueService::new();
        let client = client_for(&service, "app-");

        let url = client
            .create_queue(CreateQueueRequest::new("orders").with_attribute("VisibilityTimeout", "45"))
            .await
            .unwrap();
        let attributes = client
            .get_queue_attributes(AttributesRequest::new(url).with_names(["VisibilityTimeout"]))
            .await
            .unwrap();
        assert_eq!(attributes["VisibilityTimeout"], "45");
    }

    #[tokio::test]
    async fn test_purge_and_delete() {
        let service = InMemoryQueueService::new();
        seed(&service, "app-orders", &["a", "b"]).await;
        let client = client_for(&service, "app-");

        client.purge_queue("orders").await.unwrap();
        assert_eq!(service.visible_count("app-orders"), 0);

        client.delete_queue("orders").await.unwrap();
        assert!(service.queue_names().is_empty());
    }

    #[tokio::test]
    async fn test_attributes_on_missing_queue_creates_it() {
        let service = InMemoryQueueService::new();
        let client = client_for(&service, "");

        let attributes = client
            .get_queue_attributes(AttributesRequest::new("orders"))
            .await
            .unwrap();
        assert_eq!(attributes["ApproximateNumberOfMessages"], "0");
        assert_eq!(service.queue_names(), vec!["orders".to_string()]);
    }
}

// ============================================================================
// Push
// ============================================================================

mod push {
    use super::*;

    /// Verify a prefixed push creates the queue and sends JSON text.
    #[tokio::test]
    async fn test_push_creates_queue_and_serializes() {
        let service = InMemoryQueueService::new();
        let client = client_for(&service, "app-");

        let id = client
            .push(PushRequest::new("orders", json!({"id": 1})))
            .await
            .unwrap();

        assert!(!id.as_str().is_empty());
        assert_eq!(service.call_count(ServiceOperation::CreateQueue), 1);
        let sends: Vec<ServiceCall> = service
            .calls()
            .into_iter()
            .filter(|c| c.operation() == ServiceOperation::SendMessage)
            .collect();
        assert_eq!(sends.len(), 1);
        assert!(matches!(
            &sends[0],
            ServiceCall::SendMessage { body, .. } if body == r#"{"id":1}"#
        ));
    }

    #[tokio::test]
    async fn test_missing_payload_makes_no_calls() {
        let service = InMemoryQueueService::new();
        let client = client_for(&service, "");

        let without = PushRequest {
            target: QueueTarget::name("orders"),
            payload: None,
            options: SendOptions::default(),
        };
        for request in [
            without,
            PushRequest::new("orders", ""),
            PushRequest::new("orders", serde_json::Value::Null),
        ] {
            assert!(matches!(
                client.push(request).await,
                Err(QueueError::MissingPayload)
            ));
        }
        assert!(service.calls().is_empty());
    }

    /// Verify any resolution failure leads to one explicit create before sending.
    #[tokio::test]
    async fn test_push_creates_after_failed_resolution() {
        let service = InMemoryQueueService::new();
        service.fail_next(
            ServiceOperation::GetQueueUrl,
            ProviderError::new("AccessDenied", "not allowed"),
        );
        let client = client_for(&service, "");

        client.push(PushRequest::new("orders", "hello")).await.unwrap();

        assert_eq!(service.call_count(ServiceOperation::CreateQueue), 1);
        assert_eq!(service.call_count(ServiceOperation::SendMessage), 1);
        assert_eq!(service.visible_count("orders"), 1);
    }

    #[tokio::test]
    async fn test_push_send_failure_surfaces() {
        let service = InMemoryQueueService::new();
        seed(&service, "orders", &[]).await;
        service.fail_next(
            ServiceOperation::SendMessage,
            ProviderError::new("InvalidMessageContents", "bad body"),
        );
        let client = client_for(&service, "");

        let err = client
            .push(PushRequest::new("orders", "hello"))
            .await
            .unwrap_err();
        assert_eq!(err.provider_code(), Some("InvalidMessageContents"));
    }

    #[tokio::test]
    async fn test_push_to_missing_queue_after_lookup_miss() {
        let service = InMemoryQueueService::new();
        service.fail_next(
            ServiceOperation::GetQueueUrl,
            ProviderError::new(CODE_NON_EXISTENT_QUEUE, "missing"),
        );
        let client = client_for(&service, "");

        client.push(PushRequest::new("orders", "hi")).await.unwrap();
        assert_eq!(service.call_count(ServiceOperation::CreateQueue), 1);
    }
}

// ============================================================================
// Receive and acknowledge
// ============================================================================

mod receive {
    use super::*;

    #[tokio::test]
    async fn test_empty_batch_succeeds() {
        let service = InMemoryQueueService::new();
        seed(&service, "orders", &[]).await;
        let client = client_for(&service, "");
        let seen = Arc::new(Mutex::new(Vec::new()));

        let outcome = client
            .receive_message("orders", &recording_handler(seen.clone()))
            .await
            .unwrap();

        assert!(outcome.is_empty());
        assert!(seen.lock().unwrap().is_empty());
    }

    /// Verify acknowledged messages are deleted once and rejected ones are not.
    #[tokio::test]
    async fn test_ack_and_reject() {
        let service = InMemoryQueueService::new();
        seed(&service, "orders", &["good", "bad", r#"{"id":1}"#]).await;
        let client = client_for(&service, "");
        let seen = Arc::new(Mutex::new(Vec::new()));

        let outcome = client
            .receive_message(
                ReceiveRequest::new("orders").with_max_messages(10),
                &recording_handler(seen.clone()),
            )
            .await
            .unwrap();

        assert_eq!(
            outcome,
            BatchOutcome {
                received: 3,
                acknowledged: 2,
                rejected: 1,
                delete_failed: 0,
            }
        );
        assert_eq!(service.call_count(ServiceOperation::DeleteMessage), 2);
        assert_eq!(service.in_flight_count("orders"), 1);
        assert!(seen
            .lock()
            .unwrap()
            .contains(&Payload::Json(json!({"id": 1}))));
    }

    /// Verify strict JSON decoding fails the batch before any handler runs.
    #[tokio::test]
    async fn test_malformed_body_in_strict_mode() {
        let service = InMemoryQueueService::new();
        seed(&service, "orders", &[r#"{"id":1}"#, "not json"]).await;
        let client = client_for(&service, "");
        let seen = Arc::new(Mutex::new(Vec::new()));

        let err = client
            .receive_message(
                ReceiveRequest::new("orders")
                    .with_max_messages(10)
                    .with_body_format(BodyFormat::Json),
                &recording_handler(seen.clone()),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, QueueError::MalformedBody { .. }));
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(service.call_count(ServiceOperation::DeleteMessage), 0);
    }

    #[tokio::test]
    async fn test_delete_failure_is_counted() {
        let service = InMemoryQueueService::new();
        seed(&service, "orders", &["good"]).await;
        service.fail_next(
            ServiceOperation::DeleteMessage,
            ProviderError::new("ServiceUnavailable", "try later"),
        );
        let client = client_for(&service, "");

        let outcome = client
            .receive_message("orders", &recording_handler(Arc::new(Mutex::new(Vec::new()))))
            .await
            .unwrap();
        assert_eq!(outcome.acknowledged, 0);
        assert_eq!(outcome.delete_failed, 1);
    }

    /// Verify handlers run concurrently and the batch waits for the slowest.
    #[tokio::test(start_paused = true)]
    async fn test_batch_joins_all_handlers() {
        let service = InMemoryQueueService::new();
        seed(&service, "orders", &["3", "1", "2"]).await;
        let client = client_for(&service, "");
        let finished = Arc::new(Mutex::new(Vec::new()));

        let handler = {
            let finished = finished.clone();
            move |message: ReceivedMessage| {
                let finished = finished.clone();
                async move {
                    let secs: u64 = message.raw_body.parse()?;
                    tokio::time::sleep(Duration::from_secs(secs)).await;
                    finished.lock().unwrap().push(secs);
                    Ok::<(), anyhow::Error>(())
                }
            }
        };

        let started = Instant::now();
        let outcome = client
            .receive_message(ReceiveRequest::new("orders").with_max_messages(3), &handler)
            .await
            .unwrap();

        assert_eq!(outcome.acknowledged, 3);
        assert_eq!(*finished.lock().unwrap(), vec![1, 2, 3]);
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_delete_message_with_consumed_receipt() {
        let service = InMemoryQueueService::new();
        let url = seed(&service, "orders", &["hello"]).await;
        let received = service
            .receive_message(&url, &Default::default())
            .await
            .unwrap();
        let receipt = received[0].receipt_handle.clone();
        let client = client_for(&service, "");

        client
            .delete_message(DeleteMessageRequest::new("orders", receipt.clone()))
            .await
            .unwrap();
        let err = client
            .delete_message(DeleteMessageRequest::new("orders", receipt))
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::InvalidReceiptHandle { .. }));

        let err = client
            .delete_message(DeleteMessageRequest::new(
                "orders",
                ReceiptHandle::new("never-issued"),
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::InvalidReceiptHandle { receipt } if receipt == "never-issued"));
    }
}
