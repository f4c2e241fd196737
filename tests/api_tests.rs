mod common;

use std::{
    sync::{Arc, atomic::Ordering},
    time::Duration,
};

use anyhow::Result;
use axum::Router;
use chrono::Utc;
use common::{FakeConnection, InMemoryRepository, RecordingBroker, notification};
use notify_service::{
    api::{OperatorState, ProducerState, health_router, operator_router, producer_router},
    clients::{broker::ExclusivePublisher, health::HealthChecker},
    dead_letter::DeadLetterStore,
    models::{
        dead_letter::InspectEntry,
        health::{HealthCheckResponse, HealthStatus},
        message::{JSON_CONTENT_TYPE, NotificationRequest},
    },
};
use reqwest::StatusCode;
use serde_json::{Value, json};
use tokio::net::TcpListener;

async fn spawn_app(app: Router) -> Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let address = listener.local_addr()?;

    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    Ok(format!("http://{}", address))
}

async fn spawn_producer(publisher: Arc<RecordingBroker>) -> Result<String> {
    let state = Arc::new(ProducerState {
        publisher: ExclusivePublisher::new(publisher),
        main_queue: "notification".to_string(),
        publish_timeout: Duration::from_secs(5),
        health_checker: HealthChecker::new().with_broker(FakeConnection::new()),
    });

    spawn_app(producer_router(state)).await
}

async fn spawn_operator(
    repository: Arc<InMemoryRepository>,
    publisher: Arc<RecordingBroker>,
) -> Result<String> {
    let state = Arc::new(OperatorState {
        store: Arc::new(DeadLetterStore::new(
            repository.clone(),
            publisher,
            "notification",
        )),
        inspect_limit: 10,
        health_checker: HealthChecker::new().with_repository(repository),
    });

    spawn_app(operator_router(state)).await
}

/// Test: A valid notification is published to the main queue
#[tokio::test]
async fn test_notify_publishes_to_main_queue() -> Result<()> {
    let publisher = RecordingBroker::new();
    let base = spawn_producer(publisher.clone()).await?;

    let response = reqwest::Client::new()
        .post(format!("{}/notify", base))
        .json(&notification("user@example.com"))
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await?, "Notification queued successfully");

    let published = publisher.published();
    assert_eq!(published.len(), 1);
    let (exchange, routing_key, message) = &published[0];
    assert_eq!(exchange, "");
    assert_eq!(routing_key, "notification");
    assert_eq!(message.content_type.as_deref(), Some(JSON_CONTENT_TYPE));
    assert!(!message.id().is_empty(), "Producer must assign a message id");

    let body: NotificationRequest = serde_json::from_slice(&message.body)?;
    assert_eq!(body, notification("user@example.com"));

    Ok(())
}

/// Test: Every published notification gets its own id
#[tokio::test]
async fn test_notify_assigns_distinct_message_ids() -> Result<()> {
    let publisher = RecordingBroker::new();
    let base = spawn_producer(publisher.clone()).await?;
    let client = reqwest::Client::new();

    for _ in 0..2 {
        client
            .post(format!("{}/notify", base))
            .json(&notification("user@example.com"))
            .send()
            .await?;
    }

    let published = publisher.published();
    assert_eq!(published.len(), 2);
    assert_ne!(published[0].2.id(), published[1].2.id());

    Ok(())
}

/// Test: A malformed body is rejected before publishing
#[tokio::test]
async fn test_notify_rejects_malformed_body() -> Result<()> {
    let publisher = RecordingBroker::new();
    let base = spawn_producer(publisher.clone()).await?;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/notify", base))
        .body("{not json")
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = client
        .post(format!("{}/notify", base))
        .json(&json!({ "email": "user@example.com" }))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert!(publisher.published().is_empty());

    Ok(())
}

/// Test: Only POST is accepted on /notify
#[tokio::test]
async fn test_notify_rejects_other_methods() -> Result<()> {
    let base = spawn_producer(RecordingBroker::new()).await?;

    let response = reqwest::get(format!("{}/notify", base)).await?;

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);

    Ok(())
}

/// Test: A broker failure surfaces as a server error
#[tokio::test]
async fn test_notify_publish_failure() -> Result<()> {
    let base = spawn_producer(RecordingBroker::failing_publish()).await?;

    let response = reqwest::Client::new()
        .post(format!("{}/notify", base))
        .json(&notification("user@example.com"))
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json().await?;
    assert!(body["error"].is_string());

    Ok(())
}

/// Test: /inspect lists stored dead letters in the documented shape
#[tokio::test]
async fn test_inspect_lists_dead_letters() -> Result<()> {
    let repository = InMemoryRepository::new();
    repository.seed(
        "dead-1",
        json!({ "x-retry-count": 3 }),
        br#"{"email":"a@b.com","message":"hi","subject":"s"}"#,
    );
    let base = spawn_operator(repository, RecordingBroker::new()).await?;

    let response = reqwest::get(format!("{}/inspect", base)).await?;
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await?;
    assert_eq!(
        body,
        json!([{
            "ID": "dead-1",
            "Headers": { "x-retry-count": 3 },
            "Payload": r#"{"email":"a@b.com","message":"hi","subject":"s"}"#,
            "Type": "application/json"
        }])
    );

    Ok(())
}

/// Test: The limit parameter caps the listing
#[tokio::test]
async fn test_inspect_honours_limit() -> Result<()> {
    let repository = InMemoryRepository::new();
    for id in ["a", "b", "c"] {
        repository.seed(id, json!({}), b"{}");
    }
    let base = spawn_operator(repository, RecordingBroker::new()).await?;

    let entries: Vec<InspectEntry> = reqwest::get(format!("{}/inspect?limit=2", base))
        .await?
        .json()
        .await?;
    assert_eq!(entries.len(), 2);

    let entries: Vec<InspectEntry> = reqwest::get(format!("{}/inspect", base))
        .await?
        .json()
        .await?;
    assert_eq!(entries.len(), 3);

    Ok(())
}

/// Test: An undecodable stored row fails the listing
#[tokio::test]
async fn test_inspect_fails_on_bad_row() -> Result<()> {
    let repository = InMemoryRepository::new();
    repository.seed("broken", json!(42), b"{}");
    let base = spawn_operator(repository, RecordingBroker::new()).await?;

    let response = reqwest::get(format!("{}/inspect", base)).await?;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    Ok(())
}

/// Test: /requeue republishes and removes the stored message
#[tokio::test]
async fn test_requeue_endpoint() -> Result<()> {
    let repository = InMemoryRepository::new();
    let publisher = RecordingBroker::new();
    repository.seed("the-id", json!({}), b"{}");
    let base = spawn_operator(repository.clone(), publisher.clone()).await?;

    let response = reqwest::Client::new()
        .post(format!("{}/requeue", base))
        .json(&json!({ "MessageId": "the-id" }))
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await?, "Notification requeued successfully");
    assert_eq!(publisher.published().len(), 1);
    assert_eq!(publisher.published()[0].1, "notification");
    assert!(repository.get("the-id").is_none());

    Ok(())
}

/// Test: Alternate casings of the message id field are accepted
#[tokio::test]
async fn test_requeue_accepts_field_aliases() -> Result<()> {
    let repository = InMemoryRepository::new();
    repository.seed("first", json!({}), b"{}");
    repository.seed("second", json!({}), b"{}");
    let base = spawn_operator(repository.clone(), RecordingBroker::new()).await?;
    let client = reqwest::Client::new();

    for body in [json!({ "messageId": "first" }), json!({ "message_id": "second" })] {
        let response = client
            .post(format!("{}/requeue", base))
            .json(&body)
            .send()
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
    }

    assert!(repository.rows().is_empty());

    Ok(())
}

/// Test: Requeue rejects bad bodies and reports unknown ids as failures
#[tokio::test]
async fn test_requeue_errors() -> Result<()> {
    let base = spawn_operator(InMemoryRepository::new(), RecordingBroker::new()).await?;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/requeue", base))
        .body("garbage")
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = client
        .post(format!("{}/requeue", base))
        .json(&json!({ "MessageId": "  " }))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = client
        .post(format!("{}/requeue", base))
        .json(&json!({ "MessageId": "unknown" }))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    Ok(())
}

/// Test: Health reports each dependency and fails when one is down
#[tokio::test]
async fn test_health_endpoint() -> Result<()> {
    let connection = FakeConnection::new();
    let checker = HealthChecker::new()
        .with_broker(connection.clone())
        .with_repository(InMemoryRepository::new());
    let base = spawn_app(health_router(checker)).await?;

    let before = Utc::now();
    let response = reqwest::get(format!("{}/health", base)).await?;
    assert_eq!(response.status(), StatusCode::OK);

    let health: HealthCheckResponse = response.json().await?;
    assert_eq!(health.status, HealthStatus::Healthy);
    assert!(health.timestamp >= before && health.timestamp <= Utc::now());
    assert!(health.checks.contains_key("message_broker"));
    assert!(health.checks.contains_key("database"));

    connection.disconnected.store(true, Ordering::SeqCst);

    let response = reqwest::get(format!("{}/health", base)).await?;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let health: HealthCheckResponse = response.json().await?;
    assert_eq!(health.status, HealthStatus::Unhealthy);
    assert_eq!(
        health.checks["message_broker"].status,
        HealthStatus::Unhealthy
    );

    Ok(())
}
