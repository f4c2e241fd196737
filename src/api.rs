use std::{sync::Arc, time::Duration};

use anyhow::{Error, Result};
use axum::{
    Router,
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
};
use serde::Deserialize;
use tokio::{net::TcpListener, time::timeout};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    clients::{broker::ExclusivePublisher, health::HealthChecker},
    dead_letter::DeadLetterStore,
    error::{ApiError, BrokerError},
    models::{
        dead_letter::{InspectEntry, RequeueRequest},
        health::{HealthCheckResponse, HealthStatus},
        message::{Message, NotificationRequest},
    },
};

pub struct ProducerState {
    pub publisher: ExclusivePublisher,
    pub main_queue: String,
    pub publish_timeout: Duration,
    pub health_checker: HealthChecker,
}

pub struct OperatorState {
    pub store: Arc<DeadLetterStore>,
    pub inspect_limit: i64,
    pub health_checker: HealthChecker,
}

pub fn producer_router(state: Arc<ProducerState>) -> Router {
    Router::new()
        .route("/notify", post(notify))
        .route(
            "/health",
            get(|State(state): State<Arc<ProducerState>>| async move {
                health_check(&state.health_checker).await
            }),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub fn operator_router(state: Arc<OperatorState>) -> Router {
    Router::new()
        .route("/inspect", get(inspect))
        .route("/requeue", post(requeue))
        .route(
            "/health",
            get(|State(state): State<Arc<OperatorState>>| async move {
                health_check(&state.health_checker).await
            }),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub fn health_router(health_checker: HealthChecker) -> Router {
    Router::new()
        .route(
            "/health",
            get(|State(checker): State<Arc<HealthChecker>>| async move {
                health_check(&checker).await
            }),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(health_checker))
}

pub async fn serve(app: Router, port: u16, name: &str) -> Result<(), Error> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;

    info!(address = %addr, server = name, "HTTP server started");

    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check(checker: &HealthChecker) -> (StatusCode, Json<HealthCheckResponse>) {
    let health = checker.check_all().await;

    let status_code = match health.status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

async fn notify(
    State(state): State<Arc<ProducerState>>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let request = serde_json::from_slice::<NotificationRequest>(&body)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let payload = serde_json::to_vec(&request)
        .map_err(|e| ApiError::Publish(BrokerError::operation("serialize", e.to_string())))?;
    let message = Message::json(payload).with_message_id(Uuid::new_v4().to_string());

    match timeout(
        state.publish_timeout,
        state.publisher.publish("", &state.main_queue, &message),
    )
    .await
    {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            warn!(message_id = message.id(), error = %e, "Failed to publish notification");
            return Err(ApiError::Publish(e));
        }
        Err(_) => {
            warn!(message_id = message.id(), "Publishing notification timed out");
            return Err(ApiError::Publish(BrokerError::Timeout(state.publish_timeout)));
        }
    }

    info!(
        message_id = message.id(),
        recipient = %request.email,
        "Notification queued"
    );

    Ok((StatusCode::OK, "Notification queued successfully"))
}

#[derive(Debug, Deserialize)]
struct InspectParams {
    limit: Option<i64>,
}

async fn inspect(
    State(state): State<Arc<OperatorState>>,
    Query(params): Query<InspectParams>,
) -> Result<Json<Vec<InspectEntry>>, ApiError> {
    let limit = params.limit.unwrap_or(state.inspect_limit);
    let records = state.store.list(limit).await.map_err(ApiError::Inspect)?;

    debug!(count = records.len(), limit, "Dead letters listed");

    Ok(Json(records.iter().map(InspectEntry::from).collect()))
}

async fn requeue(
    State(state): State<Arc<OperatorState>>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let request = serde_json::from_slice::<RequeueRequest>(&body)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    if request.message_id.trim().is_empty() {
        return Err(ApiError::BadRequest("MessageId cannot be empty".to_string()));
    }

    state
        .store
        .requeue(&request.message_id)
        .await
        .map_err(ApiError::Requeue)?;

    Ok((StatusCode::OK, "Notification requeued successfully"))
}
