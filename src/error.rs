use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Failure of a broker call. Never retried beneath the caller.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker transport error: {0}")]
    Transport(#[from] lapin::Error),

    #[error("{operation} failed: {reason}")]
    Operation {
        operation: &'static str,
        reason: String,
    },

    #[error("publish timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl BrokerError {
    pub fn operation(operation: &'static str, reason: impl Into<String>) -> Self {
        BrokerError::Operation {
            operation,
            reason: reason.into(),
        }
    }
}

/// Failure reported by an email transport.
#[derive(Debug, Error)]
pub enum SendError {
    /// The address can never be delivered to; skip retries.
    #[error("invalid recipient {email}: {reason}")]
    InvalidRecipient { email: String, reason: String },

    #[error("transient send failure: {0}")]
    Transient(String),
}

impl SendError {
    pub fn is_permanent(&self) -> bool {
        matches!(self, SendError::InvalidRecipient { .. })
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    #[error("failed to decode stored message: {0}")]
    Decode(String),

    #[error("message not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Errors surfaced at the HTTP boundary.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid request body: {0}")]
    BadRequest(String),

    #[error("Failed to publish notification: {0}")]
    Publish(#[from] BrokerError),

    #[error("Failed to list dead letters: {0}")]
    Inspect(StoreError),

    #[error("Failed to requeue: {0}")]
    Requeue(StoreError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Publish(_) | ApiError::Inspect(_) | ApiError::Requeue(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = json!({ "error": self.to_string() });
        (status, Json(body)).into_response()
    }
}
