//! API error type and its HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use engine::ValidationResult;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    /// The definition (or the variables for a run) failed validation.
    #[error("validation failed")]
    Invalid(ValidationResult),

    #[error("store error: {0}")]
    Store(#[from] store::StoreError),

    #[error("message queue error: {0}")]
    Queue(#[from] queue::QueueError),
}

impl ApiError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::NotFound { .. } => {
                (StatusCode::NOT_FOUND, Json(json!({ "error": self.to_string() }))).into_response()
            }
            Self::Invalid(result) => (StatusCode::BAD_REQUEST, Json(result)).into_response(),
            Self::Store(_) | Self::Queue(_) => {
                error!("request failed: {}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": self.to_string() })),
                )
                    .into_response()
            }
        }
    }
}
