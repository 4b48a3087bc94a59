use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::services::generator::GenerationError;
use crate::services::memory::MemoryError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(String),

    #[error("Generation failed: {0}")]
    GenerationFailure(#[from] GenerationError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn session_not_found() -> Self {
        ApiError::NotFound("Session not found".to_string())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "NotFound",
            ApiError::CapacityExceeded(_) => "CapacityExceeded",
            ApiError::GenerationFailure(_) => "GenerationFailure",
            ApiError::InvalidInput(_) => "InvalidInput",
            ApiError::Internal(_) => "InternalError",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::CapacityExceeded(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::GenerationFailure(GenerationError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::GenerationFailure(_) => StatusCode::BAD_GATEWAY,
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<MemoryError> for ApiError {
    fn from(err: MemoryError) -> Self {
        match err {
            MemoryError::CapacityExceeded { .. } => ApiError::CapacityExceeded(err.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::GenerationFailure(inner) => format!("Error generating response: {}", inner),
            ApiError::NotFound(msg)
            | ApiError::CapacityExceeded(msg)
            | ApiError::InvalidInput(msg)
            | ApiError::Internal(msg) => msg.clone(),
        };

        if status.is_server_error() {
            tracing::error!("{}: {}", self.kind(), message);
        } else {
            tracing::warn!("{}: {}", self.kind(), message);
        }

        let body = Json(ErrorResponse {
            error: self.kind().to_string(),
            message,
        });

        (status, body).into_response()
    }
}
