//! API error type
//!
//! Every failure leaves the service as
//! `{status: "error", message, error_code, timestamp}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::api::now_iso;
use crate::services::{PipelineError, ProcessError};

#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed JSON, unrecognized shape, bad query parameter (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Payload failed schema validation (422)
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Storage or optimization service failure (500)
    #[error("Upstream service error: {0}")]
    Upstream(String),

    #[error("Common error: {0}")]
    Common(#[from] traffic_common::Error),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Upstream(_) | ApiError::Common(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Validation(_) => "VALIDATION_ERROR",
            ApiError::Upstream(_) => "UPSTREAM_ERROR",
            ApiError::Common(err) if err.is_persistence() => "DATABASE_ERROR",
            ApiError::Common(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        let stage = err.stage;
        match err.source {
            ProcessError::UnrecognizedShape(msg) => ApiError::BadRequest(msg),
            ProcessError::Validation(e) => ApiError::Validation(format!("{} ({})", e, stage)),
            ProcessError::Upstream(e) => ApiError::Upstream(format!("{} ({})", e, stage)),
            ProcessError::Persistence(e) => ApiError::Common(e),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();
        let message = match &self {
            ApiError::BadRequest(msg)
            | ApiError::Validation(msg)
            | ApiError::Upstream(msg) => msg.clone(),
            ApiError::Common(err) => err.to_string(),
        };

        if status.is_server_error() {
            tracing::error!(error_code, %message, "Request failed");
        } else {
            tracing::debug!(error_code, %message, "Request rejected");
        }

        let body = Json(json!({
            "status": "error",
            "message": message,
            "error_code": error_code,
            "timestamp": now_iso(),
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
