/// Unified error handling module
use crate::domain::Satellite;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Errors raised by the prediction pipeline and the notification sweep.
///
/// Every variant is recoverable at the sweep level: the affected path/row or
/// user/target is skipped and the sweep carries on.
#[derive(Debug, Error)]
pub enum SweepError {
    #[error("not enough scene history for {satellite}: got {count} samples, need at least 2")]
    InsufficientData { satellite: Satellite, count: usize },

    #[error("scene \"{entity_id}\" is missing \"{field}\" metadata")]
    MissingMetadata {
        entity_id: String,
        field: &'static str,
    },

    #[error("scene search upstream failure: {0}")]
    Upstream(String),

    #[error("persistence failure: {0}")]
    Persistence(#[from] sqlx::Error),
}

impl From<reqwest::Error> for SweepError {
    fn from(err: reqwest::Error) -> Self {
        SweepError::Upstream(err.to_string())
    }
}

/// Type alias for sweep/pipeline results
pub type SweepResult<T> = Result<T, SweepError>;

/// Unified error response format
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub ok: bool,
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

#[derive(Debug)]
pub enum ApiError {
    Database(sqlx::Error),
    Pipeline(SweepError),
    NotFound(String),
    Internal(String),
    InvalidInput(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Database(e) => write!(f, "Database error: {}", e),
            ApiError::Pipeline(e) => write!(f, "Prediction pipeline error: {}", e),
            ApiError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ApiError::Internal(msg) => write!(f, "Internal error: {}", msg),
            ApiError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::Database(err)
    }
}

impl From<SweepError> for ApiError {
    fn from(err: SweepError) -> Self {
        match err {
            SweepError::Persistence(e) => ApiError::Database(e),
            other => ApiError::Pipeline(other),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (code, message) = match &self {
            ApiError::Database(e) => ("DATABASE_ERROR", e.to_string()),
            ApiError::Pipeline(e) => (
                match e {
                    SweepError::InsufficientData { .. } => "INSUFFICIENT_DATA",
                    SweepError::MissingMetadata { .. } => "MISSING_METADATA",
                    SweepError::Upstream(_) => "UPSTREAM_ERROR",
                    SweepError::Persistence(_) => "DATABASE_ERROR",
                },
                e.to_string(),
            ),
            ApiError::NotFound(msg) => ("NOT_FOUND", msg.clone()),
            ApiError::Internal(msg) => ("INTERNAL_ERROR", msg.clone()),
            ApiError::InvalidInput(msg) => ("INVALID_INPUT", msg.clone()),
        };

        let error_response = ErrorResponse {
            ok: false,
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        };

        // Always return HTTP 200 with ok=false as per requirements
        (StatusCode::OK, Json(error_response)).into_response()
    }
}

/// Type alias for API results
pub type ApiResult<T> = Result<T, ApiError>;
