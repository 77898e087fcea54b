//! API error handling
//!
//! Author: hephaex@gmail.com

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use causegraph_core::CausalError;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// API error response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// Error code
    pub code: String,
    /// Human-readable message
    pub message: String,
    /// Additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new("BAD_REQUEST", message)
    }

    pub fn internal_error() -> Self {
        Self::new("INTERNAL_ERROR", "Internal server error")
    }
}

/// Application error type
#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    /// Well-formed input the pipeline cannot work with
    Unprocessable { code: &'static str, message: String },
    /// A model endpoint failed
    Upstream(String),
    Timeout(String),
    /// A logic defect, never caused by client input
    InternalConsistency(String),
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, ApiError::not_found(msg)),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, ApiError::bad_request(msg)),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, ApiError::new("CONFLICT", msg)),
            AppError::Unprocessable { code, message } => {
                (StatusCode::UNPROCESSABLE_ENTITY, ApiError::new(code, message))
            }
            AppError::Upstream(msg) => (
                StatusCode::BAD_GATEWAY,
                ApiError::new("MODEL_ERROR", "Model endpoint failed").with_details(msg),
            ),
            AppError::Timeout(msg) => (
                StatusCode::GATEWAY_TIMEOUT,
                ApiError::new("TIMEOUT", msg),
            ),
            AppError::InternalConsistency(msg) => {
                tracing::error!(error = %msg, "Internal consistency fault");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiError::new("INTERNAL_CONSISTENCY", "Internal consistency fault")
                        .with_details(msg),
                )
            }
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiError::internal_error().with_details(msg),
                )
            }
        };

        (status, Json(error)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<CausalError> for AppError {
    fn from(err: CausalError) -> Self {
        match err {
            CausalError::Validation(msg) => AppError::BadRequest(msg),
            CausalError::NotFound(msg) => AppError::NotFound(msg),
            CausalError::Conflict(msg) => AppError::Conflict(msg),
            CausalError::EmptyEntitySet => AppError::Unprocessable {
                code: "EMPTY_ENTITY_SET",
                message: err.to_string(),
            },
            CausalError::Source(msg) => AppError::Unprocessable {
                code: "SOURCE_ERROR",
                message: msg,
            },
            CausalError::Predictor(msg) | CausalError::Clusterer(msg) => AppError::Upstream(msg),
            CausalError::Timeout { .. } => AppError::Timeout(err.to_string()),
            CausalError::InternalConsistency(msg) => AppError::InternalConsistency(msg),
            CausalError::Persistence(msg) => AppError::Internal(format!("Persistence error: {msg}")),
            CausalError::Config(msg) => AppError::Internal(format!("Configuration error: {msg}")),
            CausalError::Other(err) => AppError::Internal(err.to_string()),
        }
    }
}
