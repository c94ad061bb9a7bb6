//! API error types with structured JSON responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::build::BuildError;
use crate::diagram::DiagramError;
use crate::narrative::NarrativeError;
use crate::storage::StorageError;

/// Structured error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}

/// API-level errors with HTTP status mapping.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Upstream service failed: {0}")]
    Upstream(String),
    #[error("Narrative generation failed: {0}")]
    NarrativeFailed(String),
    #[error("Document assembly failed: {0}")]
    AssemblyFailed(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::BadRequest(detail) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", detail.clone()),
            ApiError::NotFound(detail) => (StatusCode::NOT_FOUND, "NOT_FOUND", detail.clone()),
            ApiError::Upstream(detail) => {
                tracing::warn!(detail, "Upstream failure");
                (StatusCode::BAD_GATEWAY, "UPSTREAM_FAILED", detail.clone())
            }
            ApiError::NarrativeFailed(detail) => {
                tracing::error!(detail, "Build failed in narrative phase");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "NARRATIVE_FAILED",
                    "Failed to generate document content".to_string(),
                )
            }
            ApiError::AssemblyFailed(detail) => {
                tracing::error!(detail, "Build failed in assembly phase");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "ASSEMBLY_FAILED",
                    "Failed to save the assembled document".to_string(),
                )
            }
            ApiError::Internal(detail) => {
                tracing::error!(detail, "API internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = ErrorBody {
            error: ErrorDetail { code, message },
        };
        (status, Json(body)).into_response()
    }
}

impl From<NarrativeError> for ApiError {
    fn from(err: NarrativeError) -> Self {
        match err {
            NarrativeError::MissingInput | NarrativeError::UnsupportedFormat(_) => {
                ApiError::BadRequest(err.to_string())
            }
            NarrativeError::Generation(_) | NarrativeError::Empty => ApiError::Upstream(err.to_string()),
            NarrativeError::Export(_) | NarrativeError::Io(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<DiagramError> for ApiError {
    fn from(err: DiagramError) -> Self {
        match err {
            DiagramError::Planning(_) => ApiError::Upstream(err.to_string()),
            DiagramError::BuildId(_) => ApiError::BadRequest(err.to_string()),
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::MissingBuildId | StorageError::InvalidBuildId(_) => {
                ApiError::BadRequest(err.to_string())
            }
            StorageError::InvalidFileName(_) | StorageError::NotFound(_) => {
                ApiError::NotFound(err.to_string())
            }
            StorageError::Io(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<BuildError> for ApiError {
    fn from(err: BuildError) -> Self {
        match err {
            BuildError::InvalidRequest(detail) => ApiError::BadRequest(detail),
            BuildError::UpstreamGeneration(_) => ApiError::NarrativeFailed(err.to_string()),
            BuildError::Assembly(_) => ApiError::AssemblyFailed(err.to_string()),
            BuildError::InvalidTransition { .. } => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        ApiError::Internal(format!("Worker task failed: {err}"))
    }
}
