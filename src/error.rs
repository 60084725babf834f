//! Shared error taxonomy
//!
//! Every fallible operation surfaced to the HTTP layer lands in one of these
//! kinds. Internal subsystems (db, llm, rag) have their own `thiserror` enums
//! and convert into this one at the boundary.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("overloaded: {0}")]
    Overloaded(String),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("provider error: {0}")]
    ProviderError(String),

    #[error("retrieval error: {0}")]
    RetrievalError(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Overloaded(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::ProviderError(_) | AppError::RetrievalError(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::warn!(error = %self, "request rejected");
        }
        (status, axum::Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<crate::db::DbError> for AppError {
    fn from(e: crate::db::DbError) -> Self {
        match e {
            crate::db::DbError::SessionNotFound(id) => AppError::NotFound(format!("session {id}")),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<crate::rag::RagError> for AppError {
    fn from(e: crate::rag::RagError) -> Self {
        AppError::RetrievalError(e.to_string())
    }
}
