use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::{repository::RepositoryError, storage::StorageError};

/// AppError
///
/// The failure taxonomy of the HTTP boundary. Every variant renders as a
/// structured `{"error": "..."}` body with the matching status code.
#[derive(Debug, Error)]
pub enum AppError {
    /// A required parameter is missing or malformed. Raised before any I/O.
    #[error("{0}")]
    BadRequest(String),

    /// No identity was presented and the group is not public.
    #[error("access to this group is forbidden")]
    Forbidden,

    #[error("{0} not found")]
    NotFound(&'static str),

    /// Unexpected I/O or query failure. The detail is logged, never returned.
    #[error("internal server error")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// ErrorResponse
///
/// JSON body returned for every `AppError`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if let AppError::Internal(detail) = &self {
            tracing::error!(error = %detail, "request failed");
        }

        let body = ErrorResponse {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
