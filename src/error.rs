use axum::Json;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::cache::StoreError;
use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Unauthorized - No authorization header")]
    MissingAuthorization,
    #[error("Unauthorized - Invalid token")]
    InvalidToken,
    #[error("{0}")]
    BadRequest(String),
    #[error("Not found")]
    NotFound,
    #[error("rate limiter unavailable: {0}")]
    RateLimiterUnavailable(#[from] StoreError),
    #[error("storage request failed: {0}")]
    Storage(#[from] StorageError),
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::MissingAuthorization | AppError::InvalidToken => StatusCode::UNAUTHORIZED,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::RateLimiterUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Storage(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    // 5xx 只向客户端返回概括信息，细节留在日志里
    fn public_message(&self) -> String {
        match self {
            AppError::RateLimiterUnavailable(_) => "Rate limiter unavailable".into(),
            AppError::Storage(_) => "Storage service error".into(),
            AppError::Internal(_) => "Internal server error".into(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = Json(ErrorResponse {
            error: self.public_message(),
        });
        (status, body).into_response()
    }
}
