//! Error types and Axum response conversions.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::auth::SessionError;
use crate::storage::StoreError;

/// Application error types.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Internal(msg) => {
                // Log detailed error server-side, return generic message to client
                tracing::error!(error = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Internal(format!("Store error: {}", err))
    }
}

/// Map engine outcomes onto HTTP errors.
///
/// Every token and credential failure collapses into the same 401 body so a
/// client cannot tell which check rejected it.
impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::InvalidCredentials => {
                AppError::Unauthorized("Invalid credentials".to_string())
            }
            SessionError::MissingToken
            | SessionError::InvalidToken
            | SessionError::CredentialRevokedOrAbsent => {
                AppError::Unauthorized("Unauthorized".to_string())
            }
            SessionError::Persistence(e) => AppError::from(e),
            SessionError::Internal(msg) => AppError::Internal(msg),
        }
    }
}
