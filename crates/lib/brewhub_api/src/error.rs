//! Application error types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use brewhub_core::auth::AuthError;
use brewhub_core::rbac::Permission;
use brewhub_core::store::StoreError;
use thiserror::Error;
use tracing::error;

use crate::models::ErrorResponse;

/// Convenience alias for handler return types.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level errors with HTTP status mapping.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Invalid identity: {0}")]
    InvalidIdentity(String),

    #[error("Forbidden scope: {0}")]
    ForbiddenScope(String),

    #[error("Forbidden: {message}")]
    Forbidden {
        message: String,
        required: Vec<Permission>,
    },

    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal server error")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut required_permissions = Vec::new();
        let (status, error, message) = match self {
            AppError::Validation(m) => (StatusCode::BAD_REQUEST, "validation_error", m),
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, "not_found", m),
            AppError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, "unauthorized", m),
            AppError::InvalidIdentity(m) => (StatusCode::FORBIDDEN, "invalid_identity", m),
            AppError::ForbiddenScope(m) => (StatusCode::FORBIDDEN, "forbidden_scope", m),
            AppError::Forbidden { message, required } => {
                required_permissions = required;
                (StatusCode::FORBIDDEN, "forbidden", message)
            }
            AppError::MethodNotAllowed(m) => {
                (StatusCode::METHOD_NOT_ALLOWED, "method_not_allowed", m)
            }
            AppError::Conflict(m) => (StatusCode::CONFLICT, "conflict", m),
            AppError::Internal(detail) => {
                error!(%detail, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal server error".to_string(),
                )
            }
        };
        let body = Json(ErrorResponse {
            error: error.to_string(),
            message,
            required_permissions,
        });
        (status, body).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(msg) => AppError::Conflict(msg),
            StoreError::InvalidFilter(field) => {
                AppError::Validation(format!("cannot filter on '{field}'"))
            }
            StoreError::Db(sqlx::Error::RowNotFound) => AppError::NotFound("row not found".into()),
            StoreError::Db(e) => AppError::Internal(e.to_string()),
            StoreError::Internal(msg) => AppError::Internal(msg),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Unauthenticated(msg) => AppError::Unauthorized(msg),
            AuthError::CredentialError => AppError::Unauthorized("Invalid credentials".into()),
            AuthError::InvalidIdentity(msg) => AppError::InvalidIdentity(msg),
            AuthError::ForbiddenScope(msg) => AppError::ForbiddenScope(msg),
            AuthError::Forbidden { required } => AppError::Forbidden {
                message: "Insufficient permissions".into(),
                required,
            },
            AuthError::RoleNotAllowed { allowed } => AppError::Forbidden {
                message: format!(
                    "Requires role {}",
                    allowed
                        .iter()
                        .map(|r| r.as_str())
                        .collect::<Vec<_>>()
                        .join(" or ")
                ),
                required: Vec::new(),
            },
            AuthError::Conflict(msg) => AppError::Conflict(msg),
            AuthError::Validation(msg) => AppError::Validation(msg),
            AuthError::Store(e) => AppError::from(e),
            AuthError::TokenError(msg) | AuthError::Internal(msg) => AppError::Internal(msg),
        }
    }
}
