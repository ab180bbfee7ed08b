//! Authentication: credentials, sessions and the error taxonomy shared by
//! the whole authorization pipeline.

pub mod jwt;
pub mod password;
pub mod sessions;
pub mod verifier;

use thiserror::Error;

use crate::models::auth::Role;
use crate::rbac::permissions::Permission;
use crate::store::StoreError;

/// Authentication and authorization errors.
///
/// Every variant is terminal for the request; the HTTP layer maps each one
/// to a status without reinterpreting it.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Missing, invalid or expired credential or session.
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    /// Claims inconsistent with the role they carry.
    #[error("Invalid identity: {0}")]
    InvalidIdentity(String),

    /// Branch selection failed cross-tenant validation.
    #[error("Forbidden scope: {0}")]
    ForbiddenScope(String),

    #[error("Forbidden: requires any of {required:?}")]
    Forbidden { required: Vec<Permission> },

    #[error("Forbidden: role must be one of {allowed:?}")]
    RoleNotAllowed { allowed: Vec<Role> },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid credentials")]
    CredentialError,

    #[error("Token error: {0}")]
    TokenError(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}
