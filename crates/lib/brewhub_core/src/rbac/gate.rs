//! Permission gate.

use tracing::{debug, warn};

use crate::auth::AuthError;
use crate::models::auth::Role;
use crate::rbac::permissions::{Permission, has_any_permission};
use crate::rbac::scope::Scope;

/// Allow if the scope's role holds ANY of `required`.
///
/// An empty `required` list denies. The error carries `required` so callers
/// can report which permissions would have sufficed.
pub fn check_permission(scope: &Scope, required: &[Permission]) -> Result<(), AuthError> {
    let role = scope.role();
    if has_any_permission(role, required) {
        debug!(%role, ?required, "permission granted");
        return Ok(());
    }

    warn!(%role, ?required, "permission denied");
    Err(AuthError::Forbidden {
        required: required.to_vec(),
    })
}

/// Allow only the listed roles.
pub fn require_role(scope: &Scope, roles: &[Role]) -> Result<(), AuthError> {
    let role = scope.role();
    if roles.contains(&role) {
        return Ok(());
    }

    warn!(%role, ?roles, "role not allowed");
    Err(AuthError::RoleNotAllowed {
        allowed: roles.to_vec(),
    })
}
