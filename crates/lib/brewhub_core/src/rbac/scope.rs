//! Authorization scope: the tenant boundary a request runs inside.
//!
//! A [`Scope`] is rebuilt on every request from the verified [`Identity`] and
//! the optional branch the caller selected. Only shop admins can select a
//! branch, and only one of their own shop's.

use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::auth::AuthError;
use crate::models::auth::{Identity, Role};
use crate::models::document::{Branch, TenantRef};
use crate::rbac::filter::{Filter, scoped_filter};
use crate::store::BranchLookup;
use crate::uuid::parse_id;

/// Tenant scope of a request. Each variant carries only the ids its role
/// is bounded by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(
    tag = "role",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum Scope {
    /// Sees everything.
    Admin,
    /// One shop; narrowed to one of its branches when the caller selected it.
    ShopAdmin {
        shop_id: Uuid,
        branch_id: Option<Uuid>,
    },
    /// One fixed branch of one shop.
    BranchAdmin { shop_id: Uuid, branch_id: Uuid },
    /// Own records only.
    Client { user_id: Uuid },
}

impl Scope {
    pub fn role(&self) -> Role {
        match self {
            Scope::Admin => Role::Admin,
            Scope::ShopAdmin { .. } => Role::ShopAdmin,
            Scope::BranchAdmin { .. } => Role::BranchAdmin,
            Scope::Client { .. } => Role::Client,
        }
    }

    pub fn shop_id(&self) -> Option<Uuid> {
        match self {
            Scope::ShopAdmin { shop_id, .. } | Scope::BranchAdmin { shop_id, .. } => Some(*shop_id),
            Scope::Admin | Scope::Client { .. } => None,
        }
    }

    pub fn branch_id(&self) -> Option<Uuid> {
        match self {
            Scope::ShopAdmin { branch_id, .. } => *branch_id,
            Scope::BranchAdmin { branch_id, .. } => Some(*branch_id),
            Scope::Admin | Scope::Client { .. } => None,
        }
    }

    pub fn can_access_shop(&self, shop_id: Uuid) -> bool {
        match self {
            Scope::Admin => true,
            Scope::ShopAdmin { .. } | Scope::BranchAdmin { .. } => self.shop_id() == Some(shop_id),
            Scope::Client { .. } => false,
        }
    }

    pub fn can_access_branch(&self, branch: &Branch) -> bool {
        match self {
            Scope::Admin => true,
            Scope::ShopAdmin { shop_id, branch_id } => {
                branch.shop_id == *shop_id && branch_id.is_none_or(|id| id == branch.id)
            }
            Scope::BranchAdmin { shop_id, branch_id } => {
                branch.shop_id == *shop_id && branch.id == *branch_id
            }
            Scope::Client { .. } => false,
        }
    }

    /// Whether a record stamped with `tenant` falls inside this scope.
    ///
    /// Evaluates the same narrowing [`scoped_filter`] applies to queries.
    pub fn permits(&self, tenant: &TenantRef) -> bool {
        scoped_filter(self, Filter::new()).matches(|field| tenant.field_text(field))
    }

    /// Tenant stamp for a record created under this scope.
    ///
    /// `requested_shop` is the shop named by the caller, consulted only by
    /// roles that are not bound to a shop.
    pub fn write_tenant(&self, requested_shop: Option<Uuid>) -> Result<TenantRef, AuthError> {
        match self {
            Scope::Admin => Ok(TenantRef {
                shop_id: Some(requested_shop.ok_or_else(|| {
                    AuthError::Validation("a shop id header is required for ADMIN".into())
                })?),
                ..Default::default()
            }),
            Scope::ShopAdmin { shop_id, branch_id } => Ok(TenantRef {
                shop_id: Some(*shop_id),
                branch_id: *branch_id,
                owner_user_id: None,
            }),
            Scope::BranchAdmin { shop_id, branch_id } => Ok(TenantRef {
                shop_id: Some(*shop_id),
                branch_id: Some(*branch_id),
                owner_user_id: None,
            }),
            Scope::Client { user_id } => Ok(TenantRef {
                shop_id: Some(requested_shop.ok_or_else(|| {
                    AuthError::Validation("a shop id header is required for CLIENT".into())
                })?),
                branch_id: None,
                owner_user_id: Some(*user_id),
            }),
        }
    }
}

/// Derive the request scope for `identity`.
///
/// `requested_branch_id` is honoured for shop admins only, after checking the
/// branch belongs to their shop. Branch admins are pinned to the branch in
/// their credential whatever they request.
pub async fn build_scope(
    identity: &Identity,
    requested_branch_id: Option<&str>,
    branches: &dyn BranchLookup,
) -> Result<Scope, AuthError> {
    match identity.role {
        Role::Admin => Ok(Scope::Admin),
        Role::ShopAdmin => {
            let shop_id = identity.shop_id.ok_or_else(|| {
                AuthError::InvalidIdentity("SHOP_ADMIN identity is missing shopId".into())
            })?;

            let requested = requested_branch_id.map(str::trim).filter(|raw| !raw.is_empty());
            let Some(raw) = requested else {
                return Ok(Scope::ShopAdmin {
                    shop_id,
                    branch_id: None,
                });
            };

            let branch_id = parse_id(raw).ok_or_else(|| {
                warn!(user_id = %identity.user_id, requested = raw, "malformed branch selection");
                AuthError::ForbiddenScope("Invalid branch for SHOP_ADMIN scope".into())
            })?;

            match branches.find_by_id_and_shop(branch_id, shop_id).await? {
                Some(branch) if branch.shop_id == shop_id => {
                    debug!(user_id = %identity.user_id, %shop_id, %branch_id, "branch selected");
                    Ok(Scope::ShopAdmin {
                        shop_id,
                        branch_id: Some(branch.id),
                    })
                }
                _ => {
                    warn!(
                        user_id = %identity.user_id,
                        %shop_id,
                        %branch_id,
                        "branch selection outside own shop"
                    );
                    Err(AuthError::ForbiddenScope(
                        "Invalid branch for SHOP_ADMIN scope".into(),
                    ))
                }
            }
        }
        Role::BranchAdmin => match (identity.shop_id, identity.branch_id) {
            (Some(shop_id), Some(branch_id)) => Ok(Scope::BranchAdmin { shop_id, branch_id }),
            _ => Err(AuthError::InvalidIdentity(
                "BRANCH_ADMIN identity is missing shopId/branchId".into(),
            )),
        },
        Role::Client => Ok(Scope::Client {
            user_id: identity.user_id,
        }),
    }
}
