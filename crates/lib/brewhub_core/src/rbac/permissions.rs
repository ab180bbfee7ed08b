//! Permission identifiers and the compiled-in role → permission table.
//!
//! Permissions are `resource:action` strings. The table is constant for the
//! life of the process; adding a role fails to compile until its row exists.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::auth::AuthError;
use crate::models::auth::Role;

macro_rules! permissions {
    ($($variant:ident => $name:literal,)+) => {
        /// Atomic grant of the form `resource:action`.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum Permission {
            $($variant,)+
        }

        impl Permission {
            /// Every defined permission, in declaration order.
            pub const ALL: &'static [Permission] = &[$(Permission::$variant,)+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Permission::$variant => $name,)+
                }
            }
        }

        impl FromStr for Permission {
            type Err = AuthError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok(Permission::$variant),)+
                    other => Err(AuthError::Validation(format!("unknown permission '{other}'"))),
                }
            }
        }
    };
}

permissions! {
    DashboardView => "dashboard:view",
    DashboardViewAllShops => "dashboard:view_all_shops",
    DashboardViewShop => "dashboard:view_shop",
    DashboardViewBranch => "dashboard:view_branch",

    PosUse => "pos:use",
    PosRefund => "pos:refund",
    PosCancelOrder => "pos:cancel_order",
    PosApplyDiscount => "pos:apply_discount",

    ItemsView => "items:view",
    ItemsCreate => "items:create",
    ItemsEdit => "items:edit",
    ItemsDelete => "items:delete",
    ItemsManageInventory => "items:manage_inventory",

    UsersView => "users:view",
    UsersCreate => "users:create",
    UsersEdit => "users:edit",
    UsersDelete => "users:delete",
    UsersAssignRoles => "users:assign_roles",

    BranchesView => "branches:view",
    BranchesCreate => "branches:create",
    BranchesEdit => "branches:edit",
    BranchesDelete => "branches:delete",

    ShopsView => "shops:view",
    ShopsCreate => "shops:create",
    ShopsEdit => "shops:edit",
    ShopsDelete => "shops:delete",

    AnalyticsView => "analytics:view",
    AnalyticsExport => "analytics:export",
    AnalyticsViewAllShops => "analytics:view_all_shops",
    AnalyticsViewShop => "analytics:view_shop",

    OrdersView => "orders:view",
    OrdersViewAll => "orders:view_all",
    OrdersCreate => "orders:create",
    OrdersCancel => "orders:cancel",

    ProfileView => "profile:view",
    ProfileEdit => "profile:edit",

    CategoriesView => "categories:view",
    CategoriesCreate => "categories:create",
    CategoriesEdit => "categories:edit",
    CategoriesDelete => "categories:delete",
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Permission {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Permission {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

use Permission::*;

const ADMIN_PERMISSIONS: &[Permission] = Permission::ALL;

const SHOP_ADMIN_PERMISSIONS: &[Permission] = &[
    DashboardView,
    DashboardViewShop,
    DashboardViewBranch,
    PosUse,
    PosRefund,
    PosCancelOrder,
    PosApplyDiscount,
    ItemsView,
    ItemsCreate,
    ItemsEdit,
    ItemsDelete,
    ItemsManageInventory,
    UsersView,
    UsersCreate,
    UsersEdit,
    BranchesView,
    BranchesCreate,
    BranchesEdit,
    BranchesDelete,
    ShopsView,
    ShopsEdit,
    AnalyticsView,
    AnalyticsExport,
    AnalyticsViewShop,
    OrdersView,
    OrdersCreate,
    OrdersCancel,
    ProfileView,
    ProfileEdit,
    CategoriesView,
    CategoriesCreate,
    CategoriesEdit,
    CategoriesDelete,
];

const BRANCH_ADMIN_PERMISSIONS: &[Permission] = &[
    DashboardView,
    DashboardViewBranch,
    PosUse,
    PosRefund,
    PosApplyDiscount,
    ItemsView,
    ItemsEdit,
    ItemsManageInventory,
    UsersView,
    AnalyticsView,
    OrdersView,
    OrdersCreate,
    ProfileView,
    ProfileEdit,
    CategoriesView,
];

const CLIENT_PERMISSIONS: &[Permission] = &[
    DashboardView,
    OrdersView,
    OrdersCreate,
    ProfileView,
    ProfileEdit,
];

/// Permissions granted to `role`.
pub fn permissions_for(role: Role) -> &'static [Permission] {
    match role {
        Role::Admin => ADMIN_PERMISSIONS,
        Role::ShopAdmin => SHOP_ADMIN_PERMISSIONS,
        Role::BranchAdmin => BRANCH_ADMIN_PERMISSIONS,
        Role::Client => CLIENT_PERMISSIONS,
    }
}

pub fn has_permission(role: Role, permission: Permission) -> bool {
    permissions_for(role).contains(&permission)
}

/// True if `role` holds at least one of `permissions`. False for an empty list.
pub fn has_any_permission(role: Role, permissions: &[Permission]) -> bool {
    permissions.iter().any(|p| has_permission(role, *p))
}

/// True if `role` holds every one of `permissions`.
pub fn has_all_permissions(role: Role, permissions: &[Permission]) -> bool {
    permissions.iter().all(|p| has_permission(role, *p))
}
