//! Tenant-owned documents (shops, branches, categories, items, orders).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::rbac::permissions::Permission;

/// Filter field holding the owning shop.
pub const SHOP_FIELD: &str = "shop_id";
/// Filter field holding the owning branch.
pub const BRANCH_FIELD: &str = "branch_id";
/// Filter field holding the owning client.
pub const OWNER_FIELD: &str = "owner_user_id";
/// Filter field holding the document id.
pub const ID_FIELD: &str = "id";

/// Body keys owned by the store; stripped from incoming bodies.
const RESERVED_KEYS: &[&str] = &[
    ID_FIELD,
    SHOP_FIELD,
    BRANCH_FIELD,
    OWNER_FIELD,
    "collection",
    "createdAt",
    "shopId",
    "branchId",
    "ownerUserId",
];

/// Document collections exposed through the scoped routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Shops,
    Branches,
    Categories,
    Items,
    Orders,
}

/// What a caller wants to do with a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    View,
    Create,
    Edit,
    Delete,
}

impl Collection {
    pub const ALL: [Collection; 5] = [
        Collection::Shops,
        Collection::Branches,
        Collection::Categories,
        Collection::Items,
        Collection::Orders,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Shops => "shops",
            Collection::Branches => "branches",
            Collection::Categories => "categories",
            Collection::Items => "items",
            Collection::Orders => "orders",
        }
    }

    /// Permission guarding `action` on this collection. `None` when the
    /// collection does not support the action (orders are never edited).
    pub fn permission(&self, action: Action) -> Option<Permission> {
        use Permission::*;
        let permission = match (self, action) {
            (Collection::Shops, Action::View) => ShopsView,
            (Collection::Shops, Action::Create) => ShopsCreate,
            (Collection::Shops, Action::Edit) => ShopsEdit,
            (Collection::Shops, Action::Delete) => ShopsDelete,
            (Collection::Branches, Action::View) => BranchesView,
            (Collection::Branches, Action::Create) => BranchesCreate,
            (Collection::Branches, Action::Edit) => BranchesEdit,
            (Collection::Branches, Action::Delete) => BranchesDelete,
            (Collection::Categories, Action::View) => CategoriesView,
            (Collection::Categories, Action::Create) => CategoriesCreate,
            (Collection::Categories, Action::Edit) => CategoriesEdit,
            (Collection::Categories, Action::Delete) => CategoriesDelete,
            (Collection::Items, Action::View) => ItemsView,
            (Collection::Items, Action::Create) => ItemsCreate,
            (Collection::Items, Action::Edit) => ItemsEdit,
            (Collection::Items, Action::Delete) => ItemsDelete,
            (Collection::Orders, Action::View) => OrdersView,
            (Collection::Orders, Action::Create) => OrdersCreate,
            (Collection::Orders, Action::Edit) => return None,
            (Collection::Orders, Action::Delete) => OrdersCancel,
        };
        Some(permission)
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Collection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Collection::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown collection '{s}'"))
    }
}

/// Tenant stamp of a record: who owns it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantRef {
    pub shop_id: Option<Uuid>,
    pub branch_id: Option<Uuid>,
    pub owner_user_id: Option<Uuid>,
}

impl TenantRef {
    /// Text value of a tenant filter field; `None` for any other field.
    pub fn field_text(&self, field: &str) -> Option<String> {
        let id = match field {
            SHOP_FIELD => self.shop_id,
            BRANCH_FIELD => self.branch_id,
            OWNER_FIELD => self.owner_user_id,
            _ => None,
        };
        id.map(|id| id.to_string())
    }
}

/// A stored document.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: Uuid,
    pub collection: Collection,
    #[serde(flatten)]
    pub tenant: TenantRef,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub body: Map<String, Value>,
}

impl Document {
    /// Build a new document. A branch is its own branch, so branch-scoped
    /// callers can see it.
    ///
    /// A shop is likewise its own shop and belongs to no branch.
    pub fn new(collection: Collection, tenant: TenantRef, mut body: Map<String, Value>) -> Self {
        strip_reserved(&mut body);
        let id = crate::uuid::uuidv7();
        let tenant = match collection {
            Collection::Shops => TenantRef {
                shop_id: Some(id),
                branch_id: None,
                owner_user_id: None,
            },
            Collection::Branches => TenantRef {
                branch_id: Some(id),
                ..tenant
            },
            _ => tenant,
        };
        Self {
            id,
            collection,
            tenant,
            created_at: Utc::now(),
            body,
        }
    }

    /// Shallow-merge `patch` into the body. Reserved keys are ignored, so an
    /// update never moves a document to another tenant.
    pub fn apply_patch(&mut self, patch: &Map<String, Value>) {
        for (key, value) in patch {
            if !is_reserved(key) {
                self.body.insert(key.clone(), value.clone());
            }
        }
    }

    /// Text value of a filterable field, as the Postgres store compares it.
    pub fn field_text(&self, field: &str) -> Option<String> {
        match field {
            ID_FIELD => Some(self.id.to_string()),
            SHOP_FIELD | BRANCH_FIELD | OWNER_FIELD => self.tenant.field_text(field),
            _ => match self.body.get(field)? {
                Value::String(s) => Some(s.clone()),
                Value::Bool(b) => Some(b.to_string()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            },
        }
    }
}

fn is_reserved(key: &str) -> bool {
    RESERVED_KEYS.contains(&key)
}

/// Remove store-owned keys from a client-supplied body.
pub fn strip_reserved(body: &mut Map<String, Value>) {
    body.retain(|key, _| !is_reserved(key));
}

/// Branch record used by the scope builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Branch {
    pub id: Uuid,
    pub shop_id: Uuid,
    pub name: Option<String>,
}
