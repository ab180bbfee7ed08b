//! Data-access filters and their tenant narrowing.
//!
//! A [`Filter`] is a conjunction of per-field conditions. [`scoped_filter`]
//! and [`scoped_filter_for`] are the only places tenant constraints are added
//! to a query; they narrow and never widen. A caller constraint that
//! contradicts the scope collapses to a condition nothing satisfies.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use serde::Serialize;

use crate::models::document::{BRANCH_FIELD, Collection, ID_FIELD, OWNER_FIELD, SHOP_FIELD};
use crate::rbac::scope::Scope;

/// Condition on one field's text value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    Eq(String),
    /// Any of the listed values. Empty matches nothing.
    In(Vec<String>),
}

impl Condition {
    /// Intersect with `field == value`.
    fn narrow(self, value: String) -> Condition {
        match self {
            Condition::Eq(current) if current == value => Condition::Eq(current),
            Condition::In(values) if values.contains(&value) => Condition::Eq(value),
            _ => Condition::In(Vec::new()),
        }
    }

    pub fn matches(&self, value: Option<&str>) -> bool {
        match (self, value) {
            (Condition::Eq(expected), Some(actual)) => expected == actual,
            (Condition::In(values), Some(actual)) => values.iter().any(|v| v == actual),
            (_, None) => false,
        }
    }

    pub fn is_unsatisfiable(&self) -> bool {
        matches!(self, Condition::In(values) if values.is_empty())
    }
}

impl Serialize for Condition {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        match self {
            Condition::Eq(value) => serializer.serialize_str(value),
            Condition::In(values) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("$in", values)?;
                map.end()
            }
        }
    }
}

/// Conjunction of field conditions, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Filter {
    clauses: BTreeMap<String, Condition>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `field == value`, replacing any previous condition on `field`.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.clauses.insert(field.into(), Condition::Eq(value.into()));
        self
    }

    /// Add `field IN values`, replacing any previous condition on `field`.
    pub fn with_any(mut self, field: impl Into<String>, values: Vec<String>) -> Self {
        self.clauses.insert(field.into(), Condition::In(values));
        self
    }

    /// Intersect the condition on `field` with `field == value`.
    pub fn narrow(mut self, field: &str, value: impl Into<String>) -> Self {
        let value = value.into();
        match self.clauses.entry(field.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(Condition::Eq(value));
            }
            Entry::Occupied(mut slot) => {
                let current = std::mem::replace(slot.get_mut(), Condition::In(Vec::new()));
                *slot.get_mut() = current.narrow(value);
            }
        }
        self
    }

    /// Replace the condition on `field` with one nothing satisfies.
    pub fn match_nothing(mut self, field: &str) -> Self {
        self.clauses.insert(field.to_string(), Condition::In(Vec::new()));
        self
    }

    pub fn get(&self, field: &str) -> Option<&Condition> {
        self.clauses.get(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Condition)> {
        self.clauses.iter().map(|(field, cond)| (field.as_str(), cond))
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// First field name that is not a plain identifier.
    pub fn invalid_field(&self) -> Option<&str> {
        self.clauses
            .keys()
            .map(String::as_str)
            .find(|field| !is_valid_field(field))
    }

    /// True when some clause can never hold.
    pub fn is_unsatisfiable(&self) -> bool {
        self.clauses.values().any(Condition::is_unsatisfiable)
    }

    /// Evaluate against a record, `lookup` giving each field's text value.
    pub fn matches<F>(&self, lookup: F) -> bool
    where
        F: Fn(&str) -> Option<String>,
    {
        self.clauses
            .iter()
            .all(|(field, cond)| cond.matches(lookup(field).as_deref()))
    }
}

impl<K, V> FromIterator<(K, V)> for Filter
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Filter::new(), |filter, (field, value)| filter.with(field, value))
    }
}

/// Filter field names: ASCII identifiers of at most 64 bytes.
pub fn is_valid_field(field: &str) -> bool {
    let mut chars = field.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && field.len() <= 64
}

/// Narrow `base` to the tenant boundary of `scope`.
pub fn scoped_filter(scope: &Scope, base: Filter) -> Filter {
    match scope {
        Scope::Admin => base,
        Scope::ShopAdmin { shop_id, branch_id } => {
            let filter = base.narrow(SHOP_FIELD, shop_id.to_string());
            match branch_id {
                Some(branch_id) => filter.narrow(BRANCH_FIELD, branch_id.to_string()),
                None => filter,
            }
        }
        Scope::BranchAdmin { shop_id, branch_id } => base
            .narrow(SHOP_FIELD, shop_id.to_string())
            .narrow(BRANCH_FIELD, branch_id.to_string()),
        Scope::Client { user_id } => base.narrow(OWNER_FIELD, user_id.to_string()),
    }
}

/// Narrow `base` for a query on `collection`.
///
/// Shops are matched by their own id: shop and branch admins see only the
/// shop they belong to and clients see none. Every other collection goes
/// through [`scoped_filter`].
pub fn scoped_filter_for(scope: &Scope, collection: Collection, base: Filter) -> Filter {
    if collection != Collection::Shops {
        return scoped_filter(scope, base);
    }
    match scope {
        Scope::Admin => base,
        Scope::ShopAdmin { shop_id, .. } | Scope::BranchAdmin { shop_id, .. } => {
            base.narrow(ID_FIELD, shop_id.to_string())
        }
        Scope::Client { .. } => base.match_nothing(ID_FIELD),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn admin_filter_is_untouched() {
        let base = Filter::new().with("status", "active");
        assert_eq!(scoped_filter(&Scope::Admin, base.clone()), base);
    }

    #[test]
    fn shop_admin_gets_shop_and_optional_branch() {
        let shop = Uuid::new_v4();
        let branch = Uuid::new_v4();

        let shop_only = scoped_filter(
            &Scope::ShopAdmin {
                shop_id: shop,
                branch_id: None,
            },
            Filter::new(),
        );
        assert_eq!(shop_only, Filter::new().with("shop_id", shop.to_string()));

        let with_branch = scoped_filter(
            &Scope::ShopAdmin {
                shop_id: shop,
                branch_id: Some(branch),
            },
            Filter::new().with("status", "active"),
        );
        assert_eq!(
            with_branch,
            Filter::new()
                .with("status", "active")
                .with("shop_id", shop.to_string())
                .with("branch_id", branch.to_string())
        );
    }

    #[test]
    fn branch_admin_gets_both_ids() {
        let shop = Uuid::new_v4();
        let branch = Uuid::new_v4();
        let filter = scoped_filter(
            &Scope::BranchAdmin {
                shop_id: shop,
                branch_id: branch,
            },
            Filter::new(),
        );
        assert_eq!(filter.get("shop_id"), Some(&Condition::Eq(shop.to_string())));
        assert_eq!(filter.get("branch_id"), Some(&Condition::Eq(branch.to_string())));
    }

    #[test]
    fn client_filter_adds_ownership() {
        let u1 = Uuid::new_v4();
        let filter = scoped_filter(
            &Scope::Client { user_id: u1 },
            Filter::new().with("status", "active"),
        );
        assert_eq!(
            serde_json::to_value(&filter).unwrap(),
            serde_json::json!({"status": "active", "owner_user_id": u1.to_string()})
        );
    }

    #[test]
    fn conflicting_caller_shop_matches_nothing() {
        let shop = Uuid::new_v4();
        let other = Uuid::new_v4();
        let filter = scoped_filter(
            &Scope::ShopAdmin {
                shop_id: shop,
                branch_id: None,
            },
            Filter::new().with("shop_id", other.to_string()),
        );
        assert!(filter.is_unsatisfiable());
        assert!(!filter.matches(|_| Some(shop.to_string())));
        assert!(!filter.matches(|_| Some(other.to_string())));
    }

    #[test]
    fn agreeing_caller_shop_is_kept() {
        let shop = Uuid::new_v4();
        let scope = Scope::ShopAdmin {
            shop_id: shop,
            branch_id: None,
        };
        let filter = scoped_filter(&scope, Filter::new().with("shop_id", shop.to_string()));
        assert_eq!(filter.get("shop_id"), Some(&Condition::Eq(shop.to_string())));
        assert!(!filter.is_unsatisfiable());
    }

    #[test]
    fn caller_in_list_narrows_to_scope_member() {
        let shop = Uuid::new_v4();
        let scope = Scope::BranchAdmin {
            shop_id: shop,
            branch_id: Uuid::new_v4(),
        };
        let filter = scoped_filter(
            &scope,
            Filter::new().with_any("shop_id", vec![Uuid::new_v4().to_string(), shop.to_string()]),
        );
        assert_eq!(filter.get("shop_id"), Some(&Condition::Eq(shop.to_string())));

        let filter = scoped_filter(
            &scope,
            Filter::new().with_any("shop_id", vec![Uuid::new_v4().to_string()]),
        );
        assert!(filter.is_unsatisfiable());
    }

    #[test]
    fn narrowing_never_drops_caller_clauses() {
        let base: Filter = [("status", "active"), ("category", "coffee")]
            .into_iter()
            .collect();
        let scope = Scope::Client {
            user_id: Uuid::new_v4(),
        };
        let scoped = scoped_filter(&scope, base.clone());
        for (field, cond) in base.iter() {
            assert_eq!(scoped.get(field), Some(cond));
        }
    }

    #[test]
    fn shops_are_scoped_by_their_own_id() {
        let shop = Uuid::new_v4();
        let branch_admin = Scope::BranchAdmin {
            shop_id: shop,
            branch_id: Uuid::new_v4(),
        };
        let filter = scoped_filter_for(&branch_admin, Collection::Shops, Filter::new());
        assert_eq!(filter, Filter::new().with("id", shop.to_string()));

        let selected = Scope::ShopAdmin {
            shop_id: shop,
            branch_id: Some(Uuid::new_v4()),
        };
        let filter = scoped_filter_for(
            &selected,
            Collection::Shops,
            Filter::new().with("id", Uuid::new_v4().to_string()),
        );
        assert!(filter.is_unsatisfiable());

        let client = Scope::Client {
            user_id: Uuid::new_v4(),
        };
        assert!(scoped_filter_for(&client, Collection::Shops, Filter::new()).is_unsatisfiable());
        assert_eq!(
            scoped_filter_for(&Scope::Admin, Collection::Shops, Filter::new()),
            Filter::new()
        );
    }

    #[test]
    fn other_collections_use_tenant_columns() {
        let scope = Scope::Client {
            user_id: Uuid::new_v4(),
        };
        assert_eq!(
            scoped_filter_for(&scope, Collection::Orders, Filter::new()),
            scoped_filter(&scope, Filter::new())
        );
    }

    #[test]
    fn field_names_must_be_identifiers() {
        assert!(is_valid_field("status"));
        assert!(is_valid_field("_rev2"));
        for field in ["price-max", "", "1abc", "a b", "x;drop"] {
            assert!(!is_valid_field(field), "{field}");
        }
        let filter = Filter::new().with("status", "ok").with("price-max", "3");
        assert_eq!(filter.invalid_field(), Some("price-max"));
        assert_eq!(Filter::new().with("status", "ok").invalid_field(), None);
    }

    #[test]
    fn matches_requires_every_clause() {
        let filter = Filter::new().with("a", "1").with("b", "2");
        assert!(filter.matches(|f| Some(if f == "a" { "1" } else { "2" }.to_string())));
        assert!(!filter.matches(|f| (f == "a").then(|| "1".to_string())));
        assert!(Filter::new().matches(|_| None));
    }
}
