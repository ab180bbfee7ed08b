//! Role-based access control.
//!
//! - [`permissions`]: compiled-in role → permission table.
//! - [`scope`]: per-request tenant scope derived from a verified identity.
//! - [`gate`]: allow/deny for a scope against a permission list.
//! - [`filter`]: tenant narrowing of data-access filters.

pub mod filter;
pub mod gate;
pub mod permissions;
pub mod scope;

pub use filter::{Condition, Filter, scoped_filter, scoped_filter_for};
pub use gate::{check_permission, require_role};
pub use permissions::{Permission, has_all_permissions, has_any_permission, has_permission};
pub use scope::{Scope, build_scope};
