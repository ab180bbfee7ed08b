//! # brewhub_core
//!
//! Authorization core and domain logic for BrewHub.
//!
//! The request pipeline is `auth::verifier::authenticate` →
//! `rbac::scope::build_scope` → `rbac::gate::check_permission` →
//! `rbac::filter::scoped_filter`. Persistence is reached only through the
//! traits in [`store`], so every step can run against Postgres or the
//! in-memory store.

pub mod auth;
pub mod migrate;
pub mod models;
pub mod rbac;
pub mod store;
pub mod uuid;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
