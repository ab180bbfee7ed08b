//! Persistence seams consumed by the authorization core.
//!
//! Every collaborator is a trait object so request handling can run against
//! Postgres in production and [`memory::MemoryStore`] in tests.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::models::auth::{SessionRecord, UserWithPassword};
use crate::models::document::{Branch, Collection, Document};
use crate::rbac::filter::Filter;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),

    /// A filter field that is not a plain identifier.
    #[error("invalid filter field '{0}'")]
    InvalidFilter(String),

    #[error("store error: {0}")]
    Internal(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Reject filters naming fields no store can address.
pub(crate) fn check_filter(filter: &Filter) -> StoreResult<()> {
    match filter.invalid_field() {
        Some(field) => Err(StoreError::InvalidFilter(field.to_string())),
        None => Ok(()),
    }
}

/// How the single-active-session rule is enforced when inserting a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionUniqueness {
    /// The caller checked for active sessions beforehand; concurrent logins
    /// for the same user can both succeed.
    #[default]
    BestEffort,
    /// The store re-checks and inserts atomically, failing with
    /// [`StoreError::Conflict`] when an active session exists.
    Strict,
}

impl std::str::FromStr for SessionUniqueness {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "best_effort" | "best-effort" => Ok(SessionUniqueness::BestEffort),
            "strict" => Ok(SessionUniqueness::Strict),
            other => Err(StoreError::Internal(format!(
                "unknown session uniqueness mode '{other}'"
            ))),
        }
    }
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Raw lookup by token hash. Expiry is the caller's concern.
    async fn find_by_token(&self, token_hash: &str) -> StoreResult<Option<SessionRecord>>;
    async fn insert(&self, record: SessionRecord, uniqueness: SessionUniqueness)
    -> StoreResult<()>;
    /// Returns whether a record was removed.
    async fn delete(&self, token_hash: &str) -> StoreResult<bool>;
    async fn delete_all(&self, user_id: Uuid) -> StoreResult<u64>;
    /// Sessions of `user_id` whose expiry is after `now`.
    async fn find_active(&self, user_id: Uuid, now: DateTime<Utc>)
    -> StoreResult<Vec<SessionRecord>>;
    /// All sessions of `user_id`, including expired ones not yet purged.
    async fn find_by_user(&self, user_id: Uuid) -> StoreResult<Vec<SessionRecord>>;
    async fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<u64>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<UserWithPassword>>;
}

#[async_trait]
pub trait BranchLookup: Send + Sync {
    /// The branch `branch_id`, only if it belongs to `shop_id`.
    async fn find_by_id_and_shop(&self, branch_id: Uuid, shop_id: Uuid)
    -> StoreResult<Option<Branch>>;
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn find_documents(
        &self,
        collection: Collection,
        filter: &Filter,
    ) -> StoreResult<Vec<Document>>;
    async fn insert_document(&self, document: Document) -> StoreResult<Document>;
    /// Shallow-merges `patch` into every document matching `filter` and
    /// returns the updated documents. Reserved keys in `patch` are ignored.
    async fn update_documents(
        &self,
        collection: Collection,
        filter: &Filter,
        patch: &Map<String, Value>,
    ) -> StoreResult<Vec<Document>>;
    /// Deletes every document matching `filter`; returns how many went.
    async fn delete_documents(&self, collection: Collection, filter: &Filter) -> StoreResult<u64>;
}
