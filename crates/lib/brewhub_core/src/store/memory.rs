//! In-memory implementation of every store trait.
//!
//! Maps are guarded by `tokio::sync::RwLock` and shared through `Arc`, so a
//! cloned store sees the same state. Not durable; used by tests and local
//! development without Postgres.
//!
//! Strict session uniqueness holds here because the active-session check and
//! the insert run under one write lock.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use serde_json::{Map, Value};

use super::{
    BranchLookup, DocumentStore, SessionStore, SessionUniqueness, StoreError, StoreResult,
    UserStore, check_filter,
};
use crate::models::auth::{SessionRecord, UserWithPassword};
use crate::models::document::{Branch, Collection, Document};
use crate::rbac::filter::Filter;

#[derive(Clone, Default)]
pub struct MemoryStore {
    /// Users keyed by lowercased email.
    users: Arc<RwLock<HashMap<String, UserWithPassword>>>,
    /// Sessions keyed by token hash.
    sessions: Arc<RwLock<HashMap<String, SessionRecord>>>,
    /// Documents in insertion order.
    documents: Arc<RwLock<Vec<Document>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provision a user. Replaces any user with the same email.
    pub async fn add_user(&self, user: UserWithPassword) {
        let key = user.user.email.trim().to_lowercase();
        self.users.write().await.insert(key, user);
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn find_by_token(&self, token_hash: &str) -> StoreResult<Option<SessionRecord>> {
        Ok(self.sessions.read().await.get(token_hash).cloned())
    }

    async fn insert(
        &self,
        record: SessionRecord,
        uniqueness: SessionUniqueness,
    ) -> StoreResult<()> {
        let mut sessions = self.sessions.write().await;
        if uniqueness == SessionUniqueness::Strict {
            let now = Utc::now();
            let active = sessions
                .values()
                .any(|s| s.user_id == record.user_id && s.is_active_at(now));
            if active {
                return Err(StoreError::Conflict(format!(
                    "user {} already has an active session",
                    record.user_id
                )));
            }
        }
        if sessions.contains_key(&record.token_hash) {
            return Err(StoreError::Conflict("duplicate session token".into()));
        }
        sessions.insert(record.token_hash.clone(), record);
        Ok(())
    }

    async fn delete(&self, token_hash: &str) -> StoreResult<bool> {
        Ok(self.sessions.write().await.remove(token_hash).is_some())
    }

    async fn delete_all(&self, user_id: Uuid) -> StoreResult<u64> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.user_id != user_id);
        Ok((before - sessions.len()) as u64)
    }

    async fn find_active(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<SessionRecord>> {
        Ok(self
            .sessions
            .read()
            .await
            .values()
            .filter(|s| s.user_id == user_id && s.is_active_at(now))
            .cloned()
            .collect())
    }

    async fn find_by_user(&self, user_id: Uuid) -> StoreResult<Vec<SessionRecord>> {
        Ok(self
            .sessions
            .read()
            .await
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.is_active_at(now));
        Ok((before - sessions.len()) as u64)
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<UserWithPassword>> {
        let key = email.trim().to_lowercase();
        Ok(self.users.read().await.get(&key).cloned())
    }
}

#[async_trait]
impl BranchLookup for MemoryStore {
    async fn find_by_id_and_shop(
        &self,
        branch_id: Uuid,
        shop_id: Uuid,
    ) -> StoreResult<Option<Branch>> {
        let documents = self.documents.read().await;
        Ok(documents
            .iter()
            .find(|d| {
                d.collection == Collection::Branches
                    && d.id == branch_id
                    && d.tenant.shop_id == Some(shop_id)
            })
            .map(|d| Branch {
                id: d.id,
                shop_id,
                name: d.body.get("name").and_then(|v| v.as_str()).map(String::from),
            }))
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find_documents(
        &self,
        collection: Collection,
        filter: &Filter,
    ) -> StoreResult<Vec<Document>> {
        check_filter(filter)?;
        if filter.is_unsatisfiable() {
            return Ok(Vec::new());
        }
        Ok(self
            .documents
            .read()
            .await
            .iter()
            .filter(|d| d.collection == collection && filter.matches(|f| d.field_text(f)))
            .cloned()
            .collect())
    }

    async fn insert_document(&self, document: Document) -> StoreResult<Document> {
        let mut documents = self.documents.write().await;
        if documents.iter().any(|d| d.id == document.id) {
            return Err(StoreError::Conflict(format!(
                "document {} already exists",
                document.id
            )));
        }
        documents.push(document.clone());
        Ok(document)
    }

    async fn update_documents(
        &self,
        collection: Collection,
        filter: &Filter,
        patch: &Map<String, Value>,
    ) -> StoreResult<Vec<Document>> {
        check_filter(filter)?;
        if filter.is_unsatisfiable() {
            return Ok(Vec::new());
        }
        let mut documents = self.documents.write().await;
        Ok(documents
            .iter_mut()
            .filter(|d| d.collection == collection && filter.matches(|f| d.field_text(f)))
            .map(|d| {
                d.apply_patch(patch);
                d.clone()
            })
            .collect())
    }

    async fn delete_documents(&self, collection: Collection, filter: &Filter) -> StoreResult<u64> {
        check_filter(filter)?;
        if filter.is_unsatisfiable() {
            return Ok(0);
        }
        let mut documents = self.documents.write().await;
        let before = documents.len();
        documents.retain(|d| !(d.collection == collection && filter.matches(|f| d.field_text(f))));
        Ok((before - documents.len()) as u64)
    }
}
