//! Postgres implementation of every store trait.
//!
//! Documents live in one `documents` table. Tenant fields are real columns;
//! any other filter field is read from the JSONB body with `->>`. Field names
//! are bound as parameters, never spliced into SQL.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use uuid::Uuid;

use super::{
    BranchLookup, DocumentStore, SessionStore, SessionUniqueness, StoreError, StoreResult,
    UserStore, check_filter,
};
use crate::models::auth::{Role, SessionRecord, User, UserWithPassword};
use crate::models::document::{
    BRANCH_FIELD, Branch, Collection, Document, ID_FIELD, OWNER_FIELD, SHOP_FIELD, TenantRef,
    strip_reserved,
};
use crate::rbac::filter::{Condition, Filter};

const DOCUMENT_COLUMNS: &str =
    "d.id, d.collection, d.shop_id, d.branch_id, d.owner_user_id, d.body, d.created_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a user, returning its id.
    pub async fn create_user(&self, user: &User, password_hash: &str) -> StoreResult<Uuid> {
        let id = sqlx::query_scalar::<_, Uuid>(
            "INSERT INTO users (id, email, name, password_hash, role, shop_id, branch_id) \
             VALUES ($1, lower($2), $3, $4, $5, $6, $7) RETURNING id",
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.name)
        .bind(password_hash)
        .bind(user.role.as_str())
        .bind(user.shop_id)
        .bind(user.branch_id)
        .fetch_one(&self.pool)
        .await
        .map_err(conflict_on_unique)?;
        Ok(id)
    }

    /// Whether any ADMIN user exists.
    pub async fn admin_exists(&self) -> StoreResult<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM users WHERE role = 'ADMIN')",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }
}

fn conflict_on_unique(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Conflict(db.message().to_string())
        }
        _ => StoreError::Db(e),
    }
}

type SessionRow = (Uuid, Uuid, String, DateTime<Utc>, DateTime<Utc>);

fn session_from_row(row: SessionRow) -> SessionRecord {
    let (id, user_id, token_hash, created_at, expires_at) = row;
    SessionRecord {
        id,
        user_id,
        token_hash,
        created_at,
        expires_at,
    }
}

#[async_trait]
impl SessionStore for PgStore {
    async fn find_by_token(&self, token_hash: &str) -> StoreResult<Option<SessionRecord>> {
        let row = sqlx::query_as::<_, SessionRow>(
            "SELECT id, user_id, token_hash, created_at, expires_at \
             FROM sessions WHERE token_hash = $1",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(session_from_row))
    }

    async fn insert(
        &self,
        record: SessionRecord,
        uniqueness: SessionUniqueness,
    ) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        if uniqueness == SessionUniqueness::Strict {
            // Serializes logins per user until commit.
            sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
                .bind(record.user_id.to_string())
                .execute(&mut *tx)
                .await?;
            let active = sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS(SELECT 1 FROM sessions WHERE user_id = $1 AND expires_at > $2)",
            )
            .bind(record.user_id)
            .bind(Utc::now())
            .fetch_one(&mut *tx)
            .await?;
            if active {
                return Err(StoreError::Conflict(format!(
                    "user {} already has an active session",
                    record.user_id
                )));
            }
        }

        sqlx::query(
            "INSERT INTO sessions (id, user_id, token_hash, created_at, expires_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(record.id)
        .bind(record.user_id)
        .bind(&record.token_hash)
        .bind(record.created_at)
        .bind(record.expires_at)
        .execute(&mut *tx)
        .await
        .map_err(conflict_on_unique)?;

        tx.commit().await?;
        Ok(())
    }

    async fn delete(&self, token_hash: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM sessions WHERE token_hash = $1")
            .bind(token_hash)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_all(&self, user_id: Uuid) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn find_active(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<SessionRecord>> {
        let rows = sqlx::query_as::<_, SessionRow>(
            "SELECT id, user_id, token_hash, created_at, expires_at \
             FROM sessions WHERE user_id = $1 AND expires_at > $2",
        )
        .bind(user_id)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(session_from_row).collect())
    }

    async fn find_by_user(&self, user_id: Uuid) -> StoreResult<Vec<SessionRecord>> {
        let rows = sqlx::query_as::<_, SessionRow>(
            "SELECT id, user_id, token_hash, created_at, expires_at \
             FROM sessions WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(session_from_row).collect())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<UserWithPassword>> {
        let row = sqlx::query_as::<
            _,
            (
                Uuid,
                String,
                Option<String>,
                Option<String>,
                String,
                Option<Uuid>,
                Option<Uuid>,
            ),
        >(
            "SELECT id, email, name, password_hash, role, shop_id, branch_id \
             FROM users WHERE lower(email) = lower($1)",
        )
        .bind(email.trim())
        .fetch_optional(&self.pool)
        .await?;

        let Some((id, email, name, password_hash, role, shop_id, branch_id)) = row else {
            return Ok(None);
        };
        let role = role
            .parse::<Role>()
            .map_err(|e| StoreError::Internal(format!("user {id}: {e}")))?;
        Ok(Some(UserWithPassword {
            user: User {
                id,
                email,
                name,
                role,
                shop_id,
                branch_id,
            },
            password_hash,
        }))
    }
}

#[async_trait]
impl BranchLookup for PgStore {
    async fn find_by_id_and_shop(
        &self,
        branch_id: Uuid,
        shop_id: Uuid,
    ) -> StoreResult<Option<Branch>> {
        let row = sqlx::query_as::<_, (Uuid, Uuid, Option<String>)>(
            "SELECT id, shop_id, body ->> 'name' FROM documents \
             WHERE collection = $1 AND id = $2 AND shop_id = $3",
        )
        .bind(Collection::Branches.as_str())
        .bind(branch_id)
        .bind(shop_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(id, shop_id, name)| Branch { id, shop_id, name }))
    }
}

#[async_trait]
impl DocumentStore for PgStore {
    async fn find_documents(
        &self,
        collection: Collection,
        filter: &Filter,
    ) -> StoreResult<Vec<Document>> {
        let mut qb =
            QueryBuilder::<Postgres>::new(format!("SELECT {DOCUMENT_COLUMNS} FROM documents d"));
        push_where(&mut qb, collection, filter)?;
        qb.push(" ORDER BY d.created_at, d.id");

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(document_from_row).collect()
    }

    async fn insert_document(&self, document: Document) -> StoreResult<Document> {
        sqlx::query(
            "INSERT INTO documents \
             (id, collection, shop_id, branch_id, owner_user_id, body, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(document.id)
        .bind(document.collection.as_str())
        .bind(document.tenant.shop_id)
        .bind(document.tenant.branch_id)
        .bind(document.tenant.owner_user_id)
        .bind(Json(&document.body))
        .bind(document.created_at)
        .execute(&self.pool)
        .await
        .map_err(conflict_on_unique)?;
        Ok(document)
    }

    async fn update_documents(
        &self,
        collection: Collection,
        filter: &Filter,
        patch: &Map<String, Value>,
    ) -> StoreResult<Vec<Document>> {
        let mut patch = patch.clone();
        strip_reserved(&mut patch);

        let mut qb = QueryBuilder::<Postgres>::new("UPDATE documents d SET body = d.body || ");
        qb.push_bind(Json(patch));
        push_where(&mut qb, collection, filter)?;
        qb.push(format!(" RETURNING {DOCUMENT_COLUMNS}"));

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(document_from_row).collect()
    }

    async fn delete_documents(&self, collection: Collection, filter: &Filter) -> StoreResult<u64> {
        let mut qb = QueryBuilder::<Postgres>::new("DELETE FROM documents d");
        push_where(&mut qb, collection, filter)?;
        let result = qb.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

fn document_from_row(row: &PgRow) -> StoreResult<Document> {
    let collection: String = row.try_get("collection")?;
    let Json(body): Json<Map<String, Value>> = row.try_get("body")?;
    Ok(Document {
        id: row.try_get("id")?,
        collection: collection.parse().map_err(StoreError::Internal)?,
        tenant: TenantRef {
            shop_id: row.try_get("shop_id")?,
            branch_id: row.try_get("branch_id")?,
            owner_user_id: row.try_get("owner_user_id")?,
        },
        created_at: row.try_get("created_at")?,
        body,
    })
}

/// Append ` WHERE d.collection = $n AND <clauses>` for `filter`.
fn push_where(
    qb: &mut QueryBuilder<'_, Postgres>,
    collection: Collection,
    filter: &Filter,
) -> StoreResult<()> {
    check_filter(filter)?;
    qb.push(" WHERE d.collection = ");
    qb.push_bind(collection.as_str().to_string());

    for (field, condition) in filter.iter() {
        qb.push(" AND ");

        if condition.is_unsatisfiable() {
            qb.push("FALSE");
            continue;
        }

        match field {
            ID_FIELD | SHOP_FIELD | BRANCH_FIELD | OWNER_FIELD => {
                qb.push(format!("d.{field}::text"));
            }
            _ => {
                qb.push("d.body ->> ");
                qb.push_bind(field.to_string());
            }
        }

        match condition {
            Condition::Eq(value) => {
                qb.push(" = ");
                qb.push_bind(value.clone());
            }
            Condition::In(values) => {
                qb.push(" = ANY(");
                qb.push_bind(values.clone());
                qb.push(")");
            }
        }
    }
    Ok(())
}
