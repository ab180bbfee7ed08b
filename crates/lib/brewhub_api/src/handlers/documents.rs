//! Scoped document handlers for shops, branches, categories, items and orders.
//!
//! Every handler gates on the collection's permission, then reaches the store
//! only through [`scoped_filter_for`]. Records outside the caller's scope are
//! reported as not found.

use std::collections::HashMap;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use brewhub_core::models::document::{
    Action, Collection, Document, ID_FIELD, TenantRef, strip_reserved,
};
use brewhub_core::rbac::{Filter, Scope, check_permission, scoped_filter_for};
use brewhub_core::uuid::parse_id;
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::{AuthContext, first_header};
use crate::models::{DeleteResponse, DocumentListResponse};

fn parse_collection(raw: &str) -> AppResult<Collection> {
    raw.parse()
        .map_err(|_| AppError::NotFound(format!("no such collection '{raw}'")))
}

/// Gate `action` on `collection` for the caller.
fn authorize(scope: &Scope, collection: Collection, action: Action) -> AppResult<()> {
    let permission = collection.permission(action).ok_or_else(|| {
        AppError::MethodNotAllowed(format!("{collection} does not support {action:?}"))
    })?;
    check_permission(scope, &[permission])?;
    Ok(())
}

/// Filter selecting one document by id.
fn by_id(raw: &str) -> AppResult<Filter> {
    let id = parse_id(raw).ok_or_else(|| AppError::NotFound(format!("document {raw}")))?;
    Ok(Filter::new().with(ID_FIELD, id.to_string()))
}

fn requested_shop(state: &AppState, headers: &HeaderMap) -> AppResult<Option<Uuid>> {
    first_header(headers, std::slice::from_ref(&state.config.shop_header))
        .map(|raw| {
            parse_id(&raw).ok_or_else(|| {
                AppError::Validation(format!("{} is not a valid id", state.config.shop_header))
            })
        })
        .transpose()
}

/// `GET /{collection}`: list documents; query parameters become equality
/// clauses, narrowed to the caller's scope.
pub async fn list_documents_handler(
    State(state): State<AppState>,
    axum::Extension(ctx): axum::Extension<AuthContext>,
    Path(collection): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> AppResult<Json<DocumentListResponse>> {
    let collection = parse_collection(&collection)?;
    authorize(&ctx.scope, collection, Action::View)?;

    let filter = scoped_filter_for(&ctx.scope, collection, params.into_iter().collect());
    let data = state.documents.find_documents(collection, &filter).await?;
    Ok(Json(DocumentListResponse {
        count: data.len(),
        data,
    }))
}

/// `POST /{collection}`: create a document stamped with the caller's tenant.
pub async fn create_document_handler(
    State(state): State<AppState>,
    axum::Extension(ctx): axum::Extension<AuthContext>,
    Path(collection): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> AppResult<(StatusCode, Json<Document>)> {
    let collection = parse_collection(&collection)?;
    authorize(&ctx.scope, collection, Action::Create)?;

    let Value::Object(body) = body else {
        return Err(AppError::Validation("body must be a JSON object".into()));
    };
    // A shop is its own tenant.
    let tenant = match collection {
        Collection::Shops => TenantRef::default(),
        _ => ctx.scope.write_tenant(requested_shop(&state, &headers)?)?,
    };
    let document = state
        .documents
        .insert_document(Document::new(collection, tenant, body))
        .await?;

    info!(
        user_id = %ctx.identity.user_id,
        %collection,
        id = %document.id,
        "document created"
    );
    Ok((StatusCode::CREATED, Json(document)))
}

/// `GET /{collection}/{id}`
pub async fn get_document_handler(
    State(state): State<AppState>,
    axum::Extension(ctx): axum::Extension<AuthContext>,
    Path((collection, id)): Path<(String, String)>,
) -> AppResult<Json<Document>> {
    let collection = parse_collection(&collection)?;
    authorize(&ctx.scope, collection, Action::View)?;

    let filter = scoped_filter_for(&ctx.scope, collection, by_id(&id)?);
    state
        .documents
        .find_documents(collection, &filter)
        .await?
        .into_iter()
        .next()
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("{collection} {id}")))
}

/// `PATCH /{collection}/{id}`: shallow-merge the body into a document in
/// scope. Tenant fields in the body are ignored.
pub async fn update_document_handler(
    State(state): State<AppState>,
    axum::Extension(ctx): axum::Extension<AuthContext>,
    Path((collection, id)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> AppResult<Json<Document>> {
    let collection = parse_collection(&collection)?;
    authorize(&ctx.scope, collection, Action::Edit)?;

    let Value::Object(mut patch) = body else {
        return Err(AppError::Validation("body must be a JSON object".into()));
    };
    strip_reserved(&mut patch);
    if patch.is_empty() {
        return Err(AppError::Validation("nothing to update".into()));
    }

    let filter = scoped_filter_for(&ctx.scope, collection, by_id(&id)?);
    let document = state
        .documents
        .update_documents(collection, &filter, &patch)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| AppError::NotFound(format!("{collection} {id}")))?;

    info!(user_id = %ctx.identity.user_id, %collection, %id, "document updated");
    Ok(Json(document))
}

/// `DELETE /{collection}/{id}`
pub async fn delete_document_handler(
    State(state): State<AppState>,
    axum::Extension(ctx): axum::Extension<AuthContext>,
    Path((collection, id)): Path<(String, String)>,
) -> AppResult<Json<DeleteResponse>> {
    let collection = parse_collection(&collection)?;
    authorize(&ctx.scope, collection, Action::Delete)?;

    let filter = scoped_filter_for(&ctx.scope, collection, by_id(&id)?);
    let deleted = state.documents.delete_documents(collection, &filter).await?;
    if deleted == 0 {
        return Err(AppError::NotFound(format!("{collection} {id}")));
    }

    info!(user_id = %ctx.identity.user_id, %collection, %id, "document deleted");
    Ok(Json(DeleteResponse { deleted }))
}
