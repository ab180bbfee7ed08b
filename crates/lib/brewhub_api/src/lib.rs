//! # brewhub_api
//!
//! HTTP API library for BrewHub.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;

use std::sync::Arc;

use axum::Router;
use axum::http::{HeaderName, HeaderValue, Method, header};
use axum::routing::{delete, get, post};
use brewhub_core::store::memory::MemoryStore;
use brewhub_core::store::postgres::PgStore;
use brewhub_core::store::{BranchLookup, DocumentStore, SessionStore, UserStore};
use sqlx::PgPool;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::warn;

use crate::config::ApiConfig;
use crate::handlers::{documents, health, sessions};

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<dyn SessionStore>,
    pub users: Arc<dyn UserStore>,
    pub branches: Arc<dyn BranchLookup>,
    pub documents: Arc<dyn DocumentStore>,
    /// API configuration.
    pub config: ApiConfig,
}

impl AppState {
    /// State backed by PostgreSQL.
    pub fn postgres(pool: PgPool, config: ApiConfig) -> Self {
        Self::from_store(PgStore::new(pool), config)
    }

    /// State backed by the in-memory store.
    pub fn in_memory(store: MemoryStore, config: ApiConfig) -> Self {
        Self::from_store(store, config)
    }

    fn from_store<S>(store: S, config: ApiConfig) -> Self
    where
        S: SessionStore + UserStore + BranchLookup + DocumentStore + Clone + 'static,
    {
        Self {
            sessions: Arc::new(store.clone()),
            users: Arc::new(store.clone()),
            branches: Arc::new(store.clone()),
            documents: Arc::new(store),
            config,
        }
    }
}

/// Run embedded database migrations.
///
/// Delegates to `brewhub_core::migrate::migrate()` which owns the migration files.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    brewhub_core::migrate::migrate(pool).await
}

fn cors_layer(config: &ApiConfig) -> CorsLayer {
    let origin = config
        .cors_origin
        .as_deref()
        .and_then(|raw| match HeaderValue::from_str(raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(origin = raw, error = %e, "ignoring invalid CORS_ORIGIN");
                None
            }
        });

    let Some(origin) = origin else {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    };

    // Credentialed CORS cannot use wildcards.
    let mut headers = vec![header::CONTENT_TYPE, header::AUTHORIZATION];
    headers.extend(
        config
            .branch_headers
            .iter()
            .chain(std::iter::once(&config.shop_header))
            .filter_map(|name| HeaderName::from_bytes(name.as_bytes()).ok()),
    );
    CorsLayer::new()
        .allow_origin(AllowOrigin::exact(origin))
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(headers)
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);

    // Public routes (no auth required)
    let public = Router::new()
        .route("/health", get(health::health))
        .route("/login", post(sessions::login_handler));

    // Protected routes (require auth)
    let protected = Router::new()
        .route(
            "/sessions",
            get(sessions::list_sessions_handler).delete(sessions::logout_handler),
        )
        .route(
            "/sessions/user/{id}",
            delete(sessions::logout_user_handler),
        )
        .route(
            "/{collection}",
            get(documents::list_documents_handler).post(documents::create_document_handler),
        )
        .route(
            "/{collection}/{id}",
            get(documents::get_document_handler)
                .patch(documents::update_document_handler)
                .delete(documents::delete_document_handler),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_auth,
        ));

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(cors)
        .with_state(state)
}
