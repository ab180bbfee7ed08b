//! Request and response bodies.

use brewhub_core::auth::sessions::SessionSummary;
use brewhub_core::models::auth::User;
use brewhub_core::models::document::Document;
use brewhub_core::rbac::Permission;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    /// Permissions that would have sufficed; only set on permission denials.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_permissions: Vec<Permission>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
    pub user: User,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogoutResponse {
    pub success: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RevokeSessionsResponse {
    pub revoked: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentListResponse {
    pub data: Vec<Document>,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    pub deleted: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}
