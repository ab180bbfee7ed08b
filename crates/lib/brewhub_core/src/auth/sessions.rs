//! Session lifecycle: login, listing, logout and purge.
//!
//! A user may hold at most one active session at creation time. The check is
//! made before issuing a token; in [`SessionUniqueness::Strict`] mode the
//! store repeats it atomically with the insert.

use chrono::{DateTime, Duration, Utc};
use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use uuid::Uuid;

use super::AuthError;
use super::jwt::generate_session_token;
use super::password::verify_password;
use crate::models::auth::{Role, SessionRecord, TokenClaims, User};
use crate::rbac::gate::require_role;
use crate::rbac::scope::Scope;
use crate::store::{SessionStore, SessionUniqueness, StoreError, UserStore};
use crate::uuid::uuidv7;

/// Session issuance settings.
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub ttl: Duration,
    pub uniqueness: SessionUniqueness,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::days(1),
            uniqueness: SessionUniqueness::default(),
        }
    }
}

/// A freshly issued session. `token` is only ever returned here.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedSession {
    pub token: String,
    pub user: User,
    pub expires_at: DateTime<Utc>,
}

/// Session as listed to its owner. Never exposes the token hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub active: bool,
}

/// SHA-256 hash a token for storage.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Verify credentials and open a session.
///
/// Unknown email and wrong password both fail with the same
/// [`AuthError::CredentialError`].
pub async fn login(
    users: &dyn UserStore,
    sessions: &dyn SessionStore,
    email: &str,
    password: &str,
    secret: &[u8],
    settings: SessionSettings,
) -> Result<IssuedSession, AuthError> {
    let email = email.trim().to_lowercase();
    if email.is_empty() || password.is_empty() {
        return Err(AuthError::Validation(
            "email and password are required".into(),
        ));
    }

    let Some(found) = users.find_by_email(&email).await? else {
        warn!(%email, "login for unknown email");
        return Err(AuthError::CredentialError);
    };
    let Some(hash) = found.password_hash.as_deref() else {
        warn!(user_id = %found.user.id, "login for user without password");
        return Err(AuthError::CredentialError);
    };
    if !verify_password(password, hash)? {
        warn!(user_id = %found.user.id, "login with wrong password");
        return Err(AuthError::CredentialError);
    }

    let user = found.user;
    let now = Utc::now();
    if !sessions.find_active(user.id, now).await?.is_empty() {
        warn!(user_id = %user.id, "login rejected: active session exists");
        return Err(active_session_conflict());
    }

    let expires_at = now
        .checked_add_signed(settings.ttl)
        .ok_or_else(|| AuthError::Internal("session ttl out of range".into()))?;
    let claims = TokenClaims::for_user(&user, now, expires_at);
    let token = generate_session_token(&claims, secret)?;
    let record = SessionRecord {
        id: uuidv7(),
        user_id: user.id,
        token_hash: hash_token(&token),
        created_at: now,
        expires_at,
    };

    match sessions.insert(record, settings.uniqueness).await {
        Ok(()) => {}
        Err(StoreError::Conflict(detail)) => {
            warn!(user_id = %user.id, %detail, "login lost the session race");
            return Err(active_session_conflict());
        }
        Err(e) => return Err(e.into()),
    }

    info!(user_id = %user.id, role = %user.role, "session opened");
    Ok(IssuedSession {
        token,
        user,
        expires_at,
    })
}

fn active_session_conflict() -> AuthError {
    AuthError::Conflict("user already has an active session".into())
}

/// Sessions of `user_id`, including expired ones not purged yet.
pub async fn list_sessions(
    sessions: &dyn SessionStore,
    user_id: Uuid,
) -> Result<Vec<SessionSummary>, AuthError> {
    let now = Utc::now();
    let mut records = sessions.find_by_user(user_id).await?;
    records.sort_by_key(|record| std::cmp::Reverse(record.created_at));
    Ok(records
        .into_iter()
        .map(|record| SessionSummary {
            id: record.id,
            created_at: record.created_at,
            expires_at: record.expires_at,
            active: record.is_active_at(now),
        })
        .collect())
}

/// Close the session behind `token`. Returns whether one existed.
pub async fn logout(sessions: &dyn SessionStore, token: &str) -> Result<bool, AuthError> {
    let removed = sessions.delete(&hash_token(token)).await?;
    if removed {
        info!("session closed");
    }
    Ok(removed)
}

/// Close every session of `user_id`. ADMIN only.
pub async fn logout_user(
    scope: &Scope,
    sessions: &dyn SessionStore,
    user_id: Uuid,
) -> Result<u64, AuthError> {
    require_role(scope, &[Role::Admin])?;
    let removed = sessions.delete_all(user_id).await?;
    info!(%user_id, removed, "sessions revoked");
    Ok(removed)
}

/// Physically delete sessions expired at `now`.
pub async fn purge_expired(
    sessions: &dyn SessionStore,
    now: DateTime<Utc>,
) -> Result<u64, AuthError> {
    let purged = sessions.purge_expired(now).await?;
    if purged > 0 {
        info!(purged, "expired sessions purged");
    }
    Ok(purged)
}

/// Random opaque string, used where a non-JWT secret value is needed.
pub fn random_token(len: usize) -> String {
    rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}
