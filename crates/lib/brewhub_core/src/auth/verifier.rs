//! Session verifier: credential → [`Identity`].

use chrono::{DateTime, Utc};
use tracing::debug;

use super::AuthError;
use super::jwt::verify_session_token;
use super::sessions::hash_token;
use crate::models::auth::Identity;
use crate::store::SessionStore;

/// Verify `token` and its persisted session, returning the caller's identity.
///
/// Both the signed expiry and the session record's expiry are checked; a
/// record expired at `now` counts as absent even before it is purged.
/// Read-only: the session is never renewed.
pub async fn authenticate(
    token: Option<&str>,
    secret: &[u8],
    sessions: &dyn SessionStore,
    now: DateTime<Utc>,
) -> Result<Identity, AuthError> {
    let token = token
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AuthError::Unauthenticated("no session token".into()))?;

    let claims = verify_session_token(token, secret)?;

    let record = sessions
        .find_by_token(&hash_token(token))
        .await?
        .ok_or_else(|| AuthError::Unauthenticated("session not found".into()))?;
    if !record.is_active_at(now) {
        debug!(user_id = %record.user_id, expires_at = %record.expires_at, "session expired");
        return Err(AuthError::Unauthenticated("session expired".into()));
    }

    let identity = Identity::try_from(claims)?;
    if identity.user_id != record.user_id {
        return Err(AuthError::Unauthenticated(
            "session does not belong to token subject".into(),
        ));
    }
    Ok(identity)
}
