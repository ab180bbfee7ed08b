//! Authentication middleware: credential extraction, session verification and
//! scope derivation.

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use axum_extra::extract::cookie::CookieJar;
use brewhub_core::auth::verifier::authenticate;
use brewhub_core::models::auth::Identity;
use brewhub_core::rbac::{Scope, build_scope};
use chrono::Utc;
use tracing::debug;

use crate::AppState;
use crate::error::AppError;

/// Verified caller, stored in request extensions for protected handlers.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub identity: Identity,
    pub scope: Scope,
    /// Raw session token, kept so logout can close this exact session.
    pub token: String,
}

/// Session token from the named cookie, else from `Authorization: Bearer`.
pub fn extract_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let jar = CookieJar::from_headers(headers);
    if let Some(cookie) = jar.get(cookie_name)
        && !cookie.value().is_empty()
    {
        return Some(cookie.value().to_string());
    }

    let header = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = header.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}

/// First non-empty value among `names`.
pub fn first_header(headers: &HeaderMap, names: &[String]) -> Option<String> {
    names.iter().find_map(|name| {
        headers
            .get(name.as_str())
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(String::from)
    })
}

/// Axum middleware: verifies the session, builds the request scope and
/// injects [`AuthContext`] into request extensions.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let headers = request.headers();
    let token = extract_token(headers, &state.config.session_cookie);
    let requested_branch = first_header(headers, &state.config.branch_headers);

    let identity = authenticate(
        token.as_deref(),
        state.config.jwt_secret.as_bytes(),
        state.sessions.as_ref(),
        Utc::now(),
    )
    .await?;
    let scope = build_scope(&identity, requested_branch.as_deref(), state.branches.as_ref()).await?;
    debug!(user_id = %identity.user_id, ?scope, "request scope");

    request.extensions_mut().insert(AuthContext {
        identity,
        scope,
        token: token.unwrap_or_default(),
    });

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn cookie_wins_over_bearer() {
        let h = headers(&[
            ("cookie", "theme=dark; session=from-cookie"),
            ("authorization", "Bearer from-header"),
        ]);
        assert_eq!(extract_token(&h, "session").as_deref(), Some("from-cookie"));
    }

    #[test]
    fn bearer_is_used_without_cookie() {
        let h = headers(&[("authorization", "bearer abc")]);
        assert_eq!(extract_token(&h, "session").as_deref(), Some("abc"));
        let h = headers(&[("authorization", "Basic abc")]);
        assert_eq!(extract_token(&h, "session"), None);
        assert_eq!(extract_token(&HeaderMap::new(), "session"), None);
    }

    #[test]
    fn branch_header_order_is_respected() {
        let names = vec!["x-branch-id".to_string(), "x-branch".to_string()];
        let h = headers(&[("x-branch", "b2"), ("x-branch-id", "b1")]);
        assert_eq!(first_header(&h, &names).as_deref(), Some("b1"));
        let h = headers(&[("x-branch-id", " "), ("x-branch", "b2")]);
        assert_eq!(first_header(&h, &names).as_deref(), Some("b2"));
    }
}
