//! Login and session management handlers.

use axum::Json;
use axum::extract::{Path, State};
use axum_extra::extract::cookie::CookieJar;
use brewhub_core::auth::sessions;
use uuid::Uuid;

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::AuthContext;
use crate::models::{
    LoginRequest, LoginResponse, LogoutResponse, RevokeSessionsResponse, SessionListResponse,
};
use crate::services::cookies::{clear_session_cookie, session_cookie};

/// `POST /login`: authenticate with email + password and open a session.
pub async fn login_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<LoginRequest>,
) -> AppResult<(CookieJar, Json<LoginResponse>)> {
    let issued = sessions::login(
        state.users.as_ref(),
        state.sessions.as_ref(),
        &body.email,
        &body.password,
        state.config.jwt_secret.as_bytes(),
        state.config.session_settings(),
    )
    .await?;

    let jar = jar.add(session_cookie(
        &state.config.session_cookie,
        &issued.token,
        state.config.session_ttl_secs,
        state.config.cookie_secure,
    ));
    Ok((
        jar,
        Json(LoginResponse {
            token: issued.token,
            token_type: "Bearer".into(),
            expires_at: issued.expires_at,
            user: issued.user,
        }),
    ))
}

/// `GET /sessions`: the caller's own sessions.
pub async fn list_sessions_handler(
    State(state): State<AppState>,
    axum::Extension(ctx): axum::Extension<AuthContext>,
) -> AppResult<Json<SessionListResponse>> {
    let sessions = sessions::list_sessions(state.sessions.as_ref(), ctx.identity.user_id).await?;
    Ok(Json(SessionListResponse { sessions }))
}

/// `DELETE /sessions`: close the current session.
pub async fn logout_handler(
    State(state): State<AppState>,
    axum::Extension(ctx): axum::Extension<AuthContext>,
    jar: CookieJar,
) -> AppResult<(CookieJar, Json<LogoutResponse>)> {
    let success = sessions::logout(state.sessions.as_ref(), &ctx.token).await?;
    let jar = jar.add(clear_session_cookie(
        &state.config.session_cookie,
        state.config.cookie_secure,
    ));
    Ok((jar, Json(LogoutResponse { success })))
}

/// `DELETE /sessions/user/{id}`: close every session of a user. ADMIN only.
pub async fn logout_user_handler(
    State(state): State<AppState>,
    axum::Extension(ctx): axum::Extension<AuthContext>,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<RevokeSessionsResponse>> {
    let revoked = sessions::logout_user(&ctx.scope, state.sessions.as_ref(), user_id).await?;
    Ok(Json(RevokeSessionsResponse { revoked }))
}
