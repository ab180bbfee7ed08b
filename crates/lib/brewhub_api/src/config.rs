//! API server configuration.

use brewhub_core::auth::jwt::resolve_jwt_secret;
use brewhub_core::auth::sessions::SessionSettings;
use brewhub_core::store::SessionUniqueness;
use chrono::Duration;
use tracing::warn;

/// Session lifetime when `SESSION_TTL_SECS` is unset: one day.
const DEFAULT_SESSION_TTL_SECS: i64 = 24 * 60 * 60;
/// Longest accepted session lifetime: ten years.
const MAX_SESSION_TTL_SECS: i64 = 10 * 365 * 24 * 60 * 60;

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:3100").
    pub bind_addr: String,
    /// PostgreSQL connection URL.
    pub pg_connection_url: String,
    /// JWT signing secret.
    pub jwt_secret: String,
    pub session_ttl_secs: i64,
    /// Name of the httpOnly session cookie.
    pub session_cookie: String,
    /// Headers consulted, in order, for the requested branch.
    pub branch_headers: Vec<String>,
    /// Header naming the shop a new record belongs to (ADMIN and CLIENT).
    pub shop_header: String,
    pub session_uniqueness: SessionUniqueness,
    /// Allowed browser origin. `None` allows any origin without credentials.
    pub cors_origin: Option<String>,
    /// Mark the session cookie `Secure`.
    pub cookie_secure: bool,
}

impl ApiConfig {
    /// Defaults with the given signing secret.
    pub fn with_secret(jwt_secret: impl Into<String>) -> Self {
        Self {
            bind_addr: "127.0.0.1:3100".into(),
            pg_connection_url: "postgres://localhost:5432/brewhub".into(),
            jwt_secret: jwt_secret.into(),
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
            session_cookie: "session".into(),
            branch_headers: vec!["x-branch-id".into(), "x-branch".into()],
            shop_header: "x-shop-id".into(),
            session_uniqueness: SessionUniqueness::BestEffort,
            cors_origin: None,
            cookie_secure: false,
        }
    }

    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable             | Default                              |
    /// |----------------------|--------------------------------------|
    /// | `BIND_ADDR`          | `127.0.0.1:3100`                     |
    /// | `DATABASE_URL`       | `postgres://localhost:5432/brewhub`  |
    /// | `JWT_SECRET` / `AUTH_SECRET` | generated & persisted to file |
    /// | `SESSION_TTL_SECS`   | `86400`                              |
    /// | `SESSION_COOKIE`     | `session`                            |
    /// | `BRANCH_HEADERS`     | `x-branch-id,x-branch`               |
    /// | `SHOP_HEADER`        | `x-shop-id`                          |
    /// | `SESSION_UNIQUENESS` | `best_effort` (or `strict`)          |
    /// | `CORS_ORIGIN`        | unset (any origin)                   |
    /// | `COOKIE_SECURE`      | `false`                              |
    pub fn from_env() -> Self {
        let mut config = Self::with_secret(resolve_jwt_secret());

        if let Some(addr) = env_var("BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Some(url) = env_var("DATABASE_URL") {
            config.pg_connection_url = url;
        }
        if let Some(raw) = env_var("SESSION_TTL_SECS") {
            match parse_ttl(&raw) {
                Some(secs) => config.session_ttl_secs = secs,
                None => warn!(
                    value = %raw,
                    max = MAX_SESSION_TTL_SECS,
                    "ignoring invalid SESSION_TTL_SECS"
                ),
            }
        }
        if let Some(name) = env_var("SESSION_COOKIE") {
            config.session_cookie = name;
        }
        if let Some(raw) = env_var("BRANCH_HEADERS") {
            let headers = split_header_list(&raw);
            if !headers.is_empty() {
                config.branch_headers = headers;
            }
        }
        if let Some(name) = env_var("SHOP_HEADER") {
            config.shop_header = name.to_ascii_lowercase();
        }
        if let Some(raw) = env_var("SESSION_UNIQUENESS") {
            match raw.parse() {
                Ok(mode) => config.session_uniqueness = mode,
                Err(e) => warn!(error = %e, "ignoring SESSION_UNIQUENESS"),
            }
        }
        config.cors_origin = env_var("CORS_ORIGIN");
        if let Some(raw) = env_var("COOKIE_SECURE") {
            config.cookie_secure = matches!(raw.as_str(), "1" | "true" | "yes");
        }

        config
    }

    /// Session issuance settings for the core login flow.
    ///
    /// The lifetime is clamped to `1..=MAX_SESSION_TTL_SECS` seconds.
    pub fn session_settings(&self) -> SessionSettings {
        let secs = self.session_ttl_secs.clamp(1, MAX_SESSION_TTL_SECS);
        SessionSettings {
            ttl: Duration::try_seconds(secs).unwrap_or_else(|| Duration::days(1)),
            uniqueness: self.session_uniqueness,
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Positive TTL in seconds, at most [`MAX_SESSION_TTL_SECS`].
fn parse_ttl(raw: &str) -> Option<i64> {
    raw.parse::<i64>()
        .ok()
        .filter(|secs| (1..=MAX_SESSION_TTL_SECS).contains(secs))
}

fn split_header_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|h| h.trim().to_ascii_lowercase())
        .filter(|h| !h.is_empty())
        .collect()
}
