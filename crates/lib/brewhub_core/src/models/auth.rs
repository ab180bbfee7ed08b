//! Authentication domain models.
//!
//! Claims travel inside the signed session token as strings; an [`Identity`]
//! is the parsed, typed form handed to the scope builder.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthError;
use crate::uuid::parse_id;

/// User role. Each role has its own permission set and scoping rule; there is
/// no ordering between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    ShopAdmin,
    BranchAdmin,
    Client,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Admin, Role::ShopAdmin, Role::BranchAdmin, Role::Client];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::ShopAdmin => "SHOP_ADMIN",
            Role::BranchAdmin => "BRANCH_ADMIN",
            Role::Client => "CLIENT",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| AuthError::Validation(format!("unknown role '{s}'")))
    }
}

/// Domain user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub role: Role,
    pub shop_id: Option<Uuid>,
    pub branch_id: Option<Uuid>,
}

/// User with password hash (for internal auth flows).
#[derive(Debug, Clone)]
pub struct UserWithPassword {
    pub user: User,
    pub password_hash: Option<String>,
}

/// Persisted session. Only the SHA-256 of the token is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SessionRecord {
    /// Passive expiry: a record is dead at its expiry instant, purged or not.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// JWT claims embedded in session tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenClaims {
    /// Subject: user ID (standard JWT `sub` claim).
    pub sub: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shop_id: Option<String>,
    /// Only issued for branch admins.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_branch_id: Option<String>,
    /// Unique token id, so two tokens for one user never collide.
    pub jti: String,
    /// Expiry (unix timestamp).
    pub exp: i64,
    /// Issued at (unix timestamp).
    pub iat: i64,
}

impl TokenClaims {
    /// Claims for a freshly authenticated user.
    pub fn for_user(user: &User, issued_at: DateTime<Utc>, expires_at: DateTime<Utc>) -> Self {
        Self {
            sub: user.id.to_string(),
            role: user.role,
            shop_id: user.shop_id.map(|id| id.to_string()),
            branch_id: match user.role {
                Role::BranchAdmin => user.branch_id.map(|id| id.to_string()),
                _ => None,
            },
            default_branch_id: user.branch_id.map(|id| id.to_string()),
            jti: crate::uuid::uuidv7().to_string(),
            exp: expires_at.timestamp(),
            iat: issued_at.timestamp(),
        }
    }
}

/// Verified principal for the current request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub user_id: Uuid,
    pub role: Role,
    pub shop_id: Option<Uuid>,
    pub branch_id: Option<Uuid>,
    pub default_branch_id: Option<Uuid>,
}

impl TryFrom<TokenClaims> for Identity {
    type Error = AuthError;

    fn try_from(claims: TokenClaims) -> Result<Self, Self::Error> {
        let optional = |raw: Option<String>, claim: &str| -> Result<Option<Uuid>, AuthError> {
            raw.map(|value| {
                parse_id(&value)
                    .ok_or_else(|| AuthError::Unauthenticated(format!("malformed {claim} claim")))
            })
            .transpose()
        };

        Ok(Self {
            user_id: parse_id(&claims.sub)
                .ok_or_else(|| AuthError::Unauthenticated("malformed sub claim".into()))?,
            role: claims.role,
            shop_id: optional(claims.shop_id, "shopId")?,
            branch_id: optional(claims.branch_id, "branchId")?,
            default_branch_id: optional(claims.default_branch_id, "defaultBranchId")?,
        })
    }
}
