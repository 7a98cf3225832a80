/// Credential store
///
/// The durable user record and the trait the authentication service uses to
/// reach it. Refresh tokens are only ever written through the dedicated
/// single-statement methods so that a rotation can never be lost to a
/// concurrent profile update.

mod memory;
mod postgres;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

pub use memory::InMemoryCredentialStore;
pub use postgres::PgCredentialStore;

/// Authorization role attached to every user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Admin => "Admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "User" => Ok(Role::User),
            "Admin" => Ok(Role::Admin),
            other => Err(StoreError::Query(format!("unknown role {:?}", other))),
        }
    }
}

/// A user as persisted by the store
#[derive(Debug, Clone, PartialEq)]
pub struct UserRecord {
    pub identity: String,
    pub role: Role,
    pub password_hash: String,
    /// The only refresh token currently accepted for this user
    pub refresh_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserRecord {
    pub fn new(identity: impl Into<String>, role: Role, password_hash: String) -> Self {
        let now = Utc::now();
        Self {
            identity: identity.into(),
            role,
            password_hash,
            refresh_token: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Returns `StoreError::NotFound` when no record matches.
    async fn find_by_identity(&self, identity: &str) -> Result<UserRecord, StoreError>;

    async fn list(&self) -> Result<Vec<UserRecord>, StoreError>;

    /// Returns `StoreError::Duplicate` when the identity is taken.
    async fn insert(&self, record: &UserRecord) -> Result<(), StoreError>;

    /// Persists role, password hash and `updated_at`. The refresh token is left
    /// untouched.
    async fn save(&self, record: &UserRecord) -> Result<(), StoreError>;

    /// Unconditionally replaces the stored refresh token.
    async fn set_refresh_token(&self, identity: &str, token: Option<&str>)
        -> Result<(), StoreError>;

    /// Replaces the stored refresh token with `next` only if it currently
    /// equals `current`. Returns whether the swap happened.
    async fn swap_refresh_token(
        &self,
        identity: &str,
        current: &str,
        next: &str,
    ) -> Result<bool, StoreError>;

    async fn delete(&self, identity: &str) -> Result<(), StoreError>;
}
