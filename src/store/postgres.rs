use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use super::{CredentialStore, UserRecord};
use crate::configuration::DatabaseSettings;
use crate::error::StoreError;

const UNIQUE_VIOLATION: &str = "23505";

type UserRow = (String, String, String, Option<String>, DateTime<Utc>, DateTime<Utc>);

/// Postgres-backed store. Every method is a single statement, which gives the
/// per-record atomicity rotation depends on.
#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Build a lazily connecting pool; connection failures surface on first use
    /// as `StoreError::Unavailable`.
    pub fn connect_lazy(settings: &DatabaseSettings, acquire_timeout: Duration) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(acquire_timeout)
            .connect_lazy(&settings.connection_string())?;
        Ok(Self::new(pool))
    }

    /// Apply the embedded schema migrations
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(format!("migration failed: {}", e)))
    }
}

fn into_record(row: UserRow) -> Result<UserRecord, StoreError> {
    let (identity, role, password_hash, refresh_token, created_at, updated_at) = row;
    Ok(UserRecord {
        identity,
        role: role.parse()?,
        password_hash,
        refresh_token,
        created_at,
        updated_at,
    })
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound("record not found".to_string()),
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StoreError::Unavailable(err.to_string())
            }
            sqlx::Error::Database(ref db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
                StoreError::Duplicate("identity already registered".to_string())
            }
            other => StoreError::Query(other.to_string()),
        }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_by_identity(&self, identity: &str) -> Result<UserRecord, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT identity, role, password_hash, refresh_token, created_at, updated_at
            FROM users
            WHERE identity = $1
            "#,
        )
        .bind(identity)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("user {}", identity)))?;

        into_record(row)
    }

    async fn list(&self) -> Result<Vec<UserRecord>, StoreError> {
        let rows = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT identity, role, password_hash, refresh_token, created_at, updated_at
            FROM users
            ORDER BY created_at, identity
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(into_record).collect()
    }

    async fn insert(&self, record: &UserRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO users (identity, role, password_hash, refresh_token, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&record.identity)
        .bind(record.role.as_str())
        .bind(&record.password_hash)
        .bind(&record.refresh_token)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn save(&self, record: &UserRecord) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET role = $1, password_hash = $2, updated_at = $3
            WHERE identity = $4
            "#,
        )
        .bind(record.role.as_str())
        .bind(&record.password_hash)
        .bind(record.updated_at)
        .bind(&record.identity)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("user {}", record.identity)));
        }
        Ok(())
    }

    async fn set_refresh_token(
        &self,
        identity: &str,
        token: Option<&str>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE users SET refresh_token = $1 WHERE identity = $2")
            .bind(token)
            .bind(identity)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("user {}", identity)));
        }
        Ok(())
    }

    async fn swap_refresh_token(
        &self,
        identity: &str,
        current: &str,
        next: &str,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET refresh_token = $1
            WHERE identity = $2 AND refresh_token = $3
            "#,
        )
        .bind(next)
        .bind(identity)
        .bind(current)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete(&self, identity: &str) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM users WHERE identity = $1")
            .bind(identity)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("user {}", identity)));
        }
        Ok(())
    }
}
