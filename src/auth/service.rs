/// Authentication Service
///
/// Orchestrates password login, external-identity login and user management
/// over a `CredentialStore`. Token rotation lives in `refresh_token.rs`.
///
/// Login and refresh only ever fail with `AuthError::Unauthorized` or, when the
/// store cannot be reached in time, `AuthError::Transient`. Which check failed
/// is logged, never returned.

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use serde::Serialize;

use crate::auth::claims::{AccessClaims, RefreshClaims};
use crate::auth::jwt::{AccessTokenCodec, RefreshTokenCodec, TokenCodec};
use crate::auth::password::{validate_password_strength, PasswordError, PasswordHasher};
use crate::configuration::AuthSettings;
use crate::error::{AppError, AuthError, StoreError};
use crate::store::{CredentialStore, Role, UserRecord};
use crate::validators::is_valid_identity;

const TOKEN_TYPE: &str = "Bearer";
const DECOY_PASSWORD: &str = "decoy-password-never-matches";
const EXTERNAL_PASSWORD_LENGTH: usize = 48;

/// Access and refresh token issued together
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
}

/// An identity already verified by an external identity provider
#[derive(Debug, Clone)]
pub struct ExternalIdentity {
    pub identity: String,
}

/// Changes applied by `update_user`; `None` leaves the field alone
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub password: Option<String>,
    pub role: Option<Role>,
}

pub struct AuthService {
    pub(super) store: Arc<dyn CredentialStore>,
    pub(super) hasher: PasswordHasher,
    pub(super) access_tokens: Arc<AccessTokenCodec>,
    pub(super) refresh_tokens: RefreshTokenCodec,
    pub(super) store_timeout: std::time::Duration,
    decoy_hash: String,
}

impl From<PasswordError> for AppError {
    fn from(err: PasswordError) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// Collapse a store failure into the external outcome of login/refresh
pub(super) fn collapse(err: StoreError) -> AuthError {
    match err {
        e if e.is_transient() => {
            tracing::warn!(error = %e, "Credential store unavailable");
            AuthError::Transient
        }
        StoreError::NotFound(_) => AuthError::Unauthorized,
        e => {
            tracing::error!(error = %e, "Credential store error during authentication");
            AuthError::Unauthorized
        }
    }
}

impl AuthService {
    /// # Errors
    /// Returns error if `settings` fail validation
    pub fn new(store: Arc<dyn CredentialStore>, settings: &AuthSettings) -> Result<Self, AppError> {
        settings.validate()?;
        let hasher = PasswordHasher::new(settings.password_hash_cost)?;
        // Hashed once so unknown identities cost as much as wrong passwords
        let decoy_hash = hasher.hash(DECOY_PASSWORD)?;

        Ok(Self {
            store,
            hasher,
            access_tokens: Arc::new(TokenCodec::new(
                &settings.access_token_secret,
                chrono::Duration::seconds(settings.access_token_expiry),
                settings.issuer.clone(),
            )),
            refresh_tokens: TokenCodec::new(
                &settings.refresh_token_secret,
                chrono::Duration::seconds(settings.refresh_token_expiry),
                settings.issuer.clone(),
            ),
            store_timeout: settings.store_timeout(),
            decoy_hash,
        })
    }

    /// Codec shared with the access gate
    pub fn access_tokens(&self) -> Arc<AccessTokenCodec> {
        Arc::clone(&self.access_tokens)
    }

    pub fn refresh_token_lifetime(&self) -> chrono::Duration {
        self.refresh_tokens.lifetime()
    }

    /// Run a store call under the configured deadline
    pub(super) async fn within_deadline<T, F>(&self, operation: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.store_timeout, operation).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Unavailable(format!(
                "no answer within {}ms",
                self.store_timeout.as_millis()
            ))),
        }
    }

    /// Mint an access + refresh pair for `identity`
    pub(super) fn issue_pair(&self, identity: &str, role: Role) -> Result<TokenPair, AuthError> {
        let signed = self
            .access_tokens
            .issue(AccessClaims {
                sub: identity.to_string(),
                role,
            })
            .and_then(|access_token| {
                self.refresh_tokens
                    .issue(RefreshClaims {
                        sub: identity.to_string(),
                    })
                    .map(|refresh_token| (access_token, refresh_token))
            });

        match signed {
            Ok((access_token, refresh_token)) => Ok(TokenPair {
                access_token,
                refresh_token,
                token_type: TOKEN_TYPE.to_string(),
                expires_in: self.access_tokens.lifetime().num_seconds(),
            }),
            Err(e) => {
                tracing::error!(identity = %identity, error = %e, "Token issuance failed");
                Err(AuthError::Unauthorized)
            }
        }
    }

    /// Issue a pair and make its refresh token the only valid one for the user
    async fn start_session(&self, record: &UserRecord) -> Result<TokenPair, AuthError> {
        let pair = self.issue_pair(&record.identity, record.role)?;

        self.within_deadline(
            self.store
                .set_refresh_token(&record.identity, Some(pair.refresh_token.as_str())),
        )
        .await
        .map_err(collapse)?;

        Ok(pair)
    }

    /// Password login
    ///
    /// Unknown identity and wrong password produce the same error. The
    /// identity is trimmed the same way registration trims it.
    pub async fn login(&self, identity: &str, password: &str) -> Result<TokenPair, AuthError> {
        let identity = identity.trim();
        let record = match self.within_deadline(self.store.find_by_identity(identity)).await {
            Ok(record) => record,
            Err(StoreError::NotFound(_)) => {
                let _ = self
                    .hasher
                    .verify_blocking(password.to_owned(), self.decoy_hash.clone())
                    .await;
                tracing::warn!(identity = %identity, "Login failed: invalid credentials");
                return Err(AuthError::Unauthorized);
            }
            Err(e) => return Err(collapse(e)),
        };

        match self
            .hasher
            .verify_blocking(password.to_owned(), record.password_hash.clone())
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(identity = %identity, "Login failed: invalid credentials");
                return Err(AuthError::Unauthorized);
            }
            Err(PasswordError::CorruptCredential(reason)) => {
                tracing::error!(identity = %identity, reason = %reason, "Stored password hash is unreadable");
                return Err(AuthError::Unauthorized);
            }
            Err(e) => {
                tracing::error!(identity = %identity, error = %e, "Password verification failed");
                return Err(AuthError::Unauthorized);
            }
        }

        let pair = self.start_session(&record).await?;
        tracing::info!(identity = %identity, "User logged in");
        Ok(pair)
    }

    /// Login for an identity verified by an external provider
    ///
    /// First-time identities are provisioned as `Role::User` with a random
    /// password nobody knows. Issuance and persistence are the same as for
    /// password login.
    pub async fn login_external(&self, external: ExternalIdentity) -> Result<TokenPair, AuthError> {
        let identity = is_valid_identity(&external.identity).map_err(|e| {
            tracing::warn!(error = %e, "External identity rejected");
            AuthError::Unauthorized
        })?;

        let record = match self.within_deadline(self.store.find_by_identity(&identity)).await {
            Ok(record) => record,
            Err(StoreError::NotFound(_)) => self.provision_external(&identity).await?,
            Err(e) => return Err(collapse(e)),
        };

        let pair = self.start_session(&record).await?;
        tracing::info!(identity = %identity, "User logged in via external provider");
        Ok(pair)
    }

    async fn provision_external(&self, identity: &str) -> Result<UserRecord, AuthError> {
        let unusable: String = thread_rng()
            .sample_iter(&Alphanumeric)
            .take(EXTERNAL_PASSWORD_LENGTH)
            .map(char::from)
            .collect();

        let password_hash = self.hasher.hash_blocking(unusable).await.map_err(|e| {
            tracing::error!(identity = %identity, error = %e, "Provisioning hash failed");
            AuthError::Unauthorized
        })?;

        let record = UserRecord::new(identity, Role::User, password_hash);
        match self.within_deadline(self.store.insert(&record)).await {
            Ok(()) => {
                tracing::info!(identity = %identity, "Provisioned user for external identity");
                Ok(record)
            }
            // Lost a race with a concurrent first login
            Err(StoreError::Duplicate(_)) => self
                .within_deadline(self.store.find_by_identity(identity))
                .await
                .map_err(collapse),
            Err(e) => Err(collapse(e)),
        }
    }

    /// Register a new user
    ///
    /// # Errors
    /// - Validation: bad identity or weak password
    /// - Store: duplicate identity or store unavailable
    pub async fn register(
        &self,
        identity: &str,
        password: &str,
        role: Role,
    ) -> Result<UserRecord, AppError> {
        let identity = is_valid_identity(identity)?;
        validate_password_strength(password)?;

        let password_hash = self.hasher.hash_blocking(password.to_owned()).await?;
        let record = UserRecord::new(identity, role, password_hash);
        self.within_deadline(self.store.insert(&record)).await?;

        tracing::info!(identity = %record.identity, role = %record.role, "User registered");
        Ok(record)
    }

    pub async fn find_user(&self, identity: &str) -> Result<UserRecord, AppError> {
        Ok(self.within_deadline(self.store.find_by_identity(identity)).await?)
    }

    pub async fn list_users(&self) -> Result<Vec<UserRecord>, AppError> {
        Ok(self.within_deadline(self.store.list()).await?)
    }

    /// Apply `update` to a user. The password is only rehashed when a new one
    /// is supplied.
    pub async fn update_user(
        &self,
        identity: &str,
        update: UserUpdate,
    ) -> Result<UserRecord, AppError> {
        let mut record = self.find_user(identity).await?;

        if update.password.is_none() && update.role.map_or(true, |role| role == record.role) {
            return Ok(record);
        }

        if let Some(password) = update.password {
            validate_password_strength(&password)?;
            record.password_hash = self.hasher.hash_blocking(password).await?;
        }
        if let Some(role) = update.role {
            record.role = role;
        }
        record.updated_at = Utc::now();

        self.within_deadline(self.store.save(&record)).await?;
        tracing::info!(identity = %identity, role = %record.role, "User updated");
        Ok(record)
    }

    pub async fn delete_user(&self, identity: &str) -> Result<(), AppError> {
        self.within_deadline(self.store.delete(identity)).await?;
        tracing::info!(identity = %identity, "User deleted");
        Ok(())
    }
}
