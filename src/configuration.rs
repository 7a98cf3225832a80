use std::time::Duration;

use crate::error::ConfigError;

#[derive(serde::Deserialize, Clone)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub auth: AuthSettings,
    /// Postgres settings; the in-memory store is used when absent
    #[serde(default)]
    pub database: Option<DatabaseSettings>,
}

#[derive(serde::Deserialize, Clone)]
pub struct ApplicationSettings {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
    /// Mark auth cookies `Secure` (and `SameSite=None`)
    #[serde(default)]
    pub secure_cookies: bool,
}

#[derive(serde::Deserialize, Clone)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: String,
    pub port: u16,
    pub host: String,
    pub database_name: String,
}

impl DatabaseSettings {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database_name
        )
    }

    /// Server-level connection string, for creating databases
    pub fn connection_string_without_db(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}",
            self.username, self.password, self.host, self.port
        )
    }
}

/// Token and credential settings
#[derive(serde::Deserialize, Clone)]
pub struct AuthSettings {
    pub access_token_secret: String,
    #[serde(default = "default_access_token_expiry")]
    pub access_token_expiry: i64, // seconds (e.g., 900 for 15 minutes)
    pub refresh_token_secret: String,
    #[serde(default = "default_refresh_token_expiry")]
    pub refresh_token_expiry: i64, // seconds (e.g., 604800 for 7 days)
    #[serde(default = "default_issuer")]
    pub issuer: String,
    #[serde(default = "default_password_hash_cost")]
    pub password_hash_cost: u32,
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,
}

/// Upper bound for any token lifetime (365 days)
pub const MAX_TOKEN_LIFETIME_SECS: i64 = 365 * 24 * 60 * 60;

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_access_token_expiry() -> i64 {
    900
}

fn default_refresh_token_expiry() -> i64 {
    604_800
}

fn default_issuer() -> String {
    "tokenkeeper".to_string()
}

fn default_password_hash_cost() -> u32 {
    11
}

fn default_store_timeout_ms() -> u64 {
    2_000
}

impl AuthSettings {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    /// Reject settings that would weaken or break token handling
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.access_token_secret.trim().is_empty() {
            return Err(ConfigError::MissingRequired("auth.access_token_secret".into()));
        }
        if self.refresh_token_secret.trim().is_empty() {
            return Err(ConfigError::MissingRequired("auth.refresh_token_secret".into()));
        }
        if self.access_token_secret == self.refresh_token_secret {
            return Err(ConfigError::InvalidValue(
                "access and refresh token secrets must differ".into(),
            ));
        }
        if self.access_token_expiry <= 0 || self.refresh_token_expiry <= 0 {
            return Err(ConfigError::InvalidValue("token lifetimes must be positive".into()));
        }
        if self.refresh_token_expiry > MAX_TOKEN_LIFETIME_SECS {
            return Err(ConfigError::InvalidValue(format!(
                "refresh_token_expiry must be at most {} seconds",
                MAX_TOKEN_LIFETIME_SECS
            )));
        }
        if self.access_token_expiry >= self.refresh_token_expiry {
            return Err(ConfigError::InvalidValue(
                "access token lifetime must be shorter than refresh token lifetime".into(),
            ));
        }
        if !(4..=31).contains(&self.password_hash_cost) {
            return Err(ConfigError::InvalidValue(format!(
                "password_hash_cost must be within 4..=31, got {}",
                self.password_hash_cost
            )));
        }
        if self.store_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue("store_timeout_ms must be positive".into()));
        }
        Ok(())
    }
}

/// Load settings from `configuration.*` in the working directory, overridden by
/// `APP__SECTION__KEY` environment variables.
pub fn get_configuration() -> Result<Settings, ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("configuration").required(false))
        .add_source(config::Environment::with_prefix("APP").separator("__"))
        .build()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    let settings = settings
        .try_deserialize::<Settings>()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    settings.auth.validate()?;
    Ok(settings)
}
