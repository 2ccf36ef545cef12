//! Runtime configuration and service construction.
//!
//! Settings are read from the environment once at startup, validated, and
//! turned into the storage backend and mailer the API runs with.
//!
//! # Environment Variables
//!
//! - `STORAGE_MODE`: `in_memory` (default) | `postgres`
//! - `DATABASE_URL`: `PostgreSQL` connection URL (required when `STORAGE_MODE=postgres`)
//! - `JWT_SECRET_KEY`: token signing secret (required when `STORAGE_MODE=postgres`)
//! - `JWT_TTL_HOURS`: session token lifetime, default 24
//! - `FRONTEND_URL`: base URL for links in emails
//! - `MAIL_MODE`: `log` (default) | `http`
//! - `MAIL_API_URL`, `MAIL_API_TOKEN`: required when `MAIL_MODE=http`
//! - `MAIL_FROM`: sender address
//! - `COUNTER_RECONCILE_INTERVAL_SECS`: enables periodic counter repair when > 0
//!
//! # Example
//!
//! ```ignore
//! let settings = AppSettings::from_env()?;
//! let services = ServiceFactory::new(settings).create().await?;
//! ```

use std::env;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use thiserror::Error;

use super::in_memory::InMemoryDocumentStore;
use super::mailer::{HttpMailer, LogMailer, Mailer};
use super::postgres::PostgresDocumentStore;
use super::repository::Repository;
use super::security::{TokenIssuer, generate_code};

const DEFAULT_FRONTEND_URL: &str = "http://localhost:3000";
const DEFAULT_MAIL_FROM: &str = "no-reply@taskoodle.local";
const DEFAULT_JWT_TTL_HOURS: u32 = 24;
const MAIL_TIMEOUT: Duration = Duration::from_secs(10);

// =============================================================================
// Configuration Types
// =============================================================================

/// Storage backend for documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageMode {
    #[default]
    InMemory,
    Postgres,
}

impl FromStr for StorageMode {
    type Err = ConfigurationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "in_memory" | "inmemory" | "memory" => Ok(Self::InMemory),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            _ => Err(ConfigurationError::InvalidStorageMode(value.to_string())),
        }
    }
}

/// How outgoing email is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MailMode {
    /// Written to the log.
    #[default]
    Log,
    /// Posted to a mail API.
    Http,
}

impl FromStr for MailMode {
    type Err = ConfigurationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "log" => Ok(Self::Log),
            "http" => Ok(Self::Http),
            _ => Err(ConfigurationError::InvalidMailMode(value.to_string())),
        }
    }
}

/// Mail delivery settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailSettings {
    pub mode: MailMode,
    pub api_url: Option<String>,
    pub api_token: Option<String>,
    pub from: String,
}

impl Default for MailSettings {
    fn default() -> Self {
        Self {
            mode: MailMode::Log,
            api_url: None,
            api_token: None,
            from: DEFAULT_MAIL_FROM.to_string(),
        }
    }
}

/// Everything the service needs to start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppSettings {
    pub storage_mode: StorageMode,
    pub database_url: Option<String>,
    /// `None` means an ephemeral secret is generated at startup.
    pub jwt_secret: Option<String>,
    pub jwt_ttl_hours: u32,
    pub frontend_url: String,
    pub mail: MailSettings,
    /// Zero disables periodic counter reconciliation.
    pub reconcile_interval_secs: u64,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            storage_mode: StorageMode::default(),
            database_url: None,
            jwt_secret: None,
            jwt_ttl_hours: DEFAULT_JWT_TTL_HOURS,
            frontend_url: DEFAULT_FRONTEND_URL.to_string(),
            mail: MailSettings::default(),
            reconcile_interval_secs: 0,
        }
    }
}

/// Reads a variable, treating empty or whitespace-only values as unset.
fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigurationError> {
    non_empty_var(name).map_or(Ok(default), |value| {
        value
            .parse()
            .map_err(|_| ConfigurationError::InvalidNumber { variable: name, value })
    })
}

impl AppSettings {
    /// Creates a new settings builder.
    pub fn builder() -> AppSettingsBuilder {
        AppSettingsBuilder::default()
    }

    /// Creates settings from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if a value is malformed or a variable
    /// required by the selected modes is missing.
    pub fn from_env() -> Result<Self, ConfigurationError> {
        let storage_mode = match env::var("STORAGE_MODE") {
            Ok(value) => value.parse()?,
            Err(env::VarError::NotPresent) => StorageMode::default(),
            Err(env::VarError::NotUnicode(_)) => {
                return Err(ConfigurationError::InvalidStorageMode(
                    "<non-UTF-8 value>".to_string(),
                ));
            }
        };

        let mail_mode = match env::var("MAIL_MODE") {
            Ok(value) => value.parse()?,
            Err(env::VarError::NotPresent) => MailMode::default(),
            Err(env::VarError::NotUnicode(_)) => {
                return Err(ConfigurationError::InvalidMailMode(
                    "<non-UTF-8 value>".to_string(),
                ));
            }
        };

        let settings = Self {
            storage_mode,
            database_url: non_empty_var("DATABASE_URL"),
            jwt_secret: non_empty_var("JWT_SECRET_KEY"),
            jwt_ttl_hours: parse_var("JWT_TTL_HOURS", DEFAULT_JWT_TTL_HOURS)?,
            frontend_url: non_empty_var("FRONTEND_URL")
                .unwrap_or_else(|| DEFAULT_FRONTEND_URL.to_string()),
            mail: MailSettings {
                mode: mail_mode,
                api_url: non_empty_var("MAIL_API_URL"),
                api_token: non_empty_var("MAIL_API_TOKEN"),
                from: non_empty_var("MAIL_FROM").unwrap_or_else(|| DEFAULT_MAIL_FROM.to_string()),
            },
            reconcile_interval_secs: parse_var("COUNTER_RECONCILE_INTERVAL_SECS", 0)?,
        };

        settings.validate()?;
        Ok(settings)
    }

    /// Validates the settings.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if a value required by the selected modes
    /// is missing.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.storage_mode == StorageMode::Postgres {
            if self.database_url.is_none() {
                return Err(ConfigurationError::MissingDatabaseUrl);
            }
            if self.jwt_secret.is_none() {
                return Err(ConfigurationError::MissingJwtSecret);
            }
        }

        if self.mail.mode == MailMode::Http
            && (self.mail.api_url.is_none() || self.mail.api_token.is_none())
        {
            return Err(ConfigurationError::MissingMailApi);
        }

        if self.jwt_ttl_hours == 0 {
            return Err(ConfigurationError::InvalidNumber {
                variable: "JWT_TTL_HOURS",
                value: "0".to_string(),
            });
        }

        Ok(())
    }

    /// Interval of the counter reconciliation task, if enabled.
    #[must_use]
    pub const fn reconcile_interval(&self) -> Option<Duration> {
        if self.reconcile_interval_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.reconcile_interval_secs))
        }
    }
}

/// Builder for `AppSettings`.
///
/// # Example
///
/// ```ignore
/// let settings = AppSettings::builder()
///     .storage_mode(StorageMode::Postgres)
///     .database_url("postgres://localhost/taskoodle")
///     .jwt_secret("change-me")
///     .build()?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct AppSettingsBuilder {
    settings: AppSettings,
}

impl AppSettingsBuilder {
    #[must_use]
    pub const fn storage_mode(mut self, mode: StorageMode) -> Self {
        self.settings.storage_mode = mode;
        self
    }

    #[must_use]
    pub fn database_url(mut self, url: impl Into<String>) -> Self {
        self.settings.database_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn jwt_secret(mut self, secret: impl Into<String>) -> Self {
        self.settings.jwt_secret = Some(secret.into());
        self
    }

    #[must_use]
    pub const fn jwt_ttl_hours(mut self, hours: u32) -> Self {
        self.settings.jwt_ttl_hours = hours;
        self
    }

    #[must_use]
    pub fn frontend_url(mut self, url: impl Into<String>) -> Self {
        self.settings.frontend_url = url.into();
        self
    }

    #[must_use]
    pub fn mail(mut self, mail: MailSettings) -> Self {
        self.settings.mail = mail;
        self
    }

    #[must_use]
    pub const fn reconcile_interval_secs(mut self, seconds: u64) -> Self {
        self.settings.reconcile_interval_secs = seconds;
        self
    }

    /// Builds the settings.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if the settings are invalid.
    pub fn build(self) -> Result<AppSettings, ConfigurationError> {
        self.settings.validate()?;
        Ok(self.settings)
    }
}

// =============================================================================
// Error Types
// =============================================================================

/// Errors found while reading the configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Invalid storage mode: '{0}'. Expected 'in_memory' or 'postgres'")]
    InvalidStorageMode(String),

    #[error("Invalid mail mode: '{0}'. Expected 'log' or 'http'")]
    InvalidMailMode(String),

    #[error("Invalid value for {variable}: '{value}'")]
    InvalidNumber {
        variable: &'static str,
        value: String,
    },

    #[error("DATABASE_URL environment variable is required when STORAGE_MODE=postgres")]
    MissingDatabaseUrl,

    #[error("JWT_SECRET_KEY environment variable is required when STORAGE_MODE=postgres")]
    MissingJwtSecret,

    #[error("MAIL_API_URL and MAIL_API_TOKEN are required when MAIL_MODE=http")]
    MissingMailApi,
}

/// Errors that can occur while building the services.
#[derive(Debug, Error)]
pub enum FactoryError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Database connection error: {0}")]
    DatabaseConnection(String),

    #[error("Database migration error: {0}")]
    Migration(String),
}

// =============================================================================
// Service Factory
// =============================================================================

/// The services built from [`AppSettings`].
#[derive(Clone)]
pub struct Services {
    pub repository: Repository,
    pub mailer: Arc<dyn Mailer>,
    pub tokens: TokenIssuer,
}

impl std::fmt::Debug for Services {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Services")
            .field("repository", &self.repository)
            .field("mailer", &"Arc<dyn Mailer>")
            .field("tokens", &self.tokens)
            .finish()
    }
}

/// Builds [`Services`] for the configured backends.
#[derive(Debug, Clone)]
pub struct ServiceFactory {
    settings: AppSettings,
}

impl ServiceFactory {
    #[must_use]
    pub const fn new(settings: AppSettings) -> Self {
        Self { settings }
    }

    /// Creates a factory from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `FactoryError::Configuration` if environment configuration is invalid.
    pub fn from_env() -> Result<Self, FactoryError> {
        Ok(Self::new(AppSettings::from_env()?))
    }

    #[must_use]
    pub const fn settings(&self) -> &AppSettings {
        &self.settings
    }

    /// Connects the storage backend and builds the services.
    ///
    /// # Errors
    ///
    /// Returns `FactoryError` if the database cannot be reached or migrated.
    pub async fn create(&self) -> Result<Services, FactoryError> {
        let repository = match self.settings.storage_mode {
            StorageMode::InMemory => Repository::new(Arc::new(InMemoryDocumentStore::new())),
            StorageMode::Postgres => {
                let store = PostgresDocumentStore::new(self.create_postgres_pool().await?);
                store
                    .migrate()
                    .await
                    .map_err(|error| FactoryError::Migration(error.to_string()))?;
                Repository::new(Arc::new(store))
            }
        };

        Ok(Services {
            repository,
            mailer: self.create_mailer()?,
            tokens: self.create_token_issuer(),
        })
    }

    async fn create_postgres_pool(&self) -> Result<PgPool, FactoryError> {
        let database_url = self
            .settings
            .database_url
            .as_ref()
            .ok_or(ConfigurationError::MissingDatabaseUrl)?;

        PgPool::connect(database_url)
            .await
            .map_err(|error| FactoryError::DatabaseConnection(error.to_string()))
    }

    fn create_mailer(&self) -> Result<Arc<dyn Mailer>, FactoryError> {
        let mail = &self.settings.mail;
        match mail.mode {
            MailMode::Log => Ok(Arc::new(LogMailer)),
            MailMode::Http => {
                let (Some(url), Some(token)) = (&mail.api_url, &mail.api_token) else {
                    return Err(ConfigurationError::MissingMailApi.into());
                };
                Ok(Arc::new(HttpMailer::new(
                    url.clone(),
                    token.clone(),
                    mail.from.clone(),
                    MAIL_TIMEOUT,
                )))
            }
        }
    }

    /// Signs tokens with the configured secret, or a random one that only
    /// lives as long as the process.
    pub fn create_token_issuer(&self) -> TokenIssuer {
        let ttl = chrono::Duration::hours(i64::from(self.settings.jwt_ttl_hours));
        if let Some(secret) = &self.settings.jwt_secret {
            TokenIssuer::new(secret, ttl)
        } else {
            tracing::warn!("JWT_SECRET_KEY is not set; sessions will not survive a restart");
            TokenIssuer::new(&generate_code(), ttl)
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
