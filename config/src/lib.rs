//! # Configuration Management for blogcore
//!
//! This crate provides the configuration snapshot consumed once at process
//! start: database connection settings, connection pool tuning and
//! pagination limits.
//!
//! ## Quick Start
//!
//! ### Environment Configuration
//! ```text
//! DB_HOST=localhost
//! DB_PORT=5432
//! DB_NAME=blog
//! DB_USER=postgres
//! DB_PASSWORD=password
//! DB_MAX_OPEN_CONNS=25
//! DB_CONN_MAX_LIFETIME=30m
//! PAGINATION_MAX_LIMIT=100
//! ```
//!
//! ### TOML File Configuration
//! ```toml
//! [database]
//! host = "localhost"
//! port = 5432
//! database = "blog"
//! username = "postgres"
//! password = "password"
//! ssl_mode = "disable"
//!
//! [pool]
//! max_open_connections = 25
//! max_idle_connections = 10
//! conn_max_lifetime_seconds = 1800
//! conn_max_idle_time_seconds = 900
//! connect_timeout_seconds = 10
//! query_timeout_seconds = 30
//!
//! [pagination]
//! default_limit = 10
//! max_limit = 100
//! ```
//!
//! Load configuration:
//! ```rust,no_run
//! use config::AppConfig;
//!
//! // From BLOGCORE_CONFIG if set, otherwise from the environment
//! let config = AppConfig::load()?;
//!
//! // Or load from a custom path
//! let config = AppConfig::from_file("config/production.toml")?;
//! # Ok::<(), config::ConfigError>(())
//! ```

use serde::{Deserialize, Serialize};
use std::{env, path::Path};
use thiserror::Error;

const CONFIG_PATH_VAR: &str = "BLOGCORE_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Environment variable error: {0}")]
    Env(#[from] env::VarError),
    #[error("Dotenvy error: {0}")]
    Dotenvy(#[from] dotenvy::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub pool: PoolSettings,
    #[serde(default)]
    pub pagination: PaginationSettings,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    pub ssl_mode: String,
}

/// Connection pool tuning, durations in whole seconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    pub max_open_connections: u32,
    pub max_idle_connections: u32,
    pub conn_max_lifetime_seconds: u64,
    pub conn_max_idle_time_seconds: u64,
    pub connect_timeout_seconds: u64,
    pub query_timeout_seconds: u64,
}

/// Pagination limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginationSettings {
    pub default_limit: u32,
    pub max_limit: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            database: "blog".to_string(),
            username: "postgres".to_string(),
            password: String::new(),
            ssl_mode: "disable".to_string(),
        }
    }
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_open_connections: 25,
            max_idle_connections: 10,
            conn_max_lifetime_seconds: 30 * 60,
            conn_max_idle_time_seconds: 15 * 60,
            connect_timeout_seconds: 10,
            query_timeout_seconds: 30,
        }
    }
}

impl Default for PaginationSettings {
    fn default() -> Self {
        Self {
            default_limit: 10,
            max_limit: 100,
        }
    }
}

impl AppConfig {
    /// Load configuration from the TOML file named by `BLOGCORE_CONFIG`,
    /// or from environment variables when it is not set
    pub fn load() -> Result<Self, ConfigError> {
        // A missing .env file is normal in production
        match dotenvy::dotenv() {
            Ok(_) => {}
            Err(err) if err.not_found() => {}
            Err(err) => return Err(err.into()),
        }

        if let Ok(config_path) = env::var(CONFIG_PATH_VAR) {
            Self::from_file(&config_path)
        } else {
            Self::from_env()
        }
    }

    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Build configuration from process environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup, falling back to
    /// defaults for every missing key
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let text = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let database = DatabaseConfig {
            host: text("DB_HOST", &defaults.database.host),
            port: parse_number(&lookup, "DB_PORT", defaults.database.port)?,
            database: text("DB_NAME", &defaults.database.database),
            username: text("DB_USER", &defaults.database.username),
            password: text("DB_PASSWORD", &defaults.database.password),
            ssl_mode: text("DB_SSLMODE", &defaults.database.ssl_mode),
        };

        let pool = PoolSettings {
            max_open_connections: parse_number(
                &lookup,
                "DB_MAX_OPEN_CONNS",
                defaults.pool.max_open_connections,
            )?,
            max_idle_connections: parse_number(
                &lookup,
                "DB_MAX_IDLE_CONNS",
                defaults.pool.max_idle_connections,
            )?,
            conn_max_lifetime_seconds: parse_seconds(
                &lookup,
                "DB_CONN_MAX_LIFETIME",
                defaults.pool.conn_max_lifetime_seconds,
            )?,
            conn_max_idle_time_seconds: parse_seconds(
                &lookup,
                "DB_CONN_MAX_IDLE_TIME",
                defaults.pool.conn_max_idle_time_seconds,
            )?,
            connect_timeout_seconds: parse_seconds(
                &lookup,
                "DB_CONNECT_TIMEOUT",
                defaults.pool.connect_timeout_seconds,
            )?,
            query_timeout_seconds: parse_seconds(
                &lookup,
                "DB_QUERY_TIMEOUT",
                defaults.pool.query_timeout_seconds,
            )?,
        };

        let pagination = PaginationSettings {
            default_limit: parse_number(
                &lookup,
                "PAGINATION_DEFAULT_LIMIT",
                defaults.pagination.default_limit,
            )?,
            max_limit: parse_number(
                &lookup,
                "PAGINATION_MAX_LIMIT",
                defaults.pagination.max_limit,
            )?,
        };

        let config = Self {
            database,
            pool,
            pagination,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Database validations
        if self.database.host.is_empty() {
            return Err(ConfigError::Invalid(
                "Database host cannot be empty".to_string(),
            ));
        }
        if self.database.port == 0 {
            return Err(ConfigError::Invalid(
                "Database port cannot be zero".to_string(),
            ));
        }
        if self.database.database.is_empty() {
            return Err(ConfigError::Invalid(
                "Database name cannot be empty".to_string(),
            ));
        }
        if self.database.username.is_empty() {
            return Err(ConfigError::Invalid(
                "Database username cannot be empty".to_string(),
            ));
        }

        // Pool validations
        if self.pool.max_open_connections == 0 {
            return Err(ConfigError::Invalid(
                "Pool max_open_connections must be greater than 0".to_string(),
            ));
        }
        if self.pool.conn_max_lifetime_seconds == 0 {
            return Err(ConfigError::Invalid(
                "Pool conn_max_lifetime must be greater than 0".to_string(),
            ));
        }
        if self.pool.conn_max_idle_time_seconds == 0 {
            return Err(ConfigError::Invalid(
                "Pool conn_max_idle_time must be greater than 0".to_string(),
            ));
        }
        if self.pool.connect_timeout_seconds == 0 {
            return Err(ConfigError::Invalid(
                "Pool connect_timeout must be greater than 0".to_string(),
            ));
        }
        if self.pool.query_timeout_seconds == 0 {
            return Err(ConfigError::Invalid(
                "Pool query_timeout must be greater than 0".to_string(),
            ));
        }

        // Pagination validations
        if self.pagination.default_limit == 0 {
            return Err(ConfigError::Invalid(
                "Pagination default_limit must be greater than 0".to_string(),
            ));
        }
        if self.pagination.max_limit < self.pagination.default_limit {
            return Err(ConfigError::Invalid(
                "Pagination max_limit cannot be less than default_limit".to_string(),
            ));
        }

        Ok(())
    }
}

impl DatabaseConfig {
    /// Create a new database configuration
    pub fn new(
        host: String,
        port: u16,
        database: String,
        username: String,
        password: String,
        ssl_mode: String,
    ) -> Self {
        Self {
            host,
            port,
            database,
            username,
            password,
            ssl_mode,
        }
    }

    /// Build connection string for display and tooling
    ///
    /// Values are not percent-encoded; connect with discrete options instead.
    pub fn connection_string(&self) -> String {
        format!(
            "postgresql://{}:{}@{}:{}/{}?sslmode={}",
            self.username, self.password, self.host, self.port, self.database, self.ssl_mode
        )
    }
}

impl PaginationSettings {
    /// Create new pagination limits
    pub fn new(default_limit: u32, max_limit: u32) -> Self {
        Self {
            default_limit,
            max_limit,
        }
    }
}

fn parse_number<T, F>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("{} must be a number, got '{}'", key, raw))),
        None => Ok(default),
    }
}

/// Parse a duration given as plain seconds or with an `s`, `m` or `h` suffix
fn parse_seconds<F>(lookup: &F, key: &str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(default);
    };
    let value = raw.trim();
    let invalid = || ConfigError::Invalid(format!("{} must be a duration like 30s, 15m or 1h, got '{}'", key, raw));

    let (digits, multiplier) = match value.char_indices().last() {
        Some((idx, 's')) => (&value[..idx], 1),
        Some((idx, 'm')) => (&value[..idx], 60),
        Some((idx, 'h')) => (&value[..idx], 60 * 60),
        Some(_) => (value, 1),
        None => return Err(invalid()),
    };

    digits
        .parse::<u64>()
        .ok()
        .and_then(|n| n.checked_mul(multiplier))
        .ok_or_else(invalid)
}
