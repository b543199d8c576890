//! Application configuration loaded from environment variables.
//!
//! This module provides fail-fast configuration loading with validation.
//! Required variables must be present and valid, or the application will
//! exit with a clear error message.

use std::env;
use std::time::Duration;

use brokkr_sso::SsoOptions;
use brokkr_store::{StoreConfig, StorageEngine, KEY_LENGTH};
use thiserror::Error;

/// Application environment mode.
///
/// Controls security enforcement behavior:
/// - `Development`: insecure settings are allowed with WARN-level logging.
/// - `Production`: insecure settings cause the application to refuse startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Production,
}

impl AppEnvironment {
    /// Parse from the `APP_ENV` environment variable value.
    /// Defaults to `Development` if unset or unrecognized.
    pub fn from_env_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "development" | "dev" => Self::Development,
            other => {
                tracing::warn!(
                    value = other,
                    "Unrecognized APP_ENV value, defaulting to Development"
                );
                Self::Development
            }
        }
    }

    /// Returns true if this is production mode.
    #[must_use]
    pub fn is_production(&self) -> bool {
        *self == Self::Production
    }
}

impl std::fmt::Display for AppEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Production => write!(f, "production"),
        }
    }
}

/// Configuration errors that can occur during environment loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid value for {var}: {message}")]
    InvalidValue { var: String, message: String },

    #[error("Failed to parse port: {0}")]
    InvalidPort(#[from] std::num::ParseIntError),
}

/// Application configuration loaded from environment variables.
#[derive(Clone)]
pub struct Config {
    /// Application environment (development or production).
    pub app_env: AppEnvironment,

    /// Server bind address.
    pub host: String,

    /// Server listen port.
    pub port: u16,

    /// Public base URL used to build ACS and OIDC callback URLs
    /// (e.g., "https://sso.example.com").
    pub external_url: String,

    /// Tracing filter directive (e.g., "info,brokkr=debug").
    pub rust_log: String,

    /// Allowed CORS origins (comma-separated URLs or "*" for development).
    pub cors_origins: Vec<String>,

    /// Storage backend to run on.
    pub db_engine: StorageEngine,

    /// PostgreSQL connection string (required for the sql engine).
    pub database_url: Option<String>,

    /// Redis connection string (required for the redis engine).
    pub redis_url: Option<String>,

    /// At-rest encryption key (32 bytes, hex-encoded). Absent means records
    /// are stored as plaintext JSON.
    pub db_encryption_key: Option<[u8; KEY_LENGTH]>,

    /// How often the relational reaper purges expired records.
    pub db_cleanup_interval: Duration,

    /// Audience URI stamped into outgoing SAML requests and checked on
    /// incoming assertions.
    pub saml_audience: String,

    /// Login session lifetime in seconds.
    pub session_ttl: u64,

    /// Authorization code lifetime in seconds.
    pub code_ttl: u64,

    /// Access token lifetime in seconds.
    pub token_ttl: u64,

    /// Keys accepted by the connection admin API. Empty means every admin
    /// request is rejected.
    pub admin_api_keys: Vec<String>,

    /// Whether unsolicited (IdP-initiated) SAML assertions are accepted.
    pub idp_initiated_enabled: bool,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("app_env", &self.app_env)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("external_url", &self.external_url)
            .field("cors_origins", &self.cors_origins)
            .field("db_engine", &self.db_engine)
            .field("database_url", &self.database_url.as_ref().map(|_| "[redacted]"))
            .field("redis_url", &self.redis_url.as_ref().map(|_| "[redacted]"))
            .field(
                "db_encryption_key",
                &self.db_encryption_key.map(|_| "[redacted]"),
            )
            .field("saml_audience", &self.saml_audience)
            .field("admin_api_keys", &format!("[{} key(s)]", self.admin_api_keys.len()))
            .field("idp_initiated_enabled", &self.idp_initiated_enabled)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Required variables are missing
    /// - Values are invalid (e.g., invalid port number)
    ///
    /// # Required Variables
    ///
    /// - `BROKKR_EXTERNAL_URL` - public base URL for ACS/callback endpoints
    /// - `DATABASE_URL` - when `BROKKR_DB_ENGINE=sql`
    /// - `REDIS_URL` - when `BROKKR_DB_ENGINE=redis`
    ///
    /// # Optional Variables
    ///
    /// - `RUST_LOG` - log filter (default: "info,brokkr=debug")
    /// - `BROKKR_CORS_ORIGINS` - comma-separated origins (default: "*")
    /// - `BROKKR_HOST` - bind address (default: "0.0.0.0")
    /// - `BROKKR_PORT` - listen port (default: 5225)
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (development only)
        let _ = dotenvy::dotenv();

        let app_env = AppEnvironment::from_env_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("BROKKR_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let port: u16 = env::var("BROKKR_PORT")
            .unwrap_or_else(|_| "5225".to_string())
            .parse()?;

        if port == 0 {
            return Err(ConfigError::InvalidValue {
                var: "BROKKR_PORT".to_string(),
                message: "Port must be between 1 and 65535".to_string(),
            });
        }

        let external_url = env::var("BROKKR_EXTERNAL_URL")
            .map_err(|_| ConfigError::MissingVar("BROKKR_EXTERNAL_URL".to_string()))?;

        if !external_url.starts_with("http://") && !external_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue {
                var: "BROKKR_EXTERNAL_URL".to_string(),
                message: "Must be an absolute http:// or https:// URL".to_string(),
            });
        }

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info,brokkr=debug".to_string());

        let cors_origins = env::var("BROKKR_CORS_ORIGINS")
            .map(|s| s.split(',').map(|o| o.trim().to_string()).collect())
            .unwrap_or_else(|_| vec!["*".to_string()]);

        validate_cors_origins(&cors_origins, &app_env)?;

        let db_engine: StorageEngine = env::var("BROKKR_DB_ENGINE")
            .unwrap_or_else(|_| "memory".to_string())
            .parse()
            .map_err(|e| ConfigError::InvalidValue {
                var: "BROKKR_DB_ENGINE".to_string(),
                message: format!("{e}"),
            })?;

        let database_url = env::var("DATABASE_URL").ok();
        let redis_url = env::var("REDIS_URL").ok();

        // The engine's URL is required up front so a typo fails at startup,
        // not at first query.
        match db_engine {
            StorageEngine::Sql if database_url.is_none() => {
                return Err(ConfigError::MissingVar("DATABASE_URL".to_string()));
            }
            StorageEngine::Redis if redis_url.is_none() => {
                return Err(ConfigError::MissingVar("REDIS_URL".to_string()));
            }
            _ => {}
        }

        let db_encryption_key = match env::var("BROKKR_DB_ENCRYPTION_KEY") {
            Ok(hex_str) if !hex_str.is_empty() => {
                Some(parse_hex_encryption_key("BROKKR_DB_ENCRYPTION_KEY", &hex_str)?)
            }
            _ => None,
        };

        let db_cleanup_interval = Duration::from_secs(parse_secs(
            "BROKKR_DB_CLEANUP_INTERVAL_SECS",
            5,
        )?);

        let saml_audience = env::var("BROKKR_SAML_AUDIENCE")
            .unwrap_or_else(|_| "https://saml.brokkr.dev".to_string());

        let session_ttl = parse_nonzero_secs("BROKKR_SESSION_TTL_SECS", 300)?;
        let code_ttl = parse_nonzero_secs("BROKKR_CODE_TTL_SECS", 300)?;
        let token_ttl = parse_nonzero_secs("BROKKR_TOKEN_TTL_SECS", 300)?;

        let admin_api_keys = env::var("BROKKR_ADMIN_API_KEYS")
            .map(|s| {
                s.split(',')
                    .map(str::trim)
                    .filter(|k| !k.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        let idp_initiated_enabled = env::var("BROKKR_IDP_INITIATED_ENABLED")
            .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Ok(Config {
            app_env,
            host,
            port,
            external_url,
            rust_log,
            cors_origins,
            db_engine,
            database_url,
            redis_url,
            db_encryption_key,
            db_cleanup_interval,
            saml_audience,
            session_ttl,
            code_ttl,
            token_ttl,
            admin_api_keys,
            idp_initiated_enabled,
        })
    }

    /// Returns the bind address as "host:port".
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Storage backend selection for [`brokkr_store::Database::connect`].
    #[must_use]
    pub fn store_config(&self) -> StoreConfig {
        let url = match self.db_engine {
            StorageEngine::Memory => None,
            StorageEngine::Sql => self.database_url.clone(),
            StorageEngine::Redis => self.redis_url.clone(),
        };
        StoreConfig {
            engine: self.db_engine,
            url,
            encryption_key: self.db_encryption_key,
            cleanup_interval: self.db_cleanup_interval,
        }
    }

    /// Broker options derived from this configuration.
    #[must_use]
    pub fn sso_options(&self) -> SsoOptions {
        SsoOptions {
            external_url: self.external_url.clone(),
            saml_audience: self.saml_audience.clone(),
            session_ttl: self.session_ttl,
            code_ttl: self.code_ttl,
            token_ttl: self.token_ttl,
            idp_initiated_enabled: self.idp_initiated_enabled,
            admin_api_keys: self.admin_api_keys.clone(),
        }
    }

    /// Validate security-sensitive settings against the environment mode.
    ///
    /// Returns `Ok(warnings)` when startup may proceed (development mode
    /// tolerates insecure settings), or `Err(errors)` when production mode
    /// must refuse to start.
    pub fn validate_security(&self) -> Result<Vec<String>, Vec<String>> {
        let mut issues = Vec::new();

        if self.db_encryption_key.is_none() {
            issues.push(
                "BROKKR_DB_ENCRYPTION_KEY is not set; connections and sessions are stored as \
                 plaintext"
                    .to_string(),
            );
        }

        if self.admin_api_keys.is_empty() {
            issues.push(
                "BROKKR_ADMIN_API_KEYS is not set; every admin API request will be rejected"
                    .to_string(),
            );
        }

        if self.external_url.starts_with("http://") {
            issues.push(
                "BROKKR_EXTERNAL_URL uses http://; IdPs will post assertions over cleartext"
                    .to_string(),
            );
        }

        if self.cors_origins.iter().any(|o| o == "*") {
            issues.push(
                "BROKKR_CORS_ORIGINS contains wildcard '*' which is not allowed in production"
                    .to_string(),
            );
        }

        if issues.is_empty() {
            return Ok(Vec::new());
        }

        if self.app_env.is_production() {
            Err(issues)
        } else {
            Ok(issues)
        }
    }
}

/// Validate CORS origin URL formats at startup.
///
/// In production mode, invalid URLs cause a startup error.
/// In development mode, invalid URLs produce a warning.
/// The wildcard "*" origin is allowed through (but rejected separately by
/// `validate_security`).
fn validate_cors_origins(origins: &[String], app_env: &AppEnvironment) -> Result<(), ConfigError> {
    for origin in origins {
        if origin == "*" {
            continue;
        }

        let is_valid = origin.starts_with("http://") || origin.starts_with("https://");
        if !is_valid {
            let msg = format!(
                "CORS origin '{origin}' is not a valid URL (must start with http:// or https://)"
            );
            if app_env.is_production() {
                return Err(ConfigError::InvalidValue {
                    var: "BROKKR_CORS_ORIGINS".to_string(),
                    message: msg,
                });
            }
            tracing::warn!(target: "security", origin = %origin, "{}", msg);
        }

        if is_valid && origin.ends_with('/') {
            tracing::warn!(
                target: "security",
                origin = %origin,
                "CORS origin has a trailing slash; origins should not end with '/'"
            );
        }
    }
    Ok(())
}

/// Parse hex-encoded 32-byte encryption key.
fn parse_hex_encryption_key(var_name: &str, hex_str: &str) -> Result<[u8; KEY_LENGTH], ConfigError> {
    let bytes = hex::decode(hex_str).map_err(|_| ConfigError::InvalidValue {
        var: var_name.to_string(),
        message: "Must be 64 hex characters (32 bytes)".to_string(),
    })?;

    if bytes.len() != KEY_LENGTH {
        return Err(ConfigError::InvalidValue {
            var: var_name.to_string(),
            message: format!("Expected {KEY_LENGTH} bytes, got {}", bytes.len()),
        });
    }

    let mut key = [0u8; KEY_LENGTH];
    key.copy_from_slice(&bytes);
    Ok(key)
}

/// Parse a seconds value with a default, accepting zero.
fn parse_secs(var_name: &str, default: u64) -> Result<u64, ConfigError> {
    match env::var(var_name) {
        Ok(s) => s.parse().map_err(|_| ConfigError::InvalidValue {
            var: var_name.to_string(),
            message: "Must be a non-negative number of seconds".to_string(),
        }),
        Err(_) => Ok(default),
    }
}

/// Parse a seconds value with a default, rejecting zero.
///
/// TTL zero means "never expires" at the storage layer, which would turn
/// sessions, codes and tokens immortal.
fn parse_nonzero_secs(var_name: &str, default: u64) -> Result<u64, ConfigError> {
    let value = parse_secs(var_name, default)?;
    if value == 0 {
        return Err(ConfigError::InvalidValue {
            var: var_name.to_string(),
            message: "Must be greater than zero".to_string(),
        });
    }
    Ok(value)
}
