//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `MERCATO_BACKEND_URL` - Base URL of the record backend
//! - `MERCATO_BASE_URL` - Public URL for the storefront
//!
//! ## Optional
//! - `MERCATO_HOST` - Bind address (default: 127.0.0.1)
//! - `MERCATO_PORT` - Listen port (default: 3000)
//! - `MERCATO_BACKEND_TIMEOUT_SECS` - Backend request timeout (default: 10)
//! - `MERCATO_AUTH_RATE_LIMIT` - Auth requests per window (default: 10)
//! - `MERCATO_API_RATE_LIMIT` - API requests per window (default: 100)
//! - `MERCATO_RATE_WINDOW_SECS` - Rate limit window (default: 60)
//! - `MERCATO_SESSION_IDLE_SECS` - Session idle expiry (default: 7 days)
//! - `MERCATO_LOG_FORMAT` - `text` or `json` (default: text)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use url::Url;

const DEFAULT_SESSION_IDLE_SECS: u64 = 7 * 24 * 60 * 60;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Storefront application configuration.
#[derive(Debug, Clone)]
pub struct MercatoConfig {
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL for the storefront
    pub base_url: Url,
    /// Record backend connection settings
    pub backend: BackendConfig,
    /// Request budgets per client IP
    pub rate_limits: RateLimitConfig,
    /// Idle time after which a session and its stores expire
    pub session_idle: Duration,
    /// Output format for log lines
    pub log_format: LogFormat,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
}

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line, for log collectors.
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("expected 'text' or 'json', got '{other}'")),
        }
    }
}

/// Record backend connection settings.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub url: Url,
    pub timeout: Duration,
}

/// Fixed-window rate limit settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Requests per window for login and logout
    pub auth: u32,
    /// Requests per window for the rest of the API
    pub api: u32,
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            auth: 10,
            api: 100,
            window: Duration::from_secs(60),
        }
    }
}

impl MercatoConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let host = parse_env_or_default("MERCATO_HOST", IpAddr::from([127, 0, 0, 1]))?;
        let port = parse_env_or_default("MERCATO_PORT", 3000_u16)?;
        let base_url = get_required_url("MERCATO_BASE_URL")?;
        let backend = BackendConfig::from_env()?;
        let rate_limits = RateLimitConfig::from_env()?;
        let session_idle = Duration::from_secs(positive_env_or_default(
            "MERCATO_SESSION_IDLE_SECS",
            DEFAULT_SESSION_IDLE_SECS,
        )?);
        let log_format = parse_env_or_default("MERCATO_LOG_FORMAT", LogFormat::default())?;

        Ok(Self {
            host,
            port,
            base_url,
            backend,
            rate_limits,
            session_idle,
            log_format,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Whether the storefront is served over HTTPS (secure cookies).
    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.base_url.scheme() == "https"
    }
}

impl BackendConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            url: get_required_url("MERCATO_BACKEND_URL")?,
            timeout: Duration::from_secs(positive_env_or_default(
                "MERCATO_BACKEND_TIMEOUT_SECS",
                10,
            )?),
        })
    }
}

impl RateLimitConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            auth: positive_env_or_default("MERCATO_AUTH_RATE_LIMIT", defaults.auth)?,
            api: positive_env_or_default("MERCATO_API_RATE_LIMIT", defaults.api)?,
            window: Duration::from_secs(positive_env_or_default(
                "MERCATO_RATE_WINDOW_SECS",
                defaults.window.as_secs(),
            )?),
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable. Empty values count as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get a required environment variable as an absolute http(s) URL.
fn get_required_url(key: &str) -> Result<Url, ConfigError> {
    parse_url(key, &get_required_env(key)?)
}

fn parse_url(key: &str, value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("unsupported scheme '{}'", url.scheme()),
        ));
    }
    Ok(url)
}

/// Parse an environment variable, falling back to `default` when unset.
fn parse_env_or_default<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_optional_env(key).map_or(Ok(default), |value| parse_value(key, &value))
}

fn parse_value<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Like [`parse_env_or_default`], rejecting zero.
fn positive_env_or_default<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr + Default + PartialEq,
    T::Err: std::fmt::Display,
{
    let value = parse_env_or_default(key, default)?;
    if value == T::default() {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            "must be greater than zero".to_string(),
        ));
    }
    Ok(value)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn config() -> MercatoConfig {
        MercatoConfig {
            host: "127.0.0.1".parse().unwrap(),
            port: 3000,
            base_url: Url::parse("http://localhost:3000").unwrap(),
            backend: BackendConfig {
                url: Url::parse("http://127.0.0.1:8090").unwrap(),
                timeout: Duration::from_secs(10),
            },
            rate_limits: RateLimitConfig::default(),
            session_idle: Duration::from_secs(DEFAULT_SESSION_IDLE_SECS),
            log_format: LogFormat::Text,
            sentry_dsn: None,
            sentry_environment: None,
        }
    }

    #[test]
    fn test_socket_addr() {
        let addr = config().socket_addr();
        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_eq!(addr.port(), 3000);
    }

    #[test]
    fn test_is_secure() {
        let mut config = config();
        assert!(!config.is_secure());
        config.base_url = Url::parse("https://shop.example.com").unwrap();
        assert!(config.is_secure());
    }

    #[test]
    fn test_parse_url_rejects_other_schemes() {
        assert!(parse_url("X", "http://localhost:8090").is_ok());
        assert!(matches!(
            parse_url("X", "ftp://localhost"),
            Err(ConfigError::InvalidEnvVar(_, _))
        ));
        assert!(matches!(
            parse_url("X", "not a url"),
            Err(ConfigError::InvalidEnvVar(_, _))
        ));
    }

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value::<u16>("PORT", " 8080 ").unwrap(), 8080);
        assert!(parse_value::<u16>("PORT", "70000").is_err());
        assert!(parse_value::<IpAddr>("HOST", "localhost").is_err());
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!(parse_value::<LogFormat>("FMT", "json").unwrap(), LogFormat::Json);
        assert_eq!(parse_value::<LogFormat>("FMT", " TEXT ").unwrap(), LogFormat::Text);
        assert!(matches!(
            parse_value::<LogFormat>("FMT", "yaml"),
            Err(ConfigError::InvalidEnvVar(_, _))
        ));
        assert_eq!(
            parse_env_or_default("MERCATO_TEST_UNSET_LOG_FORMAT", LogFormat::default()).unwrap(),
            LogFormat::Text
        );
    }

    #[test]
    fn test_missing_required_env() {
        let err = get_required_env("MERCATO_TEST_DEFINITELY_UNSET").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Missing environment variable: MERCATO_TEST_DEFINITELY_UNSET"
        );
    }

    #[test]
    fn test_defaults_when_unset() {
        assert_eq!(
            positive_env_or_default("MERCATO_TEST_UNSET_LIMIT", 10_u32).unwrap(),
            10
        );
        assert_eq!(RateLimitConfig::default().api, 100);
    }
}
