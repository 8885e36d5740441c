//! Type-Safe Configuration with Validation
//!
//! Provides type-safe configuration with URL validation and environment variable support.
//! Values are read through a lookup function so tests can supply them without
//! touching the process environment.

use std::collections::HashMap;
use std::env;
use std::time::Duration;

use jsonwebtoken::Algorithm;
use rust_common::{CircuitBreakerConfig, HttpConfig, RetryConfig, TracingConfig};
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use url::Url;

/// Shortest HMAC secret accepted, in bytes.
pub const MIN_SECRET_LEN: usize = 32;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid URL format
    #[error("Invalid URL for {field}: {reason}")]
    InvalidUrl { field: String, reason: String },

    /// Invalid threshold value
    #[error("Invalid threshold {name}: must be greater than 0")]
    InvalidThreshold { name: &'static str },

    /// Invalid timeout value
    #[error("Invalid timeout {name}: must be greater than 0")]
    InvalidTimeout { name: &'static str },

    /// Half-open window cannot produce enough successes to close
    #[error(
        "CB_SUCCESS_THRESHOLD ({success_threshold}) must not exceed CB_HALF_OPEN_MAX_CALLS ({half_open_max_calls})"
    )]
    UnreachableRecovery {
        success_threshold: u32,
        half_open_max_calls: u32,
    },

    /// Signing secret too short for HMAC
    #[error("JWT_SECRET must be at least {MIN_SECRET_LEN} bytes")]
    WeakSecret,

    /// Only HMAC algorithms are supported
    #[error("Unsupported JWT algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Missing required field
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    /// Environment variable parse error
    #[error("Failed to parse environment variable {name}: {reason}")]
    ParseError { name: String, reason: String },
}

/// Gateway configuration with validation.
#[derive(Debug)]
pub struct Config {
    /// Account service base URL
    pub account_service_url: Url,
    /// Transaction service base URL
    pub transaction_service_url: Url,
    /// Shared HMAC signing secret
    pub jwt_secret: SecretString,
    /// HMAC algorithm for token signatures
    pub jwt_algorithm: Algorithm,
    /// Per-attempt backend timeout
    pub request_timeout: Duration,
    /// Overall deadline for one tool call
    pub call_deadline: Duration,
    /// Retries after the first attempt
    pub max_retries: u32,
    /// First backoff delay
    pub retry_initial_delay: Duration,
    /// Backoff cap
    pub retry_max_delay: Duration,
    /// Circuit breaker failure threshold (must be > 0)
    pub circuit_breaker_failure_threshold: u32,
    /// Time an open circuit waits before probing
    pub circuit_breaker_recovery_timeout: Duration,
    /// Probe budget in half-open state
    pub circuit_breaker_half_open_max_calls: u32,
    /// Probe successes needed to close
    pub circuit_breaker_success_threshold: u32,
    /// Log level filter
    pub log_level: String,
    /// Emit JSON logs
    pub log_json: bool,
    /// Graceful shutdown drain timeout
    pub shutdown_timeout: Duration,
}

impl Config {
    /// Loads configuration from environment variables with validation.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if a variable is missing, unparsable or
    /// fails validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Loads configuration from a fixed set of variables.
    ///
    /// # Errors
    ///
    /// Same as [`Config::from_env`].
    pub fn from_map(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        Self::from_lookup(|name| vars.get(name).cloned())
    }

    /// Loads configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Same as [`Config::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);

        let config = Self {
            account_service_url: vars.url("ACCOUNT_SERVICE_URL", "http://localhost:8001")?,
            transaction_service_url: vars.url("TRANSACTION_SERVICE_URL", "http://localhost:8002")?,
            jwt_secret: vars
                .get("JWT_SECRET")
                .map(SecretString::from)
                .ok_or_else(|| ConfigError::MissingRequired("JWT_SECRET".to_string()))?,
            jwt_algorithm: parse_algorithm(&vars.string("JWT_ALGORITHM", "HS256"))?,
            request_timeout: Duration::from_millis(vars.parse("REQUEST_TIMEOUT_MS", 10_000)?),
            call_deadline: Duration::from_millis(vars.parse("CALL_DEADLINE_MS", 30_000)?),
            max_retries: vars.parse("MAX_RETRIES", 3)?,
            retry_initial_delay: Duration::from_millis(vars.parse("RETRY_INITIAL_DELAY_MS", 100)?),
            retry_max_delay: Duration::from_millis(vars.parse("RETRY_MAX_DELAY_MS", 2_000)?),
            circuit_breaker_failure_threshold: vars.parse("CB_FAILURE_THRESHOLD", 5)?,
            circuit_breaker_recovery_timeout: Duration::from_secs(
                vars.parse("CB_RECOVERY_TIMEOUT", 60)?,
            ),
            circuit_breaker_half_open_max_calls: vars.parse("CB_HALF_OPEN_MAX_CALLS", 3)?,
            circuit_breaker_success_threshold: vars.parse("CB_SUCCESS_THRESHOLD", 3)?,
            log_level: vars.string("LOG_LEVEL", "info"),
            log_json: vars.parse("LOG_JSON", false)?,
            shutdown_timeout: Duration::from_secs(vars.parse("SHUTDOWN_TIMEOUT", 30)?),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt_secret.expose_secret().len() < MIN_SECRET_LEN {
            return Err(ConfigError::WeakSecret);
        }
        for (name, value) in [
            ("CB_FAILURE_THRESHOLD", self.circuit_breaker_failure_threshold),
            ("CB_HALF_OPEN_MAX_CALLS", self.circuit_breaker_half_open_max_calls),
            ("CB_SUCCESS_THRESHOLD", self.circuit_breaker_success_threshold),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidThreshold { name });
            }
        }
        for (name, value) in [
            ("REQUEST_TIMEOUT_MS", self.request_timeout),
            ("CALL_DEADLINE_MS", self.call_deadline),
            ("CB_RECOVERY_TIMEOUT", self.circuit_breaker_recovery_timeout),
            ("SHUTDOWN_TIMEOUT", self.shutdown_timeout),
        ] {
            if value.is_zero() {
                return Err(ConfigError::InvalidTimeout { name });
            }
        }
        if self.circuit_breaker_success_threshold > self.circuit_breaker_half_open_max_calls {
            return Err(ConfigError::UnreachableRecovery {
                success_threshold: self.circuit_breaker_success_threshold,
                half_open_max_calls: self.circuit_breaker_half_open_max_calls,
            });
        }
        Ok(())
    }

    /// Circuit breaker settings shared by both backends.
    #[must_use]
    pub const fn circuit_breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.circuit_breaker_failure_threshold,
            success_threshold: self.circuit_breaker_success_threshold,
            recovery_timeout: self.circuit_breaker_recovery_timeout,
            half_open_max_calls: self.circuit_breaker_half_open_max_calls,
        }
    }

    /// Retry settings shared by both backends.
    #[must_use]
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::default()
            .with_max_retries(self.max_retries)
            .with_initial_delay(self.retry_initial_delay)
            .with_max_delay(self.retry_max_delay)
    }

    /// HTTP client settings for backend calls.
    #[must_use]
    pub fn http_config(&self) -> HttpConfig {
        HttpConfig::default()
            .with_timeout(self.request_timeout)
            .with_user_agent(concat!("finance-gateway/", env!("CARGO_PKG_VERSION")))
    }

    /// Tracing settings.
    #[must_use]
    pub fn tracing_config(&self) -> TracingConfig {
        TracingConfig::default()
            .with_service_name("finance-gateway")
            .with_log_level(&self.log_level)
            .with_json_output(self.log_json)
    }
}

/// Only the HMAC family shares a single secret between issuer and gateway.
fn parse_algorithm(name: &str) -> Result<Algorithm, ConfigError> {
    match name.trim().to_ascii_uppercase().as_str() {
        "HS256" => Ok(Algorithm::HS256),
        "HS384" => Ok(Algorithm::HS384),
        "HS512" => Ok(Algorithm::HS512),
        other => Err(ConfigError::UnsupportedAlgorithm(other.to_string())),
    }
}

struct Vars<F>(F);

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, name: &str) -> Option<String> {
        (self.0)(name).filter(|v| !v.trim().is_empty())
    }

    fn string(&self, name: &str, default: &str) -> String {
        self.get(name).unwrap_or_else(|| default.to_string())
    }

    /// Parse a variable with a default value.
    fn parse<T: std::str::FromStr>(&self, name: &str, default: T) -> Result<T, ConfigError>
    where
        T::Err: std::fmt::Display,
    {
        match self.get(name) {
            Some(val) => val.trim().parse().map_err(|e: T::Err| ConfigError::ParseError {
                name: name.to_string(),
                reason: e.to_string(),
            }),
            None => Ok(default),
        }
    }

    /// Parse a URL variable with a default value.
    fn url(&self, name: &str, default: &str) -> Result<Url, ConfigError> {
        let url_str = self.string(name, default);
        Url::parse(&url_str).map_err(|e| ConfigError::InvalidUrl {
            field: name.to_string(),
            reason: e.to_string(),
        })
    }
}
