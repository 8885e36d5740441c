//! Centralized HTTP client configuration and building.
//!
//! This module provides a standardized way to create HTTP clients with
//! consistent configuration across all finance-platform services, and to turn
//! HTTP responses into typed [`PlatformError`]s.

use std::time::Duration;

use reqwest::{Client, ClientBuilder, Response, StatusCode};

use crate::PlatformError;

/// Longest slice of an error body carried into an error message.
const MAX_ERROR_BODY: usize = 512;

/// HTTP client configuration.
///
/// Provides sensible defaults for production use with connection pooling,
/// timeouts, and TLS configuration.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Per-request timeout (default: 10s)
    pub timeout: Duration,
    /// Connection timeout (default: 5s)
    pub connect_timeout: Duration,
    /// Pool idle timeout (default: 90s)
    pub pool_idle_timeout: Duration,
    /// Maximum idle connections per host (default: 10)
    pub pool_max_idle_per_host: usize,
    /// User agent string
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
            pool_idle_timeout: Duration::from_secs(90),
            pool_max_idle_per_host: 10,
            user_agent: "finance-platform-rust/1.0".to_string(),
        }
    }
}

impl HttpConfig {
    /// Create a new HTTP config with custom timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Create a new HTTP config with custom connect timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Create a new HTTP config with custom user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

/// Build a configured HTTP client.
///
/// Creates a reqwest client with rustls TLS, connection pooling, and
/// the specified configuration.
///
/// # Errors
///
/// Returns an error if the client cannot be built (e.g., TLS initialization fails).
///
/// # Examples
///
/// ```
/// use rust_common::{HttpConfig, build_http_client};
/// use std::time::Duration;
///
/// let config = HttpConfig::default()
///     .with_timeout(Duration::from_secs(5));
/// let client = build_http_client(&config).expect("Failed to build client");
/// ```
pub fn build_http_client(config: &HttpConfig) -> Result<Client, reqwest::Error> {
    ClientBuilder::new()
        .timeout(config.timeout)
        .connect_timeout(config.connect_timeout)
        .pool_idle_timeout(config.pool_idle_timeout)
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .user_agent(&config.user_agent)
        .use_rustls_tls()
        .build()
}

/// Map a non-success status code to a typed error.
///
/// Returns `None` for 1xx/2xx/3xx statuses.
#[must_use]
pub fn classify_status(status: StatusCode, body: &str) -> Option<PlatformError> {
    if !status.is_client_error() && !status.is_server_error() {
        return None;
    }

    let detail = error_detail(status, body);
    let error = match status {
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            PlatformError::InvalidInput(detail)
        }
        StatusCode::UNAUTHORIZED => PlatformError::AuthFailed(detail),
        StatusCode::FORBIDDEN => PlatformError::Forbidden(detail),
        StatusCode::NOT_FOUND => PlatformError::NotFound(detail),
        StatusCode::CONFLICT => PlatformError::Conflict(detail),
        StatusCode::TOO_MANY_REQUESTS => PlatformError::RateLimited,
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => PlatformError::Timeout(detail),
        s if s.is_server_error() => PlatformError::Unavailable(detail),
        _ => PlatformError::InvalidInput(detail),
    };
    Some(error)
}

/// Read a response into JSON, classifying error statuses.
///
/// A success response with an empty body yields [`serde_json::Value::Null`]
/// rather than a parse error.
///
/// # Errors
///
/// Returns the classified status error, a transport error while reading the
/// body, or a serialization error if a non-empty body is not JSON.
pub async fn read_json_body(response: Response) -> Result<serde_json::Value, PlatformError> {
    let status = response.status();
    let body = response.text().await?;

    if let Some(error) = classify_status(status, &body) {
        return Err(error);
    }

    if body.trim().is_empty() {
        return Ok(serde_json::Value::Null);
    }
    Ok(serde_json::from_str(&body)?)
}

/// Pull a human-readable message out of an error body.
///
/// Backends usually answer with `{"detail": ...}`, `{"message": ...}` or
/// `{"error": ...}`; anything else is truncated raw text.
fn error_detail(status: StatusCode, body: &str) -> String {
    let from_json = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            ["detail", "message", "error"]
                .iter()
                .find_map(|key| value.get(*key).and_then(|v| v.as_str()).map(str::to_string))
        });

    let text = from_json.unwrap_or_else(|| {
        let trimmed = body.trim();
        match trimmed.char_indices().nth(MAX_ERROR_BODY) {
            Some((idx, _)) => trimmed[..idx].to_string(),
            None => trimmed.to_string(),
        }
    });

    if text.is_empty() {
        format!("status {}", status.as_u16())
    } else {
        format!("status {}: {text}", status.as_u16())
    }
}
