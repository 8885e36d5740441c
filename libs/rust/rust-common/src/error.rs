//! Centralized error types for outbound calls.
//!
//! This module provides a unified error type for everything that can go wrong
//! between a service and one of its HTTP dependencies, with built-in
//! retryability classification.

use std::time::Duration;

use thiserror::Error;

/// Common error type for platform operations.
///
/// All errors are classified as either transient (retryable) or terminal,
/// which helps callers decide whether to retry failed operations.
#[derive(Error, Debug)]
pub enum PlatformError {
    /// HTTP request failed in a way that is neither a timeout nor a
    /// connection failure (e.g. the response body could not be decoded)
    #[error("HTTP request failed: {0}")]
    Http(reqwest::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Circuit breaker is open for the specified service
    #[error("Circuit breaker open for {service}")]
    CircuitOpen {
        /// The service name that has an open circuit
        service: String,
        /// Time until the breaker admits a trial
        retry_after: Duration,
    },

    /// Service is temporarily unavailable (5xx or connection failure)
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Timeout occurred
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// The downstream rejected our credentials (401)
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    /// The downstream refused the operation (403)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Resource not found (404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Conflicting state on the downstream (409)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Rate limit exceeded (429)
    #[error("Rate limited")]
    RateLimited,

    /// Invalid input provided (400/422)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The caller gave up before the operation completed
    #[error("Operation cancelled")]
    Cancelled,

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PlatformError {
    /// Check if this error is retryable.
    ///
    /// Only transient failures (connection problems, 5xx responses and
    /// timeouts) are retryable. Client errors, rate limiting and an open
    /// circuit are not.
    ///
    /// # Examples
    ///
    /// ```
    /// use rust_common::PlatformError;
    ///
    /// let err = PlatformError::Timeout("accounts".to_string());
    /// assert!(err.is_retryable());
    ///
    /// let err = PlatformError::NotFound("account 42".to_string());
    /// assert!(!err.is_retryable());
    /// ```
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout(_))
    }

    /// Whether this error should count against a circuit breaker.
    ///
    /// Same set as [`is_retryable`](Self::is_retryable): a backend that
    /// answers with a 4xx is alive.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        self.is_retryable()
    }

    /// Create a circuit open error for the given service.
    #[must_use]
    pub fn circuit_open(service: impl Into<String>, retry_after: Duration) -> Self {
        Self::CircuitOpen {
            service: service.into(),
            retry_after,
        }
    }

    /// Create an unavailable error with the given message.
    #[must_use]
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    /// Create a timeout error with the given message.
    #[must_use]
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create an invalid input error with the given message.
    #[must_use]
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}

impl From<reqwest::Error> for PlatformError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_connect() || err.is_request() {
            Self::Unavailable(err.to_string())
        } else {
            Self::Http(err)
        }
    }
}
