//! Error handling module with type-safe, non-exhaustive error types
//!
//! This module provides a unified error handling approach with:
//! - Non-exhaustive enums for forward compatibility
//! - Structured error variants with contextual information
//! - Contextual conversion from backend and token errors
//! - Sanitization of sensitive information in responses

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_common::PlatformError;
use thiserror::Error;

/// Sensitive patterns that should be sanitized from error messages
const SENSITIVE_PATTERNS: &[&str] = &[
    "password",
    "secret",
    "token",
    "key",
    "credential",
    "bearer",
    "authorization",
    "api_key",
    "apikey",
    "private",
];

/// Reasons a bearer token is rejected.
///
/// Every variant is terminal for the call: authentication failures are never
/// retried.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No token was supplied with the call
    #[error("Token missing from request")]
    TokenMissing,

    /// Token structure is malformed
    #[error("Token malformed: {reason}")]
    TokenMalformed {
        /// Description of the malformation
        reason: String,
    },

    /// Signature verification failed
    #[error("Token signature invalid")]
    InvalidSignature,

    /// Token has expired
    #[error("Token expired at {expired_at}")]
    TokenExpired {
        /// When the token expired
        expired_at: DateTime<Utc>,
    },

    /// Token is not yet valid (nbf claim)
    #[error("Token not yet valid until {valid_from}")]
    TokenNotYetValid {
        /// When the token becomes valid
        valid_from: DateTime<Utc>,
    },

    /// Required claims are missing or invalid
    #[error("Required claims invalid: {claims:?}")]
    ClaimsInvalid {
        /// List of invalid or missing claims
        claims: Vec<String>,
    },

    /// A backend refused the forwarded credentials (401)
    #[error("Credentials rejected by backend: {0}")]
    Rejected(String),
}

impl AuthError {
    /// Caller-facing message. Never echoes token material.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::TokenMissing => "Authentication token is required".to_string(),
            Self::TokenMalformed { .. } => "Authentication token is malformed".to_string(),
            Self::InvalidSignature => "Authentication token signature is invalid".to_string(),
            Self::TokenExpired { .. } => "Authentication token has expired".to_string(),
            Self::TokenNotYetValid { .. } => "Authentication token is not yet valid".to_string(),
            Self::ClaimsInvalid { claims } => {
                format!("Authentication token is missing required claims: {}", claims.join(", "))
            }
            Self::Rejected(_) => "Backend rejected the supplied credentials".to_string(),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => Self::InvalidSignature,
            ErrorKind::ExpiredSignature => Self::TokenExpired {
                expired_at: Utc::now(),
            },
            ErrorKind::ImmatureSignature => Self::TokenNotYetValid {
                valid_from: Utc::now(),
            },
            ErrorKind::MissingRequiredClaim(claim) => Self::ClaimsInvalid {
                claims: vec![claim.clone()],
            },
            _ => Self::TokenMalformed {
                reason: sanitize_message(&err.to_string(), "Token validation failed"),
            },
        }
    }
}

/// Non-exhaustive gateway error.
///
/// Everything that can stop a tool call ends up here before it is rendered
/// into an error envelope.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Caller could not be authenticated
    #[error("Authentication failed: {reason}")]
    Authentication {
        /// Why the credentials were refused
        #[from]
        reason: AuthError,
    },

    /// Caller is authenticated but not allowed to perform the action
    #[error("Authorization denied: {reason}")]
    Authorization {
        /// Why the action was denied
        reason: String,
    },

    /// Malformed caller input or a backend validation failure
    #[error("Validation failed: {message}")]
    Validation {
        /// Human-readable summary
        message: String,
        /// Structured detail (e.g. compliance issues)
        details: Option<serde_json::Value>,
    },

    /// The addressed resource does not exist
    #[error("Not found: {resource}")]
    NotFound {
        /// What was looked up
        resource: String,
    },

    /// Backend answered with a server error or could not be reached
    #[error("Service {service} failed: {message}")]
    Service {
        /// Backend name
        service: String,
        /// Failure detail (logged, not returned)
        message: String,
    },

    /// Operation timed out
    #[error("Call to {service} timed out after {duration:?}")]
    Timeout {
        /// Backend or stage that timed out
        service: String,
        /// How long the operation ran before timing out
        duration: Duration,
    },

    /// Circuit breaker is open
    #[error("Circuit breaker open for service: {service}")]
    CircuitOpen {
        /// Name of the service with open circuit
        service: String,
        /// When the circuit will admit a trial
        retry_after: Duration,
    },

    /// Backend rate limit exceeded
    #[error("Rate limit exceeded for {service}")]
    RateLimited {
        /// Backend that refused the call
        service: String,
    },

    /// Backend reported conflicting state (409)
    #[error("Conflict: {message}")]
    Conflict {
        /// Conflict detail
        message: String,
    },

    /// The caller gave up on the call
    #[error("Call cancelled")]
    Cancelled,

    /// Internal error (details sanitized in responses)
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Stable machine-readable error codes carried in error envelopes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Authentication,
    Authorization,
    Validation,
    NotFound,
    Service,
    Timeout,
    CircuitOpen,
    RateLimited,
    Conflict,
    Cancelled,
    Internal,
}

impl ErrorCode {
    /// Every code, in declaration order
    pub const ALL: [Self; 11] = [
        Self::Authentication,
        Self::Authorization,
        Self::Validation,
        Self::NotFound,
        Self::Service,
        Self::Timeout,
        Self::CircuitOpen,
        Self::RateLimited,
        Self::Conflict,
        Self::Cancelled,
        Self::Internal,
    ];

    /// Get the string representation of the error code
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Authentication => "AUTHENTICATION_ERROR",
            Self::Authorization => "AUTHORIZATION_ERROR",
            Self::Validation => "VALIDATION_ERROR",
            Self::NotFound => "NOT_FOUND",
            Self::Service => "SERVICE_ERROR",
            Self::Timeout => "TIMEOUT_ERROR",
            Self::CircuitOpen => "CIRCUIT_OPEN_ERROR",
            Self::RateLimited => "RATE_LIMIT_ERROR",
            Self::Conflict => "CONFLICT_ERROR",
            Self::Cancelled => "CANCELLED",
            Self::Internal => "INTERNAL_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl GatewayError {
    /// Create a validation error without structured details.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            details: None,
        }
    }

    /// Create an authorization error.
    #[must_use]
    pub fn authorization(reason: impl Into<String>) -> Self {
        Self::Authorization {
            reason: reason.into(),
        }
    }

    /// Classify a failed backend call.
    ///
    /// `attempt_timeout` is reported as the duration of a timed-out attempt.
    #[must_use]
    pub fn from_backend(service: &str, err: PlatformError, attempt_timeout: Duration) -> Self {
        match err {
            PlatformError::InvalidInput(message) => Self::Validation {
                message,
                details: None,
            },
            PlatformError::AuthFailed(message) => AuthError::Rejected(message).into(),
            PlatformError::Forbidden(reason) => Self::Authorization { reason },
            PlatformError::NotFound(resource) => Self::NotFound { resource },
            PlatformError::Conflict(message) => Self::Conflict { message },
            PlatformError::RateLimited => Self::RateLimited {
                service: service.to_string(),
            },
            PlatformError::Timeout(_) => Self::Timeout {
                service: service.to_string(),
                duration: attempt_timeout,
            },
            PlatformError::CircuitOpen {
                service,
                retry_after,
            } => Self::CircuitOpen {
                service,
                retry_after,
            },
            PlatformError::Unavailable(message) | PlatformError::Internal(message) => {
                Self::Service {
                    service: service.to_string(),
                    message,
                }
            }
            PlatformError::Http(err) => Self::Service {
                service: service.to_string(),
                message: err.to_string(),
            },
            PlatformError::Serialization(err) => Self::Service {
                service: service.to_string(),
                message: format!("unreadable response body: {err}"),
            },
            PlatformError::Cancelled => Self::Cancelled,
        }
    }

    /// Get the error code for this error
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Authentication { .. } => ErrorCode::Authentication,
            Self::Authorization { .. } => ErrorCode::Authorization,
            Self::Validation { .. } => ErrorCode::Validation,
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::Service { .. } => ErrorCode::Service,
            Self::Timeout { .. } => ErrorCode::Timeout,
            Self::CircuitOpen { .. } => ErrorCode::CircuitOpen,
            Self::RateLimited { .. } => ErrorCode::RateLimited,
            Self::Conflict { .. } => ErrorCode::Conflict,
            Self::Cancelled => ErrorCode::Cancelled,
            Self::Internal(_) => ErrorCode::Internal,
        }
    }

    /// Message safe to hand back to the caller.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::Authentication { reason } => reason.public_message(),
            Self::Authorization { reason } => {
                sanitize_message(reason, "Not permitted to perform this action")
            }
            Self::Validation { message, .. } => sanitize_message(message, "Invalid request"),
            Self::NotFound { resource } => sanitize_message(resource, "Resource not found"),
            Self::Service { service, .. } => format!("Service {service} temporarily unavailable"),
            Self::Timeout { service, duration } => {
                format!("Call to {service} timed out after {}ms", duration.as_millis())
            }
            Self::CircuitOpen { service, .. } => {
                format!("Service {service} temporarily unavailable")
            }
            Self::RateLimited { service } => format!("Rate limit exceeded for {service}"),
            Self::Conflict { message } => sanitize_message(message, "Conflicting resource state"),
            Self::Cancelled => "Call was cancelled".to_string(),
            // Never expose internal error details
            Self::Internal(_) => "Internal error".to_string(),
        }
    }

    /// Structured details for the error envelope, if any.
    #[must_use]
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::Validation { details, .. } => details.clone(),
            Self::CircuitOpen { retry_after, .. } => Some(serde_json::json!({
                "retry_after_ms": u64::try_from(retry_after.as_millis()).unwrap_or(u64::MAX),
            })),
            Self::Timeout { duration, .. } => Some(serde_json::json!({
                "timeout_ms": u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
            })),
            _ => None,
        }
    }

    /// Get retry-after duration if applicable
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::CircuitOpen { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }
}

/// Replace a message with `fallback` if it mentions sensitive material
#[must_use]
pub fn sanitize_message(message: &str, fallback: &str) -> String {
    if contains_sensitive_info(message) {
        fallback.to_string()
    } else {
        message.to_string()
    }
}

/// Check if a string contains sensitive information
#[must_use]
pub fn contains_sensitive_info(text: &str) -> bool {
    let lower = text.to_lowercase();
    SENSITIVE_PATTERNS.iter().any(|p| lower.contains(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_unique() {
        let codes: std::collections::HashSet<_> =
            ErrorCode::ALL.iter().map(|c| c.as_str()).collect();
        assert_eq!(codes.len(), ErrorCode::ALL.len());
    }

    #[test]
    fn test_backend_classification() {
        let cases = [
            (PlatformError::InvalidInput("bad".into()), ErrorCode::Validation),
            (PlatformError::AuthFailed("nope".into()), ErrorCode::Authentication),
            (PlatformError::Forbidden("nope".into()), ErrorCode::Authorization),
            (PlatformError::NotFound("acc".into()), ErrorCode::NotFound),
            (PlatformError::Conflict("closed".into()), ErrorCode::Conflict),
            (PlatformError::RateLimited, ErrorCode::RateLimited),
            (PlatformError::unavailable("503"), ErrorCode::Service),
            (PlatformError::timeout("slow"), ErrorCode::Timeout),
            (
                PlatformError::circuit_open("accounts", Duration::from_secs(3)),
                ErrorCode::CircuitOpen,
            ),
            (PlatformError::Cancelled, ErrorCode::Cancelled),
        ];

        for (err, code) in cases {
            let mapped = GatewayError::from_backend("accounts", err, Duration::from_secs(1));
            assert_eq!(mapped.code(), code);
        }
    }

    #[test]
    fn test_sensitive_messages_are_replaced() {
        let err = GatewayError::validation("header Authorization: Bearer eyJhbGciOi");
        assert_eq!(err.public_message(), "Invalid request");

        let err = GatewayError::validation("amount must be positive");
        assert_eq!(err.public_message(), "amount must be positive");
    }

    #[test]
    fn test_internal_details_hidden() {
        let err = GatewayError::Internal(anyhow::anyhow!("db password=hunter2"));
        assert_eq!(err.public_message(), "Internal error");
        assert_eq!(err.code(), ErrorCode::Internal);
    }

    #[test]
    fn test_service_detail_not_exposed() {
        let err = GatewayError::Service {
            service: "accounts".to_string(),
            message: "stack trace at ledger.py:42".to_string(),
        };
        assert_eq!(err.public_message(), "Service accounts temporarily unavailable");
    }

    #[test]
    fn test_circuit_open_details() {
        let err = GatewayError::CircuitOpen {
            service: "transactions".to_string(),
            retry_after: Duration::from_millis(1500),
        };
        assert_eq!(err.details().unwrap()["retry_after_ms"], 1500);
        assert_eq!(err.retry_after(), Some(Duration::from_millis(1500)));
    }

    #[test]
    fn test_auth_messages_are_distinct() {
        let expired = AuthError::TokenExpired {
            expired_at: Utc::now(),
        };
        assert_ne!(expired.public_message(), AuthError::InvalidSignature.public_message());
    }
}
