//! Type-State JWT Token with compile-time validation guarantees
//!
//! This module implements the type-state pattern for JWT validation,
//! ensuring that claims can only be read once the signature has been
//! verified, and only trusted once expiry and required claims have been
//! checked as well.

use std::fmt;

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Header, Validation, decode, decode_header};

use crate::auth::claims::Claims;
use crate::error::AuthError;

// ============================================================================
// Sealed Trait Pattern for Token States
// ============================================================================

mod private {
    /// Sealed trait to prevent external implementations
    pub trait Sealed {}
}

/// Marker trait for token validation states
pub trait TokenState: private::Sealed {
    /// Data available in this state
    type Payload;

    /// Human-readable state name for debugging
    fn state_name() -> &'static str;
}

/// Unvalidated token - just parsed, not verified
pub struct Unvalidated;
impl private::Sealed for Unvalidated {}
impl TokenState for Unvalidated {
    type Payload = ();

    fn state_name() -> &'static str {
        "Unvalidated"
    }
}

/// Signature validated - cryptographic verification passed
pub struct SignatureValidated;
impl private::Sealed for SignatureValidated {}
impl TokenState for SignatureValidated {
    type Payload = Claims;

    fn state_name() -> &'static str {
        "SignatureValidated"
    }
}

/// Fully validated - signature + claims verified
pub struct Validated;
impl private::Sealed for Validated {}
impl TokenState for Validated {
    type Payload = Claims;

    fn state_name() -> &'static str {
        "Validated"
    }
}

// ============================================================================
// Type-State Token Wrapper
// ============================================================================

/// Type-state token wrapper that enforces validation at compile time
pub struct Token<State: TokenState> {
    /// Raw JWT string, without any `Bearer ` prefix
    raw: String,
    /// Parsed header (available in all states)
    header: Header,
    /// Decoded claims once the signature is verified
    payload: State::Payload,
}

impl<S: TokenState> fmt::Debug for Token<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("state", &S::state_name())
            .field("alg", &self.header.alg)
            .finish_non_exhaustive()
    }
}

/// Strip an optional, case-insensitive `Bearer ` prefix.
#[must_use]
pub fn strip_bearer(raw: &str) -> &str {
    let trimmed = raw.trim();
    match trimmed.get(..7) {
        Some(prefix) if prefix.eq_ignore_ascii_case("bearer ") => trimmed[7..].trim_start(),
        _ => trimmed,
    }
}

impl Token<Unvalidated> {
    /// Parse a raw JWT string into an unvalidated token.
    ///
    /// # Errors
    ///
    /// [`AuthError::TokenMissing`] for an empty string,
    /// [`AuthError::TokenMalformed`] unless the token has exactly three
    /// non-empty segments and a decodable header.
    pub fn parse(raw: &str) -> Result<Self, AuthError> {
        let raw = strip_bearer(raw);
        if raw.is_empty() {
            return Err(AuthError::TokenMissing);
        }

        let segments: Vec<&str> = raw.split('.').collect();
        if segments.len() != 3 || segments.iter().any(|s| s.is_empty()) {
            return Err(AuthError::TokenMalformed {
                reason: format!("expected 3 segments, found {}", segments.len()),
            });
        }

        let header = decode_header(raw).map_err(|e| AuthError::TokenMalformed {
            reason: format!("Invalid header: {e}"),
        })?;

        Ok(Self {
            raw: raw.to_string(),
            header,
            payload: (),
        })
    }

    /// Get the algorithm from the token header
    #[must_use]
    pub const fn algorithm(&self) -> Algorithm {
        self.header.alg
    }

    /// Verify the signature with `key`, ignoring every time-based claim.
    ///
    /// # Errors
    ///
    /// [`AuthError::InvalidSignature`] when the signature does not match or
    /// the header names a different algorithm, [`AuthError::TokenMalformed`]
    /// when the payload cannot be decoded.
    pub fn validate_signature(
        self,
        key: &DecodingKey,
        algorithm: Algorithm,
    ) -> Result<Token<SignatureValidated>, AuthError> {
        // Signature only; expiry is checked in the next state
        let mut validation = Validation::new(algorithm);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let token_data = decode::<Claims>(&self.raw, key, &validation).map_err(AuthError::from)?;

        Ok(Token {
            raw: self.raw,
            header: self.header,
            payload: token_data.claims,
        })
    }
}

impl Token<SignatureValidated> {
    /// Validate claims against `now` (unix seconds) and transition to the
    /// fully validated state.
    ///
    /// # Errors
    ///
    /// [`AuthError::ClaimsInvalid`] when `sub` or `exp` is absent,
    /// [`AuthError::TokenExpired`] when `exp` is in the past and
    /// [`AuthError::TokenNotYetValid`] when `nbf` is in the future.
    pub fn validate_claims(self, now: i64) -> Result<Token<Validated>, AuthError> {
        let claims = &self.payload;

        let mut missing = Vec::new();
        if claims.sub.as_deref().is_none_or(str::is_empty) {
            missing.push("sub".to_string());
        }
        if claims.exp.is_none() {
            missing.push("exp".to_string());
        }
        if !missing.is_empty() {
            return Err(AuthError::ClaimsInvalid { claims: missing });
        }

        if let Some(exp) = claims.exp.filter(|&exp| exp < now) {
            return Err(AuthError::TokenExpired {
                expired_at: timestamp(exp),
            });
        }

        if let Some(nbf) = claims.nbf.filter(|&nbf| nbf > now) {
            return Err(AuthError::TokenNotYetValid {
                valid_from: timestamp(nbf),
            });
        }

        Ok(Token {
            raw: self.raw,
            header: self.header,
            payload: self.payload,
        })
    }

    /// Get read-only access to claims (signature validated but not fully validated)
    #[must_use]
    pub const fn peek_claims(&self) -> &Claims {
        &self.payload
    }
}

impl Token<Validated> {
    /// Access claims - only available on fully validated tokens
    #[must_use]
    pub const fn claims(&self) -> &Claims {
        &self.payload
    }

    /// Consume the token, keeping its claims
    #[must_use]
    pub fn into_claims(self) -> Claims {
        self.payload
    }

    /// Get the subject claim
    #[must_use]
    pub fn subject(&self) -> &str {
        self.payload.sub.as_deref().unwrap_or_default()
    }

    /// Get the raw token string
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }
}

// Common methods for all states
impl<S: TokenState> Token<S> {
    /// Get the current state name
    #[must_use]
    pub fn state_name(&self) -> &'static str {
        S::state_name()
    }
}

fn timestamp(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_else(Utc::now)
}
