//! Token validation and issuance.
//!
//! [`TokenAuthority`] is stateless after construction and safe to share
//! across any number of concurrent calls.

use std::fmt;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, encode};
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::auth::claims::Claims;
use crate::auth::identity::Identity;
use crate::auth::token::{Token, Unvalidated, Validated};
use crate::config::Config;
use crate::error::AuthError;

/// Validates bearer tokens signed with a shared HMAC secret.
pub struct TokenAuthority {
    decoding_key: DecodingKey,
    algorithm: Algorithm,
}

impl fmt::Debug for TokenAuthority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenAuthority")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl TokenAuthority {
    /// Creates an authority for `secret` and an HMAC `algorithm`.
    #[must_use]
    pub fn new(secret: &SecretString, algorithm: Algorithm) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.expose_secret().as_bytes()),
            algorithm,
        }
    }

    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.jwt_secret, config.jwt_algorithm)
    }

    /// Runs both validation phases, signature first.
    ///
    /// # Errors
    ///
    /// Any [`AuthError`] describing why the token was refused.
    pub fn validate_token(&self, raw: &str) -> Result<Token<Validated>, AuthError> {
        let result = Token::<Unvalidated>::parse(raw)
            .and_then(|token| token.validate_signature(&self.decoding_key, self.algorithm))
            .and_then(|token| token.validate_claims(chrono::Utc::now().timestamp()));

        if let Err(err) = &result {
            debug!(error = %err, "Token rejected");
        }
        result
    }

    /// Validates `token` and returns its claims.
    ///
    /// An optional `Bearer ` prefix is accepted. A tampered token fails with
    /// [`AuthError::InvalidSignature`] whatever its expiry; a correctly signed
    /// token past its `exp` fails with [`AuthError::TokenExpired`].
    ///
    /// # Errors
    ///
    /// Any [`AuthError`] describing why the token was refused.
    pub fn validate(&self, token: &str) -> Result<Claims, AuthError> {
        self.validate_token(token).map(Token::into_claims)
    }

    /// Validates `token` and resolves the caller's identity.
    ///
    /// # Errors
    ///
    /// Exactly the errors of [`TokenAuthority::validate`].
    pub fn extract_identity(&self, token: &str) -> Result<Identity, AuthError> {
        let validated = self.validate_token(token)?;
        let identity = Identity::from_claims(validated.claims());
        debug!(
            user_id = %identity.user_id(),
            roles = identity.roles().len(),
            capabilities = identity.capabilities().len(),
            "Identity extracted"
        );
        Ok(identity)
    }
}

/// Signs gateway tokens with the same secret the authority verifies.
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    algorithm: Algorithm,
}

impl fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    #[must_use]
    pub fn new(secret: &SecretString, algorithm: Algorithm) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.expose_secret().as_bytes()),
            algorithm,
        }
    }

    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.jwt_secret, config.jwt_algorithm)
    }

    /// Sign `claims` into a compact JWT.
    ///
    /// # Errors
    ///
    /// Fails only if the claims cannot be serialized.
    pub fn issue(&self, claims: &Claims) -> Result<String, AuthError> {
        encode(&Header::new(self.algorithm), claims, &self.encoding_key).map_err(AuthError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::identity::Role;

    fn secret(value: &str) -> SecretString {
        SecretString::from(value.to_string())
    }

    fn pair() -> (TokenIssuer, TokenAuthority) {
        let key = secret("0123456789abcdef0123456789abcdef");
        (
            TokenIssuer::new(&key, Algorithm::HS256),
            TokenAuthority::new(&key, Algorithm::HS256),
        )
    }

    #[test]
    fn test_issue_then_extract() {
        let (issuer, authority) = pair();
        let token = issuer
            .issue(
                &Claims::new("cust-9", 300)
                    .with_username("nina")
                    .with_roles(["customer"])
                    .with_permissions(["account:read"]),
            )
            .unwrap();

        let identity = authority.extract_identity(&format!("Bearer {token}")).unwrap();
        assert_eq!(identity.user_id(), "cust-9");
        assert_eq!(identity.display_name(), "nina");
        assert!(identity.has_role(Role::Customer));
    }

    #[test]
    fn test_expired_and_tampered_differ() {
        let (issuer, authority) = pair();
        let expired = issuer.issue(&Claims::new("u", -60)).unwrap();
        assert!(matches!(
            authority.validate(&expired),
            Err(AuthError::TokenExpired { .. })
        ));

        let forger = TokenIssuer::new(
            &secret("ffffffffffffffffffffffffffffffff"),
            Algorithm::HS256,
        );
        let forged_expired = forger.issue(&Claims::new("u", -60)).unwrap();
        assert!(matches!(
            authority.validate(&forged_expired),
            Err(AuthError::InvalidSignature)
        ));
    }

    #[test]
    fn test_debug_hides_keys() {
        let (issuer, authority) = pair();
        assert!(!format!("{issuer:?}").contains("0123456789"));
        assert!(!format!("{authority:?}").contains("0123456789"));
    }
}
