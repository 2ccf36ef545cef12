//! Password hashing, session tokens and one-time codes.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::UserId;

/// Length of a verification or invitation code.
pub const CODE_LENGTH: usize = 40;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SecurityError {
    #[error("Password hashing failed: {0}")]
    Hashing(String),

    #[error("Token encoding failed: {0}")]
    TokenEncoding(String),
}

/// Why a bearer token was refused.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("Token expired")]
    Expired,

    #[error("Token is invalid")]
    Invalid,
}

// =============================================================================
// Passwords
// =============================================================================

/// Hashes a password with Argon2id and a fresh random salt.
///
/// # Errors
///
/// Returns `SecurityError::Hashing` if the salt or hash cannot be produced.
pub fn hash_password(password: &str) -> Result<String, SecurityError> {
    let mut salt = [0u8; 16];
    rand::rng().fill_bytes(&mut salt);
    let salt =
        SaltString::encode_b64(&salt).map_err(|error| SecurityError::Hashing(error.to_string()))?;

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|error| SecurityError::Hashing(error.to_string()))
}

/// Checks a password against a stored PHC string. Malformed hashes never
/// match.
#[must_use]
pub fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash).is_ok_and(|parsed| {
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    })
}

// =============================================================================
// Session Tokens
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Claims {
    sub: String,
    exp: i64,
    iat: i64,
}

/// Issues and verifies HS256 session tokens.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("TokenIssuer")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    #[must_use]
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    /// Issues a token for `user` valid from `now`.
    ///
    /// # Errors
    ///
    /// Returns `SecurityError::TokenEncoding` if signing fails.
    pub fn issue(&self, user: UserId, now: DateTime<Utc>) -> Result<String, SecurityError> {
        let claims = Claims {
            sub: user.to_string(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|error| SecurityError::TokenEncoding(error.to_string()))
    }

    /// Returns the user a token was issued to.
    ///
    /// # Errors
    ///
    /// `TokenError::Expired` once `exp` has passed, `TokenError::Invalid` for
    /// anything else.
    pub fn verify(&self, token: &str) -> Result<UserId, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding, &validation).map_err(
            |error| match error.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            },
        )?;
        data.claims.sub.parse().map_err(|_| TokenError::Invalid)
    }
}

// =============================================================================
// Codes
// =============================================================================

/// Generates a random code of [`CODE_LENGTH`] lowercase hex characters.
#[must_use]
pub fn generate_code() -> String {
    let mut bytes = [0u8; CODE_LENGTH / 2];
    rand::rng().fill_bytes(&mut bytes);
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}

/// Returns true if `code` looks like a generated code, ignoring case.
#[must_use]
pub fn is_code(code: &str) -> bool {
    code.len() == CODE_LENGTH && code.chars().all(|character| character.is_ascii_hexdigit())
}
