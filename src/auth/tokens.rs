//! Access tokens (HS256 JWT) and opaque refresh secrets.
//!
//! Access tokens are self-contained and verified with the shared signing key.
//! Refresh secrets are random, shown to the client once, and persisted only as
//! a SHA-256 digest.

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, TimeDelta};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::{RngCore, rngs::OsRng};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::{fmt, sync::Arc};
use tracing::debug;

use super::{clock::Clock, error::AuthError, models::ADMIN_ROLE};

pub const TOKEN_ISSUER: &str = "assetra";
pub const MIN_SIGNING_KEY_LEN: usize = 32;
const REFRESH_TOKEN_BYTES: usize = 32;

/// HMAC key shared by the issuer and the gateway.
#[derive(Clone)]
pub struct SigningKey {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningKey {
    /// # Errors
    /// Returns an error if the secret is shorter than 32 bytes.
    pub fn new(secret: &SecretString) -> Result<Self> {
        let bytes = secret.expose_secret().as_bytes();
        if bytes.len() < MIN_SIGNING_KEY_LEN {
            return Err(anyhow!(
                "signing key must be at least {MIN_SIGNING_KEY_LEN} bytes"
            ));
        }
        Ok(Self {
            encoding: EncodingKey::from_secret(bytes),
            decoding: DecodingKey::from_secret(bytes),
        })
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningKey([REDACTED])")
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub roles: Vec<String>,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
    pub iss: String,
    pub jti: String,
}

/// Verified identity carried by an access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPayload {
    pub user_id: String,
    pub roles: Vec<String>,
    pub issued_at: DateTime<chrono::Utc>,
    pub expires_at: DateTime<chrono::Utc>,
}

impl TokenPayload {
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.has_role(ADMIN_ROLE)
    }
}

#[derive(Debug, Clone)]
pub struct TokenIssuer {
    key: SigningKey,
    issuer: String,
    access_ttl: TimeDelta,
    clock: Arc<dyn Clock>,
}

impl TokenIssuer {
    #[must_use]
    pub fn new(key: SigningKey, access_ttl: TimeDelta, clock: Arc<dyn Clock>) -> Self {
        Self {
            key,
            issuer: TOKEN_ISSUER.to_string(),
            access_ttl,
            clock,
        }
    }

    /// Sign a token for `user_id`; the token id is the user id.
    ///
    /// # Errors
    /// Returns an error if the expiry overflows or encoding fails.
    pub fn issue_access_token(&self, user_id: &str, roles: &[String]) -> Result<String> {
        let now = self.clock.now();
        let expires_at = now
            .checked_add_signed(self.access_ttl)
            .ok_or_else(|| anyhow!("access token lifetime overflows the calendar"))?;
        let claims = Claims {
            sub: user_id.to_string(),
            roles: roles.to_vec(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: expires_at.timestamp(),
            iss: self.issuer.clone(),
            jti: user_id.to_string(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.key.encoding)
            .context("failed to sign access token")
    }

    /// Verify signature, algorithm, issuer and time window.
    ///
    /// Expiry is checked twice: by `jsonwebtoken` against system time, then
    /// against the injected clock.
    ///
    /// # Errors
    /// Returns `AuthError::InvalidToken` for any verification failure.
    pub fn decode_access_token(&self, token: &str) -> Result<TokenPayload, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = true;
        // Not-before is checked below against our own clock.
        validation.validate_nbf = false;
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "nbf", "iat", "iss", "sub"]);

        let claims = decode::<Claims>(token, &self.key.decoding, &validation)
            .map_err(|err| {
                debug!("access token rejected: {err}");
                AuthError::InvalidToken
            })?
            .claims;

        let now = self.clock.now().timestamp();
        if claims.sub.is_empty() || now < claims.nbf || now > claims.exp {
            debug!("access token outside its validity window");
            return Err(AuthError::InvalidToken);
        }

        let issued_at = DateTime::from_timestamp(claims.iat, 0).ok_or(AuthError::InvalidToken)?;
        let expires_at = DateTime::from_timestamp(claims.exp, 0).ok_or(AuthError::InvalidToken)?;

        Ok(TokenPayload {
            user_id: claims.sub,
            roles: claims.roles,
            issued_at,
            expires_at,
        })
    }
}

/// Fresh refresh secret: 32 random bytes, hex encoded.
///
/// # Errors
/// Returns an error if the OS random source fails.
pub fn generate_refresh_token() -> Result<String> {
    let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate refresh token")?;
    Ok(hex::encode(bytes))
}

#[must_use]
pub fn hash_refresh_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}
