//! Argon2id password hashing.
//!
//! Hashing is CPU bound, so the async helpers move it onto the blocking pool.

use anyhow::{Context, Result, anyhow};
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use rand::rngs::OsRng;
use tracing::error;

/// Hash `plain` into a PHC string with a fresh random salt.
///
/// # Errors
/// Returns an error if the hasher rejects the input.
pub fn hash_password(plain: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| anyhow!("failed to hash password: {e}"))?;
    Ok(hash.to_string())
}

/// Malformed hashes never verify.
#[must_use]
pub fn verify_password(hash: &str, plain: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok()
}

/// # Errors
/// Returns an error if hashing fails or the blocking task panics.
pub async fn hash(plain: String) -> Result<String> {
    tokio::task::spawn_blocking(move || hash_password(&plain))
        .await
        .context("password hashing task failed")?
}

pub async fn verify(hash: String, plain: String) -> bool {
    match tokio::task::spawn_blocking(move || verify_password(&hash, &plain)).await {
        Ok(verified) => verified,
        Err(err) => {
            error!("password verification task failed: {err}");
            false
        }
    }
}
