//! Argon2id password hashes in PHC string form
//! (`$argon2id$v=19$m=...,t=...,p=...$<salt>$<hash>`).
//!
//! Hashing is CPU-bound by design; request handlers go through [`hash`] and
//! [`verify`], which run on the blocking pool.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rand_core::OsRng;

use crate::error::AppError;

pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AppError::Server(format!("password hashing failed: {e}")))
}

/// `Ok(false)` on mismatch; `Err` only when `stored` is not a PHC hash.
pub fn verify_password(password: &str, stored: &str) -> Result<bool, AppError> {
    let parsed = PasswordHash::new(stored).map_err(|_| AppError::Store("malformed password hash".into()))?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(AppError::Store(format!("password verification failed: {e}"))),
    }
}

pub async fn hash(password: String) -> Result<String, AppError> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| AppError::Server(format!("password hashing task failed: {e}")))?
}

pub async fn verify(password: String, stored: String) -> Result<bool, AppError> {
    tokio::task::spawn_blocking(move || verify_password(&password, &stored))
        .await
        .map_err(|e| AppError::Server(format!("password verification task failed: {e}")))?
}
