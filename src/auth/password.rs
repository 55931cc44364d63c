//! Argon2id hashing of the password that guards voice-phrase changes.
//!
//! Hashes are PHC strings, so algorithm parameters and salt travel with the
//! hash and need no separate column.

use argon2::Argon2;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};

use crate::error::SafeguardError;

/// Hashes `password` with Argon2id and a random salt.
///
/// # Errors
///
/// Returns [`SafeguardError::Internal`] if the hasher rejects its input.
pub fn hash_password(password: &str) -> Result<String, SafeguardError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| SafeguardError::Internal(format!("password hashing failed: {e}")))
}

/// Checks `password` against a stored PHC hash.
///
/// # Errors
///
/// Returns [`SafeguardError::Internal`] when the stored hash is not a valid
/// PHC string. A wrong password is `Ok(false)`.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, SafeguardError> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| SafeguardError::Internal(format!("stored password hash is invalid: {e}")))?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(SafeguardError::Internal(format!(
            "password verification failed: {e}"
        ))),
    }
}
