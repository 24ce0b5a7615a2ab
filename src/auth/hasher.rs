//! Argon2id hashing for passwords and OTP codes.
//!
//! Hash strings use the PHC format, so the algorithm and parameters are
//! self-describing and a future algorithm migration is detectable from the
//! stored value alone.

use anyhow::{anyhow, Result};
use argon2::{
    password_hash::{rand_core::OsRng, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};

/// Opaque hash+verify capability consumed by the workflows.
///
/// Hashing is CPU-bound; async callers should run it on a blocking thread.
pub trait SecretHasher: Send + Sync {
    /// Hash a plaintext secret into a self-describing hash string.
    fn hash(&self, plain: &str) -> Result<String>;

    /// Check a plaintext against a stored hash. `Ok(false)` is a mismatch;
    /// `Err` means the stored hash could not be parsed.
    fn verify(&self, plain: &str, hashed: &str) -> Result<bool>;
}

/// Argon2id with the crate's current OWASP-aligned defaults.
#[derive(Clone, Copy, Debug, Default)]
pub struct Argon2Hasher;

impl SecretHasher for Argon2Hasher {
    fn hash(&self, plain: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(plain.as_bytes(), &salt)
            .map_err(|err| anyhow!("failed to hash secret: {err}"))?;
        Ok(hash.to_string())
    }

    fn verify(&self, plain: &str, hashed: &str) -> Result<bool> {
        let parsed = PasswordHash::new(hashed)
            .map_err(|err| anyhow!("stored hash is not a valid PHC string: {err}"))?;
        match Argon2::default().verify_password(plain.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(err) => Err(anyhow!("failed to verify secret: {err}")),
        }
    }
}
