use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use tracing::error;

/// Prefix of hashes written by the old browser-only account list: unsalted hex SHA-256.
const LEGACY_PREFIX: &str = "sha256:";

pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            anyhow::anyhow!(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

pub fn verify_password(plain: &str, hash: &str) -> anyhow::Result<bool> {
    if let Some(hex_digest) = hash.strip_prefix(LEGACY_PREFIX) {
        let digest = Sha256::digest(plain.as_bytes());
        return Ok(hex::encode(digest).eq_ignore_ascii_case(hex_digest));
    }
    let parsed = PasswordHash::new(hash).map_err(|e| {
        error!(error = %e, "argon2 parse hash error");
        anyhow::anyhow!(e.to_string())
    })?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

/// Legacy hashes are upgraded after the next successful login.
pub fn needs_rehash(hash: &str) -> bool {
    hash.starts_with(LEGACY_PREFIX)
}
