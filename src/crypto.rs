//! Cryptographic logics.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{
    PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};
use argon2::{Argon2, Params, Version};

type Result<T> = std::result::Result<T, CryptoError>;

const DEFAULT_MEMORY_COST: u32 = 1024 * 64; // 64 MiB.
const DEFAULT_ITERATIONS: u32 = 4;
const DEFAULT_PARALLELISM: u32 = 2;
const DEFAULT_HASH_LENGTH: usize = 32;

#[derive(thiserror::Error, Debug)]
pub enum CryptoError {
    #[error("argon2 error: {0}")]
    Argon2(String),
}

/// Password hashing manager.
///
/// Identity-provider accounts carry an empty hash; verification against an
/// empty hash always fails.
pub struct Crypto {
    argon2: Argon2<'static>,
}

impl Crypto {
    /// Create a new [`Crypto`].
    pub fn new() -> Result<Self> {
        let params = Params::new(
            DEFAULT_MEMORY_COST,
            DEFAULT_ITERATIONS,
            DEFAULT_PARALLELISM,
            Some(DEFAULT_HASH_LENGTH),
        )
        .map_err(|err| CryptoError::Argon2(err.to_string()))?;

        Ok(Self {
            argon2: Argon2::new(argon2::Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    /// Hash a password into a PHC string.
    pub fn hash_password(&self, password: impl AsRef<[u8]>) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(password.as_ref(), &salt)
            .map_err(|err| CryptoError::Argon2(err.to_string()))?;
        Ok(hash.to_string())
    }

    /// Check a password against a stored PHC string.
    pub fn verify_password(&self, password: impl AsRef<[u8]>, hash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(hash) else {
            return false;
        };
        self.argon2
            .verify_password(password.as_ref(), &parsed)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let crypto = Crypto::new().unwrap();
        let hash = crypto.hash_password("P$soW%920$n&").unwrap();

        assert!(hash.starts_with("$argon2id$"));
        assert!(crypto.verify_password("P$soW%920$n&", &hash));
        assert!(!crypto.verify_password("wrong", &hash));
    }

    #[test]
    fn test_empty_hash_never_verifies() {
        let crypto = Crypto::new().unwrap();
        assert!(!crypto.verify_password("anything", ""));
    }
}
