/// Password Hashing and Verification
///
/// Argon2id hashing with a random per-call salt and tunable cost.
/// Hashes use the PHC string format, so the algorithm, version,
/// parameters and salt travel with the hash itself.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};

use crate::configuration::PasswordSettings;

/// Error type for hashing and comparison
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PasswordError {
    #[error("secret does not match hash")]
    Mismatch,

    #[error("password hashing failed: {0}")]
    Internal(String),
}

/// One-way credential hashing capability
pub trait CredentialHasher: Send + Sync {
    /// Hash a secret for storage.
    fn hash(&self, secret: &str) -> Result<String, PasswordError>;

    /// Verify `secret` against a stored hash in constant time.
    ///
    /// # Errors
    /// * `Mismatch` - the secret does not produce this hash
    /// * `Internal` - the hash is malformed or hashing failed
    fn compare(&self, secret: &str, hash: &str) -> Result<(), PasswordError>;
}

/// Argon2id implementation of [`CredentialHasher`]
#[derive(Clone)]
pub struct Argon2Hasher {
    params: Params,
}

impl Argon2Hasher {
    /// Build a hasher with explicit cost parameters.
    ///
    /// # Errors
    /// Returns `Internal` when the parameters are outside Argon2's limits
    pub fn new(settings: &PasswordSettings) -> Result<Self, PasswordError> {
        let params = Params::new(
            settings.memory_kib,
            settings.iterations,
            settings.parallelism,
            None,
        )
        .map_err(|e| PasswordError::Internal(format!("invalid argon2 parameters: {}", e)))?;

        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }
}

impl Default for Argon2Hasher {
    fn default() -> Self {
        Self {
            params: Params::default(),
        }
    }
}

impl CredentialHasher for Argon2Hasher {
    fn hash(&self, secret: &str) -> Result<String, PasswordError> {
        let salt = SaltString::generate(&mut OsRng);

        self.argon2()
            .hash_password(secret.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| PasswordError::Internal(e.to_string()))
    }

    fn compare(&self, secret: &str, hash: &str) -> Result<(), PasswordError> {
        let parsed_hash = PasswordHash::new(hash)
            .map_err(|e| PasswordError::Internal(format!("invalid password hash: {}", e)))?;

        // Cost parameters are taken from the stored hash, not from `self`,
        // so hashes created under older settings keep verifying.
        match self.argon2().verify_password(secret.as_bytes(), &parsed_hash) {
            Ok(()) => Ok(()),
            Err(argon2::password_hash::Error::Password) => Err(PasswordError::Mismatch),
            Err(e) => Err(PasswordError::Internal(e.to_string())),
        }
    }
}
