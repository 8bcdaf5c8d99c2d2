//! Password and token-secret hashing.
//!
//! Passwords use Argon2id with a fixed cost. Hashes written by older
//! deployments with bcrypt still verify and are flagged for rehash.
//! High-entropy token secrets (refresh, password reset) are hashed with
//! SHA-256 and compared in constant time.

use argon2::password_hash::{PasswordHash, PasswordHasher as _, SaltString};
use argon2::{Algorithm, Argon2, Params, PasswordVerifier, Version};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;
use zeroize::Zeroizing;

use crate::errors::{Error, Result};

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashCost {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashCost {
    /// 19 MiB, two passes: interactive-login strength.
    fn default() -> Self {
        Self { memory_kib: 19 * 1024, iterations: 2, parallelism: 1 }
    }
}

impl HashCost {
    /// Cheap parameters for tests and local tooling.
    pub fn light() -> Self {
        Self { memory_kib: 768, iterations: 1, parallelism: 1 }
    }
}

/// One-way adaptive password hasher.
#[derive(Clone)]
pub struct PasswordHasher {
    argon2: Argon2<'static>,
    cost: HashCost,
}

impl std::fmt::Debug for PasswordHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordHasher").field("cost", &self.cost).finish()
    }
}

impl PasswordHasher {
    pub fn new(cost: HashCost) -> Result<Self> {
        let params = Params::new(cost.memory_kib, cost.iterations, cost.parallelism, Some(32))
            .map_err(|err| Error::config(format!("Invalid Argon2 parameters: {}", err)))?;
        Ok(Self { argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params), cost })
    }

    pub fn hash(&self, plaintext: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2
            .hash_password(plaintext.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|err| Error::internal(format!("Failed to hash password: {}", err)))
    }

    /// Returns `false` on mismatch and on unparseable stored hashes.
    pub fn verify(&self, plaintext: &str, stored: &str) -> bool {
        if is_bcrypt_hash(stored) {
            return bcrypt::verify(plaintext, stored).unwrap_or_else(|err| {
                warn!(error = %err, "stored bcrypt hash could not be verified");
                false
            });
        }

        match PasswordHash::new(stored) {
            Ok(parsed) => self.argon2.verify_password(plaintext.as_bytes(), &parsed).is_ok(),
            Err(err) => {
                warn!(error = %err, "stored password hash is malformed");
                false
            }
        }
    }

    /// True when a stored hash was produced by another algorithm or cost.
    pub fn needs_rehash(&self, stored: &str) -> bool {
        if is_bcrypt_hash(stored) {
            return true;
        }
        match PasswordHash::new(stored) {
            Ok(parsed) => {
                let params = Params::try_from(&parsed);
                parsed.algorithm.as_str() != "argon2id"
                    || params.map_or(true, |p| {
                        p.m_cost() != self.cost.memory_kib
                            || p.t_cost() != self.cost.iterations
                            || p.p_cost() != self.cost.parallelism
                    })
            }
            Err(_) => true,
        }
    }
}

fn is_bcrypt_hash(stored: &str) -> bool {
    stored.starts_with("$2a$") || stored.starts_with("$2b$") || stored.starts_with("$2y$")
}

/// Random URL-safe secret with `bytes` bytes of entropy.
pub fn generate_secret(bytes: usize) -> String {
    let mut buf = Zeroizing::new(vec![0u8; bytes]);
    OsRng.fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(&*buf)
}

/// Hex SHA-256 of a token secret.
pub fn hash_token_secret(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}

/// Compare a candidate secret against a stored digest without early exit.
pub fn verify_token_secret(secret: &str, stored_hash: &str) -> bool {
    constant_time_eq(hash_token_secret(secret).as_bytes(), stored_hash.as_bytes())
}

pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
