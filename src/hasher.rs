//! Password hashing

use crate::error::{Error, Result};

/// Supported password hashing algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Hasher {
    /// BCrypt at the library default cost
    #[default]
    Bcrypt,
}

impl Hasher {
    /// Hash a plaintext password
    pub fn hash(&self, plaintext: &str) -> Result<String> {
        match self {
            Hasher::Bcrypt => bcrypt::hash(plaintext, bcrypt::DEFAULT_COST)
                .map_err(|e| Error::Internal(format!("failed to hash password: {}", e))),
        }
    }

    /// Check a plaintext password against a stored hash
    ///
    /// A malformed stored hash fails the check rather than erroring.
    pub fn verify(&self, plaintext: &str, hash: &str) -> bool {
        match self {
            Hasher::Bcrypt => bcrypt::verify(plaintext, hash).unwrap_or(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_against_stored_hash() {
        let hasher = Hasher::Bcrypt;
        // verification reads the cost from the hash itself, so a low-cost
        // fixture exercises the same path
        let hash = bcrypt::hash("s3cr3t", 4).unwrap();
        assert!(hasher.verify("s3cr3t", &hash));
        assert!(!hasher.verify("wrong", &hash));
    }

    #[test]
    fn test_malformed_hash_fails_verification() {
        let hasher = Hasher::Bcrypt;
        assert!(!hasher.verify("s3cr3t", "not-a-bcrypt-hash"));
    }
}
