//! Password strength policy and Argon2id digests.

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use thiserror::Error;
use tokio::task;

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("password does not meet requirements: {0}")]
    TooWeak(String),

    #[error("password hashing failed: {0}")]
    Hash(String),

    #[error("hashing task panicked")]
    TaskFailed,
}

/// Configurable strength rules plus the Argon2id cost parameters used
/// when producing digests.
#[derive(Debug, Clone)]
pub struct PasswordPolicy {
    pub min_length: usize,
    pub require_uppercase: bool,
    pub require_lowercase: bool,
    pub require_number: bool,
    pub require_special: bool,
    pub memory_cost_kib: u32,
    pub time_cost: u32,
    pub parallelism: u32,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 8,
            require_uppercase: true,
            require_lowercase: true,
            require_number: true,
            require_special: true,
            memory_cost_kib: 19 * 1024,
            time_cost: 2,
            parallelism: 1,
        }
    }
}

impl PasswordPolicy {
    /// Check the plain password against the configured character-class
    /// rules without touching the hasher.
    pub fn validate_strength(&self, password: &str) -> Result<(), PasswordError> {
        if password.chars().count() < self.min_length {
            return Err(PasswordError::TooWeak(format!(
                "minimum length is {} characters",
                self.min_length
            )));
        }

        let mut has_upper = false;
        let mut has_lower = false;
        let mut has_number = false;
        let mut has_special = false;

        for c in password.chars() {
            if c.is_uppercase() {
                has_upper = true;
            } else if c.is_lowercase() {
                has_lower = true;
            } else if c.is_ascii_digit() {
                has_number = true;
            } else if !c.is_whitespace() {
                has_special = true;
            }
        }

        if self.require_uppercase && !has_upper {
            return Err(PasswordError::TooWeak(
                "must contain at least one uppercase letter".to_string(),
            ));
        }
        if self.require_lowercase && !has_lower {
            return Err(PasswordError::TooWeak(
                "must contain at least one lowercase letter".to_string(),
            ));
        }
        if self.require_number && !has_number {
            return Err(PasswordError::TooWeak(
                "must contain at least one number".to_string(),
            ));
        }
        if self.require_special && !has_special {
            return Err(PasswordError::TooWeak(
                "must contain at least one special character".to_string(),
            ));
        }

        Ok(())
    }

    /// Validate strength, then produce an Argon2id digest.
    ///
    /// Runs on a blocking task because Argon2 is deliberately CPU-heavy
    /// and would stall the async runtime if run inline.
    pub async fn hash(&self, password: &str) -> Result<String, PasswordError> {
        self.validate_strength(password)?;

        let params = Params::new(self.memory_cost_kib, self.time_cost, self.parallelism, None)
            .map_err(|e| PasswordError::Hash(e.to_string()))?;
        let password = password.to_string();

        task::spawn_blocking(move || {
            let salt = SaltString::generate(&mut OsRng);
            let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
            argon2
                .hash_password(password.as_bytes(), &salt)
                .map(|hash| hash.to_string())
                .map_err(|e| PasswordError::Hash(e.to_string()))
        })
        .await
        .map_err(|_| PasswordError::TaskFailed)?
    }

    /// Compare a plain password against a stored digest.
    ///
    /// Returns `Ok(false)` on mismatch without ever indicating which part
    /// of the comparison failed.
    pub async fn verify(digest: &str, password: &str) -> Result<bool, PasswordError> {
        let digest = digest.to_string();
        let password = password.to_string();

        task::spawn_blocking(move || {
            let parsed = PasswordHash::new(&digest)
                .map_err(|e| PasswordError::Hash(format!("invalid digest format: {e}")))?;
            Ok(Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok())
        })
        .await
        .map_err(|_| PasswordError::TaskFailed)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> PasswordPolicy {
        // Minimal cost so the test suite stays fast
        PasswordPolicy {
            memory_cost_kib: 1024,
            time_cost: 1,
            ..PasswordPolicy::default()
        }
    }

    #[test]
    fn strength_rules_reject_missing_classes() {
        let policy = policy();
        assert!(policy.validate_strength("Pw0rd!aa").is_ok());
        assert!(policy.validate_strength("short1!A").is_ok());
        assert!(policy.validate_strength("Sh0rt!").is_err()); // too short
        assert!(policy.validate_strength("pw0rd!aaa").is_err()); // no upper
        assert!(policy.validate_strength("PW0RD!AAA").is_err()); // no lower
        assert!(policy.validate_strength("Pwword!aa").is_err()); // no digit
        assert!(policy.validate_strength("Pw0rdaaaa").is_err()); // no special
    }

    #[tokio::test]
    async fn hash_then_verify_round_trips() {
        let policy = policy();
        let digest = policy.hash("Pw0rd!aa").await.unwrap();

        assert!(PasswordPolicy::verify(&digest, "Pw0rd!aa").await.unwrap());
        assert!(!PasswordPolicy::verify(&digest, "Pw0rd!ab").await.unwrap());
    }

    #[tokio::test]
    async fn hash_refuses_weak_password() {
        let err = policy().hash("weak").await.unwrap_err();
        assert!(matches!(err, PasswordError::TooWeak(_)));
    }

    #[tokio::test]
    async fn verify_rejects_garbage_digest() {
        assert!(PasswordPolicy::verify("not-a-digest", "Pw0rd!aa")
            .await
            .is_err());
    }
}
