//! PIN hashing and lockout policy

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::Duration;

use super::error::WalletError;
use crate::config::PinConfig;

/// One-way hash + verify for transaction PINs
pub trait PinHasher: Send + Sync {
    fn hash(&self, pin: &str) -> Result<String, WalletError>;

    /// Constant-time comparison against a stored hash
    fn verify(&self, pin: &str, hash: &str) -> Result<bool, WalletError>;
}

/// Argon2id with a salted PHC string
pub struct Argon2PinHasher {
    argon2: Argon2<'static>,
}

impl Argon2PinHasher {
    pub fn new(memory_kib: u32, iterations: u32, parallelism: u32) -> Result<Self, WalletError> {
        let params = Params::new(memory_kib, iterations, parallelism, None)
            .map_err(|e| WalletError::HashError(e.to_string()))?;
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    pub fn from_config(cfg: &PinConfig) -> Result<Self, WalletError> {
        Self::new(
            cfg.argon2_memory_kib,
            cfg.argon2_iterations,
            cfg.argon2_parallelism,
        )
    }
}

impl Default for Argon2PinHasher {
    fn default() -> Self {
        Self {
            argon2: Argon2::default(),
        }
    }
}

impl PinHasher for Argon2PinHasher {
    fn hash(&self, pin: &str) -> Result<String, WalletError> {
        let salt = SaltString::generate(&mut OsRng);
        Ok(self
            .argon2
            .hash_password(pin.as_bytes(), &salt)
            .map_err(|e| WalletError::HashError(e.to_string()))?
            .to_string())
    }

    fn verify(&self, pin: &str, hash: &str) -> Result<bool, WalletError> {
        let parsed =
            PasswordHash::new(hash).map_err(|e| WalletError::HashError(e.to_string()))?;
        Ok(self.argon2.verify_password(pin.as_bytes(), &parsed).is_ok())
    }
}

/// PIN format and lockout rules
#[derive(Debug, Clone)]
pub struct PinPolicy {
    pub length: usize,
    pub max_attempts: u32,
    pub lock_duration: Duration,
}

impl Default for PinPolicy {
    fn default() -> Self {
        Self::from_config(&PinConfig::default())
    }
}

impl PinPolicy {
    pub fn from_config(cfg: &PinConfig) -> Self {
        Self {
            length: cfg.length,
            max_attempts: cfg.max_attempts.max(1),
            lock_duration: Duration::hours(cfg.lock_hours),
        }
    }

    /// Fixed length, ASCII digits only
    pub fn validate(&self, pin: &str) -> Result<(), WalletError> {
        if pin.len() != self.length || !pin.bytes().all(|b| b.is_ascii_digit()) {
            return Err(WalletError::InvalidPin(self.length));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap() -> Argon2PinHasher {
        Argon2PinHasher::new(8, 1, 1).unwrap()
    }

    #[test]
    fn test_hash_and_verify() {
        let hasher = cheap();
        let hash = hasher.hash("123456").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(hasher.verify("123456", &hash).unwrap());
        assert!(!hasher.verify("654321", &hash).unwrap());
    }

    #[test]
    fn test_salted() {
        let hasher = cheap();
        assert_ne!(hasher.hash("123456").unwrap(), hasher.hash("123456").unwrap());
    }

    #[test]
    fn test_garbage_hash() {
        assert!(matches!(
            cheap().verify("123456", "not-a-phc-string"),
            Err(WalletError::HashError(_))
        ));
    }

    #[test]
    fn test_policy_validate() {
        let policy = PinPolicy::default();
        assert!(policy.validate("012345").is_ok());
        assert_eq!(policy.validate("12345"), Err(WalletError::InvalidPin(6)));
        assert_eq!(policy.validate("12345a"), Err(WalletError::InvalidPin(6)));
        assert_eq!(policy.validate("１２３４５６"), Err(WalletError::InvalidPin(6)));
    }
}
