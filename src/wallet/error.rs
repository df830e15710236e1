//! Wallet Error Types

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::store::StoreError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    // === Validation Errors ===
    #[error("Amount must be greater than zero")]
    InvalidAmount,

    #[error("PIN must be exactly {0} digits")]
    InvalidPin(usize),

    // === State Errors ===
    #[error("Insufficient balance")]
    InsufficientBalance,

    #[error("PIN not set")]
    PinNotSet,

    #[error("PIN locked until {until}")]
    PinLocked { until: DateTime<Utc> },

    #[error("Balance would overflow")]
    Overflow,

    // === System Errors ===
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("PIN hashing failed: {0}")]
    HashError(String),
}

impl WalletError {
    pub fn code(&self) -> &'static str {
        match self {
            WalletError::InvalidAmount => "INVALID_AMOUNT",
            WalletError::InvalidPin(_) => "INVALID_PIN",
            WalletError::InsufficientBalance => "INSUFFICIENT_BALANCE",
            WalletError::PinNotSet => "PIN_NOT_SET",
            WalletError::PinLocked { .. } => "PIN_LOCKED",
            WalletError::Overflow => "OVERFLOW",
            WalletError::DatabaseError(_) => "DATABASE_ERROR",
            WalletError::HashError(_) => "SYSTEM_ERROR",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            WalletError::InvalidAmount | WalletError::InvalidPin(_) => 400,
            WalletError::InsufficientBalance
            | WalletError::PinNotSet
            | WalletError::Overflow => 422,
            WalletError::PinLocked { .. } => 423,
            WalletError::DatabaseError(_) | WalletError::HashError(_) => 500,
        }
    }
}

impl From<StoreError> for WalletError {
    fn from(e: StoreError) -> Self {
        WalletError::DatabaseError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(WalletError::InsufficientBalance.code(), "INSUFFICIENT_BALANCE");
        assert_eq!(WalletError::InvalidPin(6).to_string(), "PIN must be exactly 6 digits");
        assert_eq!(
            WalletError::PinLocked { until: Utc::now() }.http_status(),
            423
        );
    }

    #[test]
    fn test_store_error_maps_to_database() {
        let err: WalletError = StoreError::RowNotFound("wallet 1".into()).into();
        assert_eq!(err.code(), "DATABASE_ERROR");
    }
}
