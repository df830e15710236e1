//! Transfer Error Types

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::state::TransferStatus;
use crate::store::StoreError;
use crate::wallet::WalletError;

/// Transfer error types
///
/// Codes are stable identifiers for API responses.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    // === Validation Errors ===
    #[error("Cannot transfer to yourself")]
    SelfTransfer,

    #[error("Amount must be greater than zero")]
    InvalidAmount,

    #[error("Hold period of {0} days is not offered")]
    InvalidHoldPeriod(u32),

    #[error("Invalid PIN")]
    InvalidPin,

    // === Authorization Errors ===
    #[error("Action not permitted for this user")]
    Forbidden,

    // === Account Errors ===
    #[error("PIN not set")]
    PinNotSet,

    #[error("PIN locked until {until}")]
    PinLocked { until: DateTime<Utc> },

    #[error("Insufficient balance")]
    InsufficientBalance,

    #[error("Receiver not found")]
    ReceiverNotFound,

    // === State Errors ===
    #[error("Transfer not found: {0}")]
    TransferNotFound(String),

    #[error("Transfer is not held (status: {0})")]
    NotHeld(TransferStatus),

    // === System Errors ===
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Internal system error: {0}")]
    SystemError(String),
}

impl TransferError {
    /// Get the error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            TransferError::SelfTransfer => "SELF_TRANSFER",
            TransferError::InvalidAmount => "INVALID_AMOUNT",
            TransferError::InvalidHoldPeriod(_) => "INVALID_HOLD_PERIOD",
            TransferError::InvalidPin => "INVALID_PIN",
            TransferError::Forbidden => "FORBIDDEN",
            TransferError::PinNotSet => "PIN_NOT_SET",
            TransferError::PinLocked { .. } => "PIN_LOCKED",
            TransferError::InsufficientBalance => "INSUFFICIENT_BALANCE",
            TransferError::ReceiverNotFound => "RECEIVER_NOT_FOUND",
            TransferError::TransferNotFound(_) => "TRANSFER_NOT_FOUND",
            TransferError::NotHeld(_) => "NOT_HELD",
            TransferError::DatabaseError(_) => "DATABASE_ERROR",
            TransferError::SystemError(_) => "SYSTEM_ERROR",
        }
    }

    /// Get HTTP status code suggestion
    pub fn http_status(&self) -> u16 {
        match self {
            TransferError::SelfTransfer
            | TransferError::InvalidAmount
            | TransferError::InvalidHoldPeriod(_)
            | TransferError::InvalidPin => 400,
            TransferError::Forbidden => 403,
            TransferError::ReceiverNotFound | TransferError::TransferNotFound(_) => 404,
            TransferError::NotHeld(_) => 409,
            TransferError::PinNotSet | TransferError::InsufficientBalance => 422,
            TransferError::PinLocked { .. } => 423,
            TransferError::DatabaseError(_) | TransferError::SystemError(_) => 500,
        }
    }
}

impl From<StoreError> for TransferError {
    fn from(e: StoreError) -> Self {
        TransferError::DatabaseError(e.to_string())
    }
}

impl From<WalletError> for TransferError {
    fn from(e: WalletError) -> Self {
        match e {
            WalletError::InvalidAmount => TransferError::InvalidAmount,
            WalletError::InvalidPin(_) => TransferError::InvalidPin,
            WalletError::InsufficientBalance => TransferError::InsufficientBalance,
            WalletError::PinNotSet => TransferError::PinNotSet,
            WalletError::PinLocked { until } => TransferError::PinLocked { until },
            WalletError::DatabaseError(s) => TransferError::DatabaseError(s),
            WalletError::Overflow | WalletError::HashError(_) => {
                TransferError::SystemError(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(TransferError::SelfTransfer.code(), "SELF_TRANSFER");
        assert_eq!(
            TransferError::NotHeld(TransferStatus::Released).to_string(),
            "Transfer is not held (status: released)"
        );
        assert_eq!(TransferError::NotHeld(TransferStatus::Cancelled).http_status(), 409);
        assert_eq!(TransferError::Forbidden.http_status(), 403);
    }

    #[test]
    fn test_wallet_error_mapping() {
        assert_eq!(
            TransferError::from(WalletError::InsufficientBalance),
            TransferError::InsufficientBalance
        );
        assert_eq!(
            TransferError::from(WalletError::InvalidPin(6)),
            TransferError::InvalidPin
        );
        assert_eq!(
            TransferError::from(WalletError::Overflow).code(),
            "SYSTEM_ERROR"
        );
    }
}
