//! Dispute Error Types

use thiserror::Error;

use super::state::DisputePhase;
use crate::store::StoreError;
use crate::transfer::TransferStatus;
use crate::wallet::WalletError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DisputeError {
    // === Validation Errors ===
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // === Authorization Errors ===
    #[error("You are not part of this transfer")]
    NotAParty,

    #[error("Action not permitted for this user")]
    Forbidden,

    // === Not Found ===
    #[error("Transfer not found: {0}")]
    TransferNotFound(String),

    #[error("Dispute not found: {0}")]
    DisputeNotFound(String),

    // === State Errors ===
    #[error("Can only dispute held transfers (status: {0})")]
    TransferNotHeld(TransferStatus),

    #[error("An active dispute already exists for this transfer")]
    DisputeAlreadyActive,

    #[error("Action not allowed in phase {0}")]
    WrongPhase(DisputePhase),

    #[error("Dispute is already resolved")]
    AlreadyResolved,

    // === System Errors ===
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Internal system error: {0}")]
    SystemError(String),
}

impl DisputeError {
    pub fn code(&self) -> &'static str {
        match self {
            DisputeError::InvalidInput(_) => "INVALID_INPUT",
            DisputeError::NotAParty => "NOT_A_PARTY",
            DisputeError::Forbidden => "FORBIDDEN",
            DisputeError::TransferNotFound(_) => "TRANSFER_NOT_FOUND",
            DisputeError::DisputeNotFound(_) => "DISPUTE_NOT_FOUND",
            DisputeError::TransferNotHeld(_) => "TRANSFER_NOT_HELD",
            DisputeError::DisputeAlreadyActive => "DISPUTE_ALREADY_ACTIVE",
            DisputeError::WrongPhase(_) => "WRONG_PHASE",
            DisputeError::AlreadyResolved => "ALREADY_RESOLVED",
            DisputeError::DatabaseError(_) => "DATABASE_ERROR",
            DisputeError::SystemError(_) => "SYSTEM_ERROR",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            DisputeError::InvalidInput(_) => 400,
            DisputeError::NotAParty | DisputeError::Forbidden => 403,
            DisputeError::TransferNotFound(_) | DisputeError::DisputeNotFound(_) => 404,
            DisputeError::TransferNotHeld(_)
            | DisputeError::DisputeAlreadyActive
            | DisputeError::WrongPhase(_)
            | DisputeError::AlreadyResolved => 409,
            DisputeError::DatabaseError(_) | DisputeError::SystemError(_) => 500,
        }
    }
}

impl From<StoreError> for DisputeError {
    fn from(e: StoreError) -> Self {
        DisputeError::DatabaseError(e.to_string())
    }
}

impl From<WalletError> for DisputeError {
    fn from(e: WalletError) -> Self {
        match e {
            WalletError::DatabaseError(s) => DisputeError::DatabaseError(s),
            other => DisputeError::SystemError(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(DisputeError::AlreadyResolved.code(), "ALREADY_RESOLVED");
        assert_eq!(
            DisputeError::WrongPhase(DisputePhase::AdminReview).to_string(),
            "Action not allowed in phase admin_review"
        );
        assert_eq!(DisputeError::NotAParty.http_status(), 403);
        assert_eq!(
            DisputeError::TransferNotHeld(TransferStatus::Released).http_status(),
            409
        );
    }

    #[test]
    fn test_wallet_error_mapping() {
        assert_eq!(
            DisputeError::from(WalletError::DatabaseError("x".into())),
            DisputeError::DatabaseError("x".into())
        );
        assert_eq!(
            DisputeError::from(WalletError::Overflow).code(),
            "SYSTEM_ERROR"
        );
    }
}
