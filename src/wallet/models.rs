//! Wallet records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core_types::{Amount, EntryId, Reference, UserId};

/// Per-user wallet. Created lazily, never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub user_id: UserId,
    /// Minor units, never negative
    pub balance: Amount,
    #[serde(skip_serializing)]
    pub pin_hash: Option<String>,
    pub pin_set: bool,
    pub failed_pin_attempts: u32,
    pub pin_locked_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    /// Fresh zero-balance wallet without a PIN
    pub fn new(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            balance: 0,
            pin_hash: None,
            pin_set: false,
            failed_pin_attempts: 0,
            pin_locked_until: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the PIN lockout is in force at `now`
    pub fn is_pin_locked(&self, now: DateTime<Utc>) -> bool {
        self.pin_locked_until.is_some_and(|until| until > now)
    }
}

/// Ledger entry kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletTxKind {
    Deposit,
    Withdrawal,
    TransferOut,
    TransferIn,
    Refund,
    Fee,
}

impl WalletTxKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WalletTxKind::Deposit => "deposit",
            WalletTxKind::Withdrawal => "withdrawal",
            WalletTxKind::TransferOut => "transfer_out",
            WalletTxKind::TransferIn => "transfer_in",
            WalletTxKind::Refund => "refund",
            WalletTxKind::Fee => "fee",
        }
    }
}

impl fmt::Display for WalletTxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WalletTxKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(WalletTxKind::Deposit),
            "withdrawal" => Ok(WalletTxKind::Withdrawal),
            "transfer_out" => Ok(WalletTxKind::TransferOut),
            "transfer_in" => Ok(WalletTxKind::TransferIn),
            "refund" => Ok(WalletTxKind::Refund),
            "fee" => Ok(WalletTxKind::Fee),
            _ => Err(format!("Invalid wallet transaction kind: {}", s)),
        }
    }
}

/// Immutable audit record of one balance mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletTransaction {
    pub id: EntryId,
    pub user_id: UserId,
    pub kind: WalletTxKind,
    /// Positive = credit, negative = debit
    pub amount: Amount,
    pub balance_before: Amount,
    pub balance_after: Amount,
    pub reference: Reference,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Ledger entry before the store assigns its id
#[derive(Debug, Clone)]
pub struct NewWalletEntry {
    pub user_id: UserId,
    pub kind: WalletTxKind,
    pub amount: Amount,
    pub balance_before: Amount,
    pub balance_after: Amount,
    pub reference: Reference,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl NewWalletEntry {
    pub fn with_id(self, id: EntryId) -> WalletTransaction {
        WalletTransaction {
            id,
            user_id: self.user_id,
            kind: self.kind,
            amount: self.amount,
            balance_before: self.balance_before,
            balance_after: self.balance_after,
            reference: self.reference,
            description: self.description,
            created_at: self.created_at,
        }
    }
}

/// PIN state as reported to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PinStatus {
    pub pin_set: bool,
    pub locked_until: Option<DateTime<Utc>>,
    pub failed_attempts: u32,
    pub max_attempts: u32,
}
