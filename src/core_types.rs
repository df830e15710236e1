//! Core types used throughout the system
//!
//! These are fundamental type aliases used by all modules.
//! They provide semantic meaning and enable future type evolution.

use serde::{Deserialize, Serialize};
use std::fmt;

/// User ID - globally unique, immutable after assignment.
///
/// Owned by the user directory; the core only references it.
pub type UserId = u64;

/// Amount in minor currency units.
///
/// Signed so ledger entries can carry debits as negative values.
/// Balances and transfer amounts are never negative.
pub type Amount = i64;

/// Transfer row ID (store-assigned)
pub type TransferId = u64;

/// Dispute row ID (store-assigned)
pub type DisputeId = u64;

/// Ledger entry row ID (store-assigned)
pub type EntryId = u64;

/// Business object a ledger entry originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Reference {
    Transfer(TransferId),
    Dispute(DisputeId),
    Deposit(u64),
    Withdrawal(u64),
}

impl Reference {
    /// Reference kind as stored in `wallet_transactions.reference_type`
    pub fn kind(&self) -> &'static str {
        match self {
            Reference::Transfer(_) => "transfer",
            Reference::Dispute(_) => "dispute",
            Reference::Deposit(_) => "deposit",
            Reference::Withdrawal(_) => "withdrawal",
        }
    }

    pub fn id(&self) -> u64 {
        match *self {
            Reference::Transfer(id)
            | Reference::Dispute(id)
            | Reference::Deposit(id)
            | Reference::Withdrawal(id) => id,
        }
    }

    /// Rebuild from the stored `(reference_type, reference_id)` pair
    pub fn from_parts(kind: &str, id: u64) -> Option<Self> {
        match kind {
            "transfer" => Some(Reference::Transfer(id)),
            "dispute" => Some(Reference::Dispute(id)),
            "deposit" => Some(Reference::Deposit(id)),
            "withdrawal" => Some(Reference::Withdrawal(id)),
            _ => None,
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.id())
    }
}
