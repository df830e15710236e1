//! Transfer Status Definitions
//!
//! String values match the `transfers.status` column.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Escrow transfer status
///
/// ```text
/// HELD ──┬──> RELEASED
///        ├──> CANCELLED
///        ├──> REFUNDED
///        └──> DISPUTED ──┬──> RELEASED
///                        └──> REFUNDED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    /// Funds debited from sender and held by the system
    Held,
    /// Terminal: credited to receiver
    Released,
    /// Terminal: receiver declined, credited back to sender
    Cancelled,
    /// Terminal: credited back to sender through dispute resolution
    Refunded,
    /// Under arbitration; settled only through the dispute engine
    Disputed,
}

impl TransferStatus {
    /// Check if this is a terminal state (no more transitions possible)
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferStatus::Released | TransferStatus::Cancelled | TransferStatus::Refunded
        )
    }

    /// Whether `self -> next` is an edge of the status graph
    pub fn can_transition_to(&self, next: TransferStatus) -> bool {
        use TransferStatus::*;
        matches!(
            (self, next),
            (Held, Released | Cancelled | Refunded | Disputed) | (Disputed, Released | Refunded)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Held => "held",
            TransferStatus::Released => "released",
            TransferStatus::Cancelled => "cancelled",
            TransferStatus::Refunded => "refunded",
            TransferStatus::Disputed => "disputed",
        }
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransferStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "held" => Ok(TransferStatus::Held),
            "released" => Ok(TransferStatus::Released),
            "cancelled" => Ok(TransferStatus::Cancelled),
            "refunded" => Ok(TransferStatus::Refunded),
            "disputed" => Ok(TransferStatus::Disputed),
            _ => Err(format!("Invalid transfer status: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(TransferStatus::Released.is_terminal());
        assert!(TransferStatus::Cancelled.is_terminal());
        assert!(TransferStatus::Refunded.is_terminal());

        assert!(!TransferStatus::Held.is_terminal());
        assert!(!TransferStatus::Disputed.is_terminal());
    }

    #[test]
    fn test_transitions() {
        use TransferStatus::*;
        assert!(Held.can_transition_to(Released));
        assert!(Held.can_transition_to(Disputed));
        assert!(Disputed.can_transition_to(Refunded));
        assert!(Disputed.can_transition_to(Released));

        assert!(!Disputed.can_transition_to(Cancelled));
        assert!(!Disputed.can_transition_to(Held));
        assert!(!Released.can_transition_to(Refunded));
        assert!(!Cancelled.can_transition_to(Released));
    }

    #[test]
    fn test_invalid_status() {
        assert!("pending".parse::<TransferStatus>().is_err());
        assert_eq!("held".parse::<TransferStatus>(), Ok(TransferStatus::Held));
    }
}
