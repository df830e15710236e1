//! Transfer Core Types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::state::TransferStatus;
use crate::core_types::{Amount, TransferId, UserId};

/// One escrow hold
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub id: TransferId,
    /// TRF-xxxxxxxx
    pub code: String,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    /// Immutable after creation
    pub amount: Amount,
    pub hold_days: u32,
    pub hold_until: DateTime<Utc>,
    pub description: String,
    pub status: TransferStatus,
    pub released_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transfer {
    pub fn is_party(&self, user_id: UserId) -> bool {
        self.sender_id == user_id || self.receiver_id == user_id
    }
}

/// Transfer row before the store assigns its id
#[derive(Debug, Clone)]
pub struct NewTransfer {
    pub code: String,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub amount: Amount,
    pub hold_days: u32,
    pub hold_until: DateTime<Utc>,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl NewTransfer {
    pub fn with_id(self, id: TransferId) -> Transfer {
        Transfer {
            id,
            code: self.code,
            sender_id: self.sender_id,
            receiver_id: self.receiver_id,
            amount: self.amount,
            hold_days: self.hold_days,
            hold_until: self.hold_until,
            description: self.description,
            status: TransferStatus::Held,
            released_at: None,
            created_at: self.created_at,
            updated_at: self.created_at,
        }
    }
}

/// Input for [`TransferEngine::open`](super::TransferEngine::open)
#[derive(Debug, Clone, Deserialize)]
pub struct OpenTransferRequest {
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub amount: Amount,
    pub hold_days: u32,
    #[serde(default)]
    pub description: String,
    pub pin: String,
}

/// Who is driving a release
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Actor {
    User(UserId),
    /// Hold-expiry sweep
    System,
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actor::User(id) => write!(f, "user:{}", id),
            Actor::System => f.write_str("system"),
        }
    }
}

/// Which side of the transfer a listing is filtered on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferRole {
    Sender,
    Receiver,
    #[default]
    Any,
}

#[derive(Debug, Clone)]
pub struct TransferFilter {
    pub user_id: UserId,
    pub role: TransferRole,
    pub status: Option<TransferStatus>,
    pub limit: u32,
    pub offset: u32,
}

impl TransferFilter {
    pub fn for_user(user_id: UserId) -> Self {
        Self {
            user_id,
            role: TransferRole::Any,
            status: None,
            limit: 20,
            offset: 0,
        }
    }

    pub fn matches(&self, transfer: &Transfer) -> bool {
        let role_ok = match self.role {
            TransferRole::Sender => transfer.sender_id == self.user_id,
            TransferRole::Receiver => transfer.receiver_id == self.user_id,
            TransferRole::Any => transfer.is_party(self.user_id),
        };
        role_ok && self.status.is_none_or(|s| s == transfer.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Transfer {
        let now = Utc::now();
        NewTransfer {
            code: "TRF-00000001".into(),
            sender_id: 1,
            receiver_id: 2,
            amount: 1000,
            hold_days: 7,
            hold_until: now,
            description: String::new(),
            created_at: now,
        }
        .with_id(1)
    }

    #[test]
    fn test_new_transfer_starts_held() {
        let t = sample();
        assert_eq!(t.status, TransferStatus::Held);
        assert!(t.released_at.is_none());
    }

    #[test]
    fn test_filter_roles() {
        let t = sample();
        let mut filter = TransferFilter::for_user(2);
        assert!(filter.matches(&t));

        filter.role = TransferRole::Sender;
        assert!(!filter.matches(&t));

        filter.role = TransferRole::Receiver;
        filter.status = Some(TransferStatus::Released);
        assert!(!filter.matches(&t));

        filter.status = Some(TransferStatus::Held);
        assert!(filter.matches(&t));
    }

    #[test]
    fn test_actor_display() {
        assert_eq!(Actor::User(5).to_string(), "user:5");
        assert_eq!(Actor::System.to_string(), "system");
    }
}
