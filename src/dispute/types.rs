//! Dispute records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::state::{DisputePhase, DisputeStatus};
use crate::core_types::{DisputeId, TransferId, UserId};
use crate::transfer::Transfer;

/// Arbitration wrapper around exactly one transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dispute {
    pub id: DisputeId,
    /// DSP-xxxxxxxx
    pub code: String,
    pub transfer_id: TransferId,
    pub initiated_by: UserId,
    pub reason: String,
    pub status: DisputeStatus,
    pub phase: DisputePhase,
    /// `None` in admin review and once resolved
    pub phase_deadline: Option<DateTime<Utc>>,
    pub admin_id: Option<UserId>,
    pub admin_decision: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewDispute {
    pub code: String,
    pub transfer_id: TransferId,
    pub initiated_by: UserId,
    pub reason: String,
    pub phase_deadline: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl NewDispute {
    pub fn with_id(self, id: DisputeId) -> Dispute {
        Dispute {
            id,
            code: self.code,
            transfer_id: self.transfer_id,
            initiated_by: self.initiated_by,
            reason: self.reason,
            status: DisputeStatus::MutualResolution,
            phase: DisputePhase::MutualResolution,
            phase_deadline: Some(self.phase_deadline),
            admin_id: None,
            admin_decision: None,
            resolved_at: None,
            created_at: self.created_at,
            updated_at: self.created_at,
        }
    }
}

/// Dispute with its transfer loaded
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisputeDetail {
    #[serde(flatten)]
    pub dispute: Dispute,
    pub transfer: Transfer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvidenceKind {
    Text,
    Image,
    File,
}

impl EvidenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvidenceKind::Text => "text",
            EvidenceKind::Image => "image",
            EvidenceKind::File => "file",
        }
    }
}

impl fmt::Display for EvidenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EvidenceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(EvidenceKind::Text),
            "image" => Ok(EvidenceKind::Image),
            "file" => Ok(EvidenceKind::File),
            _ => Err(format!("Invalid evidence kind: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    pub id: u64,
    pub dispute_id: DisputeId,
    pub user_id: UserId,
    pub kind: EvidenceKind,
    /// Text body or file URL
    pub content: String,
    pub file_name: Option<String>,
    pub file_size: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Evidence submission
#[derive(Debug, Clone, Deserialize)]
pub struct NewEvidence {
    #[serde(skip)]
    pub dispute_id: DisputeId,
    #[serde(skip)]
    pub user_id: UserId,
    pub kind: EvidenceKind,
    pub content: String,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub file_size: Option<i64>,
    #[serde(skip, default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl NewEvidence {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            dispute_id: 0,
            user_id: 0,
            kind: EvidenceKind::Text,
            content: content.into(),
            file_name: None,
            file_size: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_id(self, id: u64) -> Evidence {
        Evidence {
            id,
            dispute_id: self.dispute_id,
            user_id: self.user_id,
            kind: self.kind,
            content: self.content,
            file_name: self.file_name,
            file_size: self.file_size,
            created_at: self.created_at,
        }
    }
}

/// Dispute chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: u64,
    pub dispute_id: DisputeId,
    pub user_id: UserId,
    pub body: String,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub dispute_id: DisputeId,
    pub user_id: UserId,
    pub body: String,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

impl NewMessage {
    pub fn with_id(self, id: u64) -> Message {
        Message {
            id,
            dispute_id: self.dispute_id,
            user_id: self.user_id,
            body: self.body,
            is_admin: self.is_admin,
            created_at: self.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_dispute_defaults() {
        let now = Utc::now();
        let d = NewDispute {
            code: "DSP-0000000a".into(),
            transfer_id: 3,
            initiated_by: 2,
            reason: "item not delivered".into(),
            phase_deadline: now,
            created_at: now,
        }
        .with_id(9);

        assert_eq!(d.phase, DisputePhase::MutualResolution);
        assert_eq!(d.status, DisputeStatus::MutualResolution);
        assert_eq!(d.phase_deadline, Some(now));
        assert!(d.admin_id.is_none());
        assert!(d.resolved_at.is_none());
    }

    #[test]
    fn test_evidence_request_deserialize() {
        let ev: NewEvidence = serde_json::from_str(
            r#"{"kind":"image","content":"https://cdn/x.png","file_name":"x.png","file_size":1024}"#,
        )
        .unwrap();
        assert_eq!(ev.kind, EvidenceKind::Image);
        assert_eq!(ev.file_size, Some(1024));
        assert_eq!(ev.dispute_id, 0);
    }
}
