//! Dispute phase and status definitions

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Arbitration phase
///
/// ```text
/// MUTUAL_RESOLUTION (24h) ──> EVIDENCE (48h) ──> ADMIN_REVIEW ──> RESOLVED
///         │                        │                                 ▲
///         └────────────────────────┴──── mutual release / refund ────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputePhase {
    MutualResolution,
    Evidence,
    AdminReview,
    Resolved,
}

impl DisputePhase {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, DisputePhase::Resolved)
    }

    /// Phases whose deadline is enforced by the sweep
    #[inline]
    pub fn has_deadline(&self) -> bool {
        matches!(self, DisputePhase::MutualResolution | DisputePhase::Evidence)
    }

    /// Parties may still submit evidence
    #[inline]
    pub fn accepts_evidence(&self) -> bool {
        self.has_deadline()
    }

    /// Phase reached when the current deadline expires
    pub fn next_on_expiry(&self) -> Option<DisputePhase> {
        match self {
            DisputePhase::MutualResolution => Some(DisputePhase::Evidence),
            DisputePhase::Evidence => Some(DisputePhase::AdminReview),
            DisputePhase::AdminReview | DisputePhase::Resolved => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DisputePhase::MutualResolution => "mutual_resolution",
            DisputePhase::Evidence => "evidence_phase",
            DisputePhase::AdminReview => "admin_review",
            DisputePhase::Resolved => "resolved",
        }
    }
}

impl fmt::Display for DisputePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DisputePhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mutual_resolution" => Ok(DisputePhase::MutualResolution),
            "evidence_phase" => Ok(DisputePhase::Evidence),
            "admin_review" => Ok(DisputePhase::AdminReview),
            "resolved" => Ok(DisputePhase::Resolved),
            _ => Err(format!("Invalid dispute phase: {}", s)),
        }
    }
}

/// Reporting status, derived from the phase plus the outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeStatus {
    MutualResolution,
    EvidencePhase,
    UnderReview,
    ResolvedToSender,
    ResolvedToReceiver,
}

impl DisputeStatus {
    /// Not one of the two resolved values
    #[inline]
    pub fn is_active(&self) -> bool {
        !matches!(
            self,
            DisputeStatus::ResolvedToSender | DisputeStatus::ResolvedToReceiver
        )
    }

    /// Status shown while a dispute sits in an open phase
    pub fn for_open_phase(phase: DisputePhase) -> Option<Self> {
        match phase {
            DisputePhase::MutualResolution => Some(DisputeStatus::MutualResolution),
            DisputePhase::Evidence => Some(DisputeStatus::EvidencePhase),
            DisputePhase::AdminReview => Some(DisputeStatus::UnderReview),
            DisputePhase::Resolved => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DisputeStatus::MutualResolution => "mutual_resolution",
            DisputeStatus::EvidencePhase => "evidence_phase",
            DisputeStatus::UnderReview => "under_review",
            DisputeStatus::ResolvedToSender => "resolved_to_sender",
            DisputeStatus::ResolvedToReceiver => "resolved_to_receiver",
        }
    }
}

impl fmt::Display for DisputeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DisputeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mutual_resolution" => Ok(DisputeStatus::MutualResolution),
            "evidence_phase" => Ok(DisputeStatus::EvidencePhase),
            "under_review" => Ok(DisputeStatus::UnderReview),
            "resolved_to_sender" => Ok(DisputeStatus::ResolvedToSender),
            "resolved_to_receiver" => Ok(DisputeStatus::ResolvedToReceiver),
            _ => Err(format!("Invalid dispute status: {}", s)),
        }
    }
}
