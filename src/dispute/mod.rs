//! Dispute Engine
//!
//! # Phases
//!
//! ```text
//! MUTUAL_RESOLUTION (24h) ──> EVIDENCE (48h) ──> ADMIN_REVIEW ──> RESOLVED
//! ```
//!
//! Deadlines are enforced by [`DisputeEngine::sweep_expired_phases`]. Either
//! open phase may also be escalated straight to admin review, and any
//! unresolved dispute can be settled by an admin ruling or by the losing
//! party conceding (mutual release / mutual refund).
//!
//! # Settlement
//!
//! Credit, transfer status and dispute resolution commit together. A
//! dispute is never recorded resolved without its credit, and vice versa.

pub mod error;
pub mod service;
pub mod state;
pub mod types;


pub use error::DisputeError;
pub use service::{
    DisputeEngine, DisputePolicy, MUTUAL_REFUND_DECISION, MUTUAL_RELEASE_DECISION, Resolution,
};
pub use state::{DisputePhase, DisputeStatus};
pub use types::{
    Dispute, DisputeDetail, Evidence, EvidenceKind, Message, NewDispute, NewEvidence, NewMessage,
};
