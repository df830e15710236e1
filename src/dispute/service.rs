//! Dispute Engine
//!
//! Arbitration layered on a held transfer. Lock order inside every
//! transaction is dispute -> transfer -> wallet.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::error::DisputeError;
use super::state::{DisputePhase, DisputeStatus};
use super::types::{Dispute, DisputeDetail, Evidence, Message, NewDispute, NewEvidence, NewMessage};
use crate::clock::Clock;
use crate::codes::{CodeGenerator, CodeKind, RandomCodeGenerator};
use crate::config::EscrowConfig;
use crate::core_types::{DisputeId, Reference, TransferId, UserId};
use crate::store::{LedgerStore, StoreTx};
use crate::transfer::{Transfer, TransferStatus};
use crate::wallet::{WalletLedger, WalletTxKind};

pub const MUTUAL_RELEASE_DECISION: &str = "Sender released funds mutually";
pub const MUTUAL_REFUND_DECISION: &str = "Receiver agreed to refund";

/// Phase durations
#[derive(Debug, Clone)]
pub struct DisputePolicy {
    pub mutual_resolution: Duration,
    pub evidence: Duration,
}

impl Default for DisputePolicy {
    fn default() -> Self {
        Self::from_config(&EscrowConfig::default())
    }
}

impl DisputePolicy {
    pub fn from_config(cfg: &EscrowConfig) -> Self {
        Self {
            mutual_resolution: Duration::hours(cfg.mutual_resolution_hours),
            evidence: Duration::hours(cfg.evidence_hours),
        }
    }

    fn deadline(&self, phase: DisputePhase, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match phase {
            DisputePhase::MutualResolution => Some(now + self.mutual_resolution),
            DisputePhase::Evidence => Some(now + self.evidence),
            DisputePhase::AdminReview | DisputePhase::Resolved => None,
        }
    }
}

/// Which party receives the held amount
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    ToSender,
    ToReceiver,
}

pub struct DisputeEngine {
    store: Arc<dyn LedgerStore>,
    wallets: Arc<WalletLedger>,
    clock: Arc<dyn Clock>,
    codes: Arc<dyn CodeGenerator>,
    policy: DisputePolicy,
}

impl DisputeEngine {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        wallets: Arc<WalletLedger>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            wallets,
            clock,
            codes: Arc::new(RandomCodeGenerator),
            policy: DisputePolicy::default(),
        }
    }

    pub fn with_codes(mut self, codes: Arc<dyn CodeGenerator>) -> Self {
        self.codes = codes;
        self
    }

    pub fn with_policy(mut self, policy: DisputePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Open a dispute on a held transfer and move the transfer to `disputed`
    pub async fn open(
        &self,
        transfer_id: TransferId,
        initiator: UserId,
        reason: &str,
    ) -> Result<DisputeDetail, DisputeError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(DisputeError::InvalidInput("reason is required".into()));
        }
        let transfer = self.load_transfer(transfer_id).await?;
        if !transfer.is_party(initiator) {
            return Err(DisputeError::NotAParty);
        }

        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let mut transfer = tx
            .transfer_for_update(transfer_id)
            .await?
            .ok_or_else(|| DisputeError::TransferNotFound(transfer_id.to_string()))?;
        if tx.active_dispute_for_transfer(transfer_id).await?.is_some() {
            return Err(DisputeError::DisputeAlreadyActive);
        }
        if transfer.status != TransferStatus::Held {
            return Err(DisputeError::TransferNotHeld(transfer.status));
        }

        let dispute = tx
            .insert_dispute(NewDispute {
                code: self.codes.generate(CodeKind::Dispute),
                transfer_id,
                initiated_by: initiator,
                reason: reason.to_string(),
                phase_deadline: now + self.policy.mutual_resolution,
                created_at: now,
            })
            .await?;

        transfer.status = TransferStatus::Disputed;
        transfer.updated_at = now;
        tx.update_transfer(&transfer).await?;
        tx.commit().await?;

        info!(
            dispute_id = dispute.id,
            transfer_id,
            initiator,
            code = %dispute.code,
            "Dispute opened"
        );
        Ok(DisputeDetail { dispute, transfer })
    }

    /// Evidence is accepted in the mutual resolution and evidence phases only
    pub async fn add_evidence(
        &self,
        dispute_id: DisputeId,
        user_id: UserId,
        mut evidence: NewEvidence,
    ) -> Result<Evidence, DisputeError> {
        let detail = self.get(dispute_id).await?;
        if !detail.transfer.is_party(user_id) {
            return Err(DisputeError::NotAParty);
        }
        let phase = detail.dispute.phase;
        if phase.is_terminal() {
            return Err(DisputeError::AlreadyResolved);
        }
        if !phase.accepts_evidence() {
            return Err(DisputeError::WrongPhase(phase));
        }
        if evidence.content.trim().is_empty() {
            return Err(DisputeError::InvalidInput("evidence content is required".into()));
        }

        evidence.dispute_id = dispute_id;
        evidence.user_id = user_id;
        evidence.created_at = self.clock.now();
        let row = self.store.insert_evidence(evidence).await?;
        debug!(dispute_id, user_id, kind = %row.kind, "Evidence added");
        Ok(row)
    }

    /// Messages are accepted until resolution. Admins need not be a party.
    pub async fn add_message(
        &self,
        dispute_id: DisputeId,
        user_id: UserId,
        body: &str,
        is_admin: bool,
    ) -> Result<Message, DisputeError> {
        let detail = self.get(dispute_id).await?;
        if !is_admin && !detail.transfer.is_party(user_id) {
            return Err(DisputeError::NotAParty);
        }
        if detail.dispute.phase.is_terminal() {
            return Err(DisputeError::AlreadyResolved);
        }
        if body.trim().is_empty() {
            return Err(DisputeError::InvalidInput("message is required".into()));
        }

        let row = self
            .store
            .insert_message(NewMessage {
                dispute_id,
                user_id,
                body: body.to_string(),
                is_admin,
                created_at: self.clock.now(),
            })
            .await?;
        debug!(dispute_id, user_id, is_admin, "Message added");
        Ok(row)
    }

    pub async fn escalate_to_evidence(&self, id: DisputeId) -> Result<Dispute, DisputeError> {
        self.advance(id, DisputePhase::Evidence, false).await
    }

    pub async fn escalate_to_admin(&self, id: DisputeId) -> Result<Dispute, DisputeError> {
        self.advance(id, DisputePhase::AdminReview, false).await
    }

    /// Move a dispute to `to` under its row lock.
    ///
    /// With `only_if_expired` the move happens only if the current phase
    /// deadline has passed and `to` is the phase that follows on expiry.
    async fn advance(
        &self,
        id: DisputeId,
        to: DisputePhase,
        only_if_expired: bool,
    ) -> Result<Dispute, DisputeError> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let mut dispute = self.lock_dispute(tx.as_mut(), id).await?;
        let from = dispute.phase;

        let allowed = match to {
            DisputePhase::Evidence => from == DisputePhase::MutualResolution,
            DisputePhase::AdminReview => from.has_deadline(),
            DisputePhase::MutualResolution | DisputePhase::Resolved => false,
        };
        if !allowed {
            return Err(DisputeError::WrongPhase(from));
        }
        if only_if_expired
            && (from.next_on_expiry() != Some(to)
                || !dispute.phase_deadline.is_some_and(|d| d < now))
        {
            return Err(DisputeError::WrongPhase(from));
        }

        let Some(status) = DisputeStatus::for_open_phase(to) else {
            return Err(DisputeError::WrongPhase(from));
        };
        dispute.phase = to;
        dispute.status = status;
        dispute.phase_deadline = self.policy.deadline(to, now);
        dispute.updated_at = now;
        tx.update_dispute(&dispute).await?;
        tx.commit().await?;

        info!(dispute_id = id, from = %from, to = %to, "Dispute escalated");
        Ok(dispute)
    }

    /// Admin ruling from any unresolved phase
    pub async fn resolve(
        &self,
        id: DisputeId,
        admin_id: UserId,
        resolve_to_sender: bool,
        decision: &str,
    ) -> Result<DisputeDetail, DisputeError> {
        let resolution = if resolve_to_sender {
            Resolution::ToSender
        } else {
            Resolution::ToReceiver
        };
        let current = self.get(id).await?;
        if current.dispute.phase.is_terminal() {
            return Err(DisputeError::AlreadyResolved);
        }
        self.settle(id, resolution, Some(admin_id), decision, |_| Ok(()))
            .await
    }

    /// Sender gives up the claim and pays the receiver
    pub async fn mutual_release(
        &self,
        id: DisputeId,
        sender: UserId,
    ) -> Result<DisputeDetail, DisputeError> {
        let authorize = |t: &Transfer| {
            if t.sender_id == sender {
                Ok(())
            } else {
                Err(DisputeError::Forbidden)
            }
        };
        let current = self.get(id).await?;
        authorize(&current.transfer)?;
        if current.dispute.phase.is_terminal() {
            return Err(DisputeError::AlreadyResolved);
        }
        self.settle(id, Resolution::ToReceiver, None, MUTUAL_RELEASE_DECISION, authorize)
            .await
    }

    /// Receiver agrees to return the funds to the sender
    pub async fn mutual_refund(
        &self,
        id: DisputeId,
        receiver: UserId,
    ) -> Result<DisputeDetail, DisputeError> {
        let authorize = |t: &Transfer| {
            if t.receiver_id == receiver {
                Ok(())
            } else {
                Err(DisputeError::Forbidden)
            }
        };
        let current = self.get(id).await?;
        authorize(&current.transfer)?;
        if current.dispute.phase.is_terminal() {
            return Err(DisputeError::AlreadyResolved);
        }
        self.settle(id, Resolution::ToSender, None, MUTUAL_REFUND_DECISION, authorize)
            .await
    }

    /// Credit, close the transfer and resolve the dispute in one transaction
    async fn settle(
        &self,
        id: DisputeId,
        resolution: Resolution,
        admin_id: Option<UserId>,
        decision: &str,
        authorize: impl FnOnce(&Transfer) -> Result<(), DisputeError>,
    ) -> Result<DisputeDetail, DisputeError> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let mut dispute = self.lock_dispute(tx.as_mut(), id).await?;
        if dispute.phase.is_terminal() {
            return Err(DisputeError::AlreadyResolved);
        }
        let mut transfer = tx
            .transfer_for_update(dispute.transfer_id)
            .await?
            .ok_or_else(|| DisputeError::TransferNotFound(dispute.transfer_id.to_string()))?;
        authorize(&transfer)?;

        let (payee, kind, transfer_status, dispute_status, description) = match resolution {
            Resolution::ToSender => (
                transfer.sender_id,
                WalletTxKind::Refund,
                TransferStatus::Refunded,
                DisputeStatus::ResolvedToSender,
                "Dispute resolved - refund",
            ),
            Resolution::ToReceiver => (
                transfer.receiver_id,
                WalletTxKind::TransferIn,
                TransferStatus::Released,
                DisputeStatus::ResolvedToReceiver,
                "Dispute resolved - released",
            ),
        };
        if !transfer.status.can_transition_to(transfer_status) {
            warn!(
                dispute_id = id,
                transfer_id = transfer.id,
                status = %transfer.status,
                "Disputed transfer already settled"
            );
            return Err(DisputeError::TransferNotHeld(transfer.status));
        }

        self.wallets
            .credit_in(
                tx.as_mut(),
                payee,
                transfer.amount,
                kind,
                Reference::Dispute(id),
                description,
            )
            .await?;

        transfer.status = transfer_status;
        if transfer_status == TransferStatus::Released {
            transfer.released_at = Some(now);
        }
        transfer.updated_at = now;
        tx.update_transfer(&transfer).await?;

        dispute.status = dispute_status;
        dispute.phase = DisputePhase::Resolved;
        dispute.phase_deadline = None;
        dispute.admin_id = admin_id;
        dispute.admin_decision = Some(decision.to_string());
        dispute.resolved_at = Some(now);
        dispute.updated_at = now;
        tx.update_dispute(&dispute).await?;
        tx.commit().await?;

        info!(
            dispute_id = id,
            transfer_id = transfer.id,
            status = %dispute.status,
            payee,
            amount = transfer.amount,
            admin_id = ?admin_id,
            "Dispute resolved"
        );
        Ok(DisputeDetail { dispute, transfer })
    }

    /// Escalate every dispute whose phase deadline has passed. Returns the number escalated.
    pub async fn sweep_expired_phases(&self) -> Result<usize, DisputeError> {
        let expired = self.store.disputes_past_deadline(self.clock.now()).await?;
        let mut escalated = 0;
        for dispute in expired {
            let Some(next) = dispute.phase.next_on_expiry() else {
                continue;
            };
            match self.advance(dispute.id, next, true).await {
                Ok(_) => escalated += 1,
                Err(e) => warn!(
                    dispute_id = dispute.id,
                    error = %e,
                    "Skipping dispute in phase sweep"
                ),
            }
        }
        if escalated > 0 {
            info!(escalated, "Expired dispute phases escalated");
        }
        Ok(escalated)
    }

    pub async fn get(&self, id: DisputeId) -> Result<DisputeDetail, DisputeError> {
        let dispute = self
            .store
            .dispute(id)
            .await?
            .ok_or_else(|| DisputeError::DisputeNotFound(id.to_string()))?;
        self.with_transfer(dispute).await
    }

    pub async fn get_by_code(&self, code: &str) -> Result<DisputeDetail, DisputeError> {
        let dispute = self
            .store
            .dispute_by_code(code)
            .await?
            .ok_or_else(|| DisputeError::DisputeNotFound(code.to_string()))?;
        self.with_transfer(dispute).await
    }

    /// Disputes on transfers the user is party to, newest-first, plus the total count
    pub async fn list_for_user(
        &self,
        user_id: UserId,
        limit: u32,
        offset: u32,
    ) -> Result<(Vec<Dispute>, u64), DisputeError> {
        Ok(self.store.disputes_for_user(user_id, limit, offset).await?)
    }

    pub async fn evidence(&self, id: DisputeId) -> Result<Vec<Evidence>, DisputeError> {
        Ok(self.store.evidence_for(id).await?)
    }

    pub async fn messages(&self, id: DisputeId) -> Result<Vec<Message>, DisputeError> {
        Ok(self.store.messages_for(id).await?)
    }

    async fn with_transfer(&self, dispute: Dispute) -> Result<DisputeDetail, DisputeError> {
        let transfer = self.load_transfer(dispute.transfer_id).await?;
        Ok(DisputeDetail { dispute, transfer })
    }

    async fn load_transfer(&self, id: TransferId) -> Result<Transfer, DisputeError> {
        self.store
            .transfer(id)
            .await?
            .ok_or_else(|| DisputeError::TransferNotFound(id.to_string()))
    }

    async fn lock_dispute(
        &self,
        tx: &mut dyn StoreTx,
        id: DisputeId,
    ) -> Result<Dispute, DisputeError> {
        tx.dispute_for_update(id)
            .await?
            .ok_or_else(|| DisputeError::DisputeNotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_deadlines() {
        let policy = DisputePolicy::default();
        let now = Utc::now();
        assert_eq!(
            policy.deadline(DisputePhase::MutualResolution, now),
            Some(now + Duration::hours(24))
        );
        assert_eq!(
            policy.deadline(DisputePhase::Evidence, now),
            Some(now + Duration::hours(48))
        );
        assert_eq!(policy.deadline(DisputePhase::AdminReview, now), None);
        assert_eq!(policy.deadline(DisputePhase::Resolved, now), None);
    }
}
