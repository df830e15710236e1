//! Transfer Engine
//!
//! Escrow lifecycle of a single payer -> payee transfer.
//!
//! Settlement re-reads the transfer under its row lock and re-checks
//! `status == held` inside the transaction that performs the credit. The
//! unlocked read beforehand only short-circuits obvious failures.

use chrono::Duration;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::error::TransferError;
use super::state::TransferStatus;
use super::types::{Actor, NewTransfer, OpenTransferRequest, Transfer, TransferFilter};
use crate::clock::Clock;
use crate::codes::{CodeGenerator, CodeKind, RandomCodeGenerator};
use crate::core_types::{Reference, TransferId, UserId};
use crate::store::{LedgerStore, UserDirectory};
use crate::wallet::{WalletLedger, WalletTxKind};

/// Validated hold period
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HoldPeriod(u32);

impl HoldPeriod {
    pub const DEFAULT_TIERS: [u32; 2] = [7, 30];

    pub fn parse(days: u32, tiers: &[u32]) -> Result<Self, TransferError> {
        if tiers.contains(&days) {
            Ok(Self(days))
        } else {
            Err(TransferError::InvalidHoldPeriod(days))
        }
    }

    pub fn days(&self) -> u32 {
        self.0
    }

    pub fn duration(&self) -> Duration {
        Duration::days(self.0 as i64)
    }
}

pub struct TransferEngine {
    store: Arc<dyn LedgerStore>,
    wallets: Arc<WalletLedger>,
    users: Arc<dyn UserDirectory>,
    clock: Arc<dyn Clock>,
    codes: Arc<dyn CodeGenerator>,
    hold_tiers: Vec<u32>,
}

impl TransferEngine {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        wallets: Arc<WalletLedger>,
        users: Arc<dyn UserDirectory>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            wallets,
            users,
            clock,
            codes: Arc::new(RandomCodeGenerator),
            hold_tiers: HoldPeriod::DEFAULT_TIERS.to_vec(),
        }
    }

    pub fn with_codes(mut self, codes: Arc<dyn CodeGenerator>) -> Self {
        self.codes = codes;
        self
    }

    pub fn with_hold_tiers(mut self, tiers: Vec<u32>) -> Self {
        self.hold_tiers = tiers;
        self
    }

    /// Debit the sender and put the amount on hold
    pub async fn open(&self, req: OpenTransferRequest) -> Result<Transfer, TransferError> {
        if req.sender_id == req.receiver_id {
            return Err(TransferError::SelfTransfer);
        }
        if req.amount <= 0 {
            return Err(TransferError::InvalidAmount);
        }
        let hold = HoldPeriod::parse(req.hold_days, &self.hold_tiers)?;

        if !self.wallets.verify_pin(req.sender_id, &req.pin).await? {
            return Err(TransferError::InvalidPin);
        }
        if self.wallets.balance(req.sender_id).await? < req.amount {
            return Err(TransferError::InsufficientBalance);
        }
        if !self.users.exists(req.receiver_id).await? {
            return Err(TransferError::ReceiverNotFound);
        }

        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let transfer = tx
            .insert_transfer(NewTransfer {
                code: self.codes.generate(CodeKind::Transfer),
                sender_id: req.sender_id,
                receiver_id: req.receiver_id,
                amount: req.amount,
                hold_days: hold.days(),
                hold_until: now + hold.duration(),
                description: req.description,
                created_at: now,
            })
            .await?;

        // Authoritative balance check happens under the wallet lock here
        self.wallets
            .debit_in(
                tx.as_mut(),
                transfer.sender_id,
                transfer.amount,
                WalletTxKind::TransferOut,
                Reference::Transfer(transfer.id),
                &format!("Transfer {} to user {}", transfer.code, transfer.receiver_id),
            )
            .await?;
        tx.commit().await?;

        info!(
            transfer_id = transfer.id,
            code = %transfer.code,
            sender_id = transfer.sender_id,
            receiver_id = transfer.receiver_id,
            amount = transfer.amount,
            hold_until = %transfer.hold_until,
            "Transfer held"
        );
        Ok(transfer)
    }

    /// Pay the held amount to the receiver. Sender or the expiry sweep only.
    pub async fn release(&self, id: TransferId, actor: Actor) -> Result<Transfer, TransferError> {
        let current = self.get(id).await?;
        if matches!(actor, Actor::User(user_id) if user_id != current.sender_id) {
            return Err(TransferError::Forbidden);
        }
        if current.status != TransferStatus::Held {
            return Err(TransferError::NotHeld(current.status));
        }

        let transfer = self
            .settle(
                id,
                TransferStatus::Released,
                WalletTxKind::TransferIn,
                |t| (t.receiver_id, format!("Transfer {} released", t.code)),
            )
            .await?;
        info!(transfer_id = id, actor = %actor, amount = transfer.amount, "Transfer released");
        Ok(transfer)
    }

    /// Return the held amount to the sender. Receiver only.
    pub async fn cancel(&self, id: TransferId, actor: UserId) -> Result<Transfer, TransferError> {
        let current = self.get(id).await?;
        if actor != current.receiver_id {
            return Err(TransferError::Forbidden);
        }
        if current.status != TransferStatus::Held {
            return Err(TransferError::NotHeld(current.status));
        }

        let transfer = self
            .settle(id, TransferStatus::Cancelled, WalletTxKind::Refund, |t| {
                (t.sender_id, format!("Transfer {} cancelled by receiver", t.code))
            })
            .await?;
        info!(transfer_id = id, actor, amount = transfer.amount, "Transfer cancelled");
        Ok(transfer)
    }

    /// Lock, re-check held, credit the payee and close the transfer in one transaction
    async fn settle(
        &self,
        id: TransferId,
        to: TransferStatus,
        kind: WalletTxKind,
        payee: impl FnOnce(&Transfer) -> (UserId, String),
    ) -> Result<Transfer, TransferError> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let mut transfer = tx
            .transfer_for_update(id)
            .await?
            .ok_or_else(|| TransferError::TransferNotFound(id.to_string()))?;
        if transfer.status != TransferStatus::Held {
            debug!(transfer_id = id, status = %transfer.status, "Lost settlement race");
            return Err(TransferError::NotHeld(transfer.status));
        }

        let (user_id, description) = payee(&transfer);
        self.wallets
            .credit_in(
                tx.as_mut(),
                user_id,
                transfer.amount,
                kind,
                Reference::Transfer(id),
                &description,
            )
            .await?;

        transfer.status = to;
        if to == TransferStatus::Released {
            transfer.released_at = Some(now);
        }
        transfer.updated_at = now;
        tx.update_transfer(&transfer).await?;
        tx.commit().await?;
        Ok(transfer)
    }

    /// Release every held transfer whose hold has expired. Returns the number released.
    pub async fn sweep_expired(&self) -> Result<usize, TransferError> {
        let expired = self.store.expired_held_transfers(self.clock.now()).await?;
        let mut released = 0;
        for transfer in expired {
            match self.release(transfer.id, Actor::System).await {
                Ok(_) => released += 1,
                Err(e) => warn!(
                    transfer_id = transfer.id,
                    error = %e,
                    "Skipping transfer in expiry sweep"
                ),
            }
        }
        if released > 0 {
            info!(released, "Expired holds released");
        }
        Ok(released)
    }

    pub async fn get(&self, id: TransferId) -> Result<Transfer, TransferError> {
        self.store
            .transfer(id)
            .await?
            .ok_or_else(|| TransferError::TransferNotFound(id.to_string()))
    }

    pub async fn get_by_code(&self, code: &str) -> Result<Transfer, TransferError> {
        self.store
            .transfer_by_code(code)
            .await?
            .ok_or_else(|| TransferError::TransferNotFound(code.to_string()))
    }

    /// Newest-first page plus the total count
    pub async fn list_for_user(
        &self,
        filter: &TransferFilter,
    ) -> Result<(Vec<Transfer>, u64), TransferError> {
        Ok(self.store.transfers_for_user(filter).await?)
    }
}
