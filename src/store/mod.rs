//! Ledger Store
//!
//! Transactional storage the engines run against.
//!
//! # Contract
//!
//! - `begin()` opens a transaction; every `*_for_update` read takes an exclusive
//!   row lock held until `commit()`/`rollback()` (or drop, which rolls back).
//! - Writes inside a transaction are invisible to other callers until commit.
//! - Plain reads on [`LedgerStore`] never lock.
//!
//! Two implementations:
//! - [`MemoryStore`]: in-process tables with real per-row locks
//! - [`PgStore`]: PostgreSQL via sqlx, `SELECT ... FOR UPDATE`

pub mod memory;
pub mod postgres;
pub mod schema;

pub use memory::{MemoryDirectory, MemoryStore};
pub use postgres::{PgStore, PgUserDirectory};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::core_types::{DisputeId, TransferId, UserId};
use crate::dispute::{Dispute, Evidence, Message, NewDispute, NewEvidence, NewMessage};
use crate::transfer::{NewTransfer, Transfer, TransferFilter};
use crate::wallet::{NewWalletEntry, Wallet, WalletTransaction};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt row in {table}: {detail}")]
    Corrupt { table: &'static str, detail: String },

    #[error("Row not found: {0}")]
    RowNotFound(String),
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::Database(_) => "DATABASE_ERROR",
            StoreError::Corrupt { .. } => "CORRUPT_ROW",
            StoreError::RowNotFound(_) => "ROW_NOT_FOUND",
        }
    }
}

/// Non-locking reads and the transaction entry point
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError>;

    /// Fetch a wallet, inserting a zero-balance one on first access
    async fn get_or_create_wallet(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Wallet, StoreError>;

    /// Ledger entries newest-first plus the total count
    async fn wallet_history(
        &self,
        user_id: UserId,
        limit: u32,
        offset: u32,
    ) -> Result<(Vec<WalletTransaction>, u64), StoreError>;

    async fn transfer(&self, id: TransferId) -> Result<Option<Transfer>, StoreError>;

    async fn transfer_by_code(&self, code: &str) -> Result<Option<Transfer>, StoreError>;

    /// Newest-first page plus the total count
    async fn transfers_for_user(
        &self,
        filter: &TransferFilter,
    ) -> Result<(Vec<Transfer>, u64), StoreError>;

    /// `status = held AND hold_until < now`
    async fn expired_held_transfers(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Transfer>, StoreError>;

    async fn dispute(&self, id: DisputeId) -> Result<Option<Dispute>, StoreError>;

    async fn dispute_by_code(&self, code: &str) -> Result<Option<Dispute>, StoreError>;

    /// Disputes on transfers where the user is sender or receiver, newest-first
    async fn disputes_for_user(
        &self,
        user_id: UserId,
        limit: u32,
        offset: u32,
    ) -> Result<(Vec<Dispute>, u64), StoreError>;

    /// Disputes in a deadline phase whose deadline is before `now`
    async fn disputes_past_deadline(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Dispute>, StoreError>;

    async fn insert_evidence(&self, evidence: NewEvidence) -> Result<Evidence, StoreError>;

    /// Oldest-first
    async fn evidence_for(&self, dispute_id: DisputeId) -> Result<Vec<Evidence>, StoreError>;

    async fn insert_message(&self, message: NewMessage) -> Result<Message, StoreError>;

    /// Oldest-first
    async fn messages_for(&self, dispute_id: DisputeId) -> Result<Vec<Message>, StoreError>;
}

/// One open transaction
#[async_trait]
pub trait StoreTx: Send {
    /// Lock the wallet row, creating a zero-balance wallet if absent
    async fn wallet_for_update(
        &mut self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Wallet, StoreError>;

    /// Persist balance and PIN fields
    async fn update_wallet(&mut self, wallet: &Wallet) -> Result<(), StoreError>;

    async fn append_entry(
        &mut self,
        entry: NewWalletEntry,
    ) -> Result<WalletTransaction, StoreError>;

    async fn transfer_for_update(
        &mut self,
        id: TransferId,
    ) -> Result<Option<Transfer>, StoreError>;

    async fn insert_transfer(&mut self, transfer: NewTransfer) -> Result<Transfer, StoreError>;

    /// Persist status, `released_at` and `updated_at`. The amount is never rewritten.
    async fn update_transfer(&mut self, transfer: &Transfer) -> Result<(), StoreError>;

    async fn dispute_for_update(&mut self, id: DisputeId)
    -> Result<Option<Dispute>, StoreError>;

    /// Active dispute for a transfer as seen by this transaction
    async fn active_dispute_for_transfer(
        &mut self,
        transfer_id: TransferId,
    ) -> Result<Option<Dispute>, StoreError>;

    async fn insert_dispute(&mut self, dispute: NewDispute) -> Result<Dispute, StoreError>;

    async fn update_dispute(&mut self, dispute: &Dispute) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

/// User directory lookup, used to validate a transfer's receiver
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn exists(&self, user_id: UserId) -> Result<bool, StoreError>;
}
