//! PostgreSQL ledger store
//!
//! Row locks are `SELECT ... FOR UPDATE` inside a `sqlx::Transaction`.
//! Ids are BIGSERIAL and mapped to `u64` at the boundary.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::{Postgres, Row, Transaction};

use super::{LedgerStore, StoreError, StoreTx, UserDirectory};
use crate::core_types::{DisputeId, Reference, TransferId, UserId};
use crate::dispute::{
    Dispute, DisputePhase, DisputeStatus, Evidence, EvidenceKind, Message, NewDispute,
    NewEvidence, NewMessage,
};
use crate::transfer::{NewTransfer, Transfer, TransferFilter, TransferRole, TransferStatus};
use crate::wallet::{NewWalletEntry, Wallet, WalletTransaction, WalletTxKind};

const WALLET_COLUMNS: &str = "user_id, balance, pin_hash, pin_set, failed_pin_attempts, \
     pin_locked_until, created_at, updated_at";

const ENTRY_COLUMNS: &str = "id, user_id, kind, amount, balance_before, balance_after, \
     reference_type, reference_id, description, created_at";

const TRANSFER_COLUMNS: &str = "id, code, sender_id, receiver_id, amount, hold_days, hold_until, \
     description, status, released_at, created_at, updated_at";

const DISPUTE_COLUMNS: &str = "id, code, transfer_id, initiated_by, reason, status, phase, \
     phase_deadline, admin_id, admin_decision, resolved_at, created_at, updated_at";

fn parse_col<T: std::str::FromStr<Err = String>>(
    table: &'static str,
    raw: &str,
) -> Result<T, StoreError> {
    raw.parse()
        .map_err(|detail| StoreError::Corrupt { table, detail })
}

fn wallet_from_row(row: &PgRow) -> Result<Wallet, StoreError> {
    Ok(Wallet {
        user_id: row.try_get::<i64, _>("user_id")? as u64,
        balance: row.try_get("balance")?,
        pin_hash: row.try_get("pin_hash")?,
        pin_set: row.try_get("pin_set")?,
        failed_pin_attempts: row.try_get::<i32, _>("failed_pin_attempts")? as u32,
        pin_locked_until: row.try_get("pin_locked_until")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn entry_from_row(row: &PgRow) -> Result<WalletTransaction, StoreError> {
    let ref_type: String = row.try_get("reference_type")?;
    let ref_id = row.try_get::<i64, _>("reference_id")? as u64;
    let reference =
        Reference::from_parts(&ref_type, ref_id).ok_or_else(|| StoreError::Corrupt {
            table: "wallet_transactions",
            detail: format!("unknown reference type {}", ref_type),
        })?;
    let kind: String = row.try_get("kind")?;
    Ok(WalletTransaction {
        id: row.try_get::<i64, _>("id")? as u64,
        user_id: row.try_get::<i64, _>("user_id")? as u64,
        kind: parse_col::<WalletTxKind>("wallet_transactions", &kind)?,
        amount: row.try_get("amount")?,
        balance_before: row.try_get("balance_before")?,
        balance_after: row.try_get("balance_after")?,
        reference,
        description: row.try_get("description")?,
        created_at: row.try_get("created_at")?,
    })
}

fn transfer_from_row(row: &PgRow) -> Result<Transfer, StoreError> {
    let status: String = row.try_get("status")?;
    Ok(Transfer {
        id: row.try_get::<i64, _>("id")? as u64,
        code: row.try_get("code")?,
        sender_id: row.try_get::<i64, _>("sender_id")? as u64,
        receiver_id: row.try_get::<i64, _>("receiver_id")? as u64,
        amount: row.try_get("amount")?,
        hold_days: row.try_get::<i32, _>("hold_days")? as u32,
        hold_until: row.try_get("hold_until")?,
        description: row.try_get("description")?,
        status: parse_col::<TransferStatus>("transfers", &status)?,
        released_at: row.try_get("released_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn dispute_from_row(row: &PgRow) -> Result<Dispute, StoreError> {
    let status: String = row.try_get("status")?;
    let phase: String = row.try_get("phase")?;
    Ok(Dispute {
        id: row.try_get::<i64, _>("id")? as u64,
        code: row.try_get("code")?,
        transfer_id: row.try_get::<i64, _>("transfer_id")? as u64,
        initiated_by: row.try_get::<i64, _>("initiated_by")? as u64,
        reason: row.try_get("reason")?,
        status: parse_col::<DisputeStatus>("disputes", &status)?,
        phase: parse_col::<DisputePhase>("disputes", &phase)?,
        phase_deadline: row.try_get("phase_deadline")?,
        admin_id: row.try_get::<Option<i64>, _>("admin_id")?.map(|v| v as u64),
        admin_decision: row.try_get("admin_decision")?,
        resolved_at: row.try_get("resolved_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn evidence_from_row(row: &PgRow) -> Result<Evidence, StoreError> {
    let kind: String = row.try_get("kind")?;
    Ok(Evidence {
        id: row.try_get::<i64, _>("id")? as u64,
        dispute_id: row.try_get::<i64, _>("dispute_id")? as u64,
        user_id: row.try_get::<i64, _>("user_id")? as u64,
        kind: parse_col::<EvidenceKind>("dispute_evidence", &kind)?,
        content: row.try_get("content")?,
        file_name: row.try_get("file_name")?,
        file_size: row.try_get("file_size")?,
        created_at: row.try_get("created_at")?,
    })
}

fn message_from_row(row: &PgRow) -> Result<Message, StoreError> {
    Ok(Message {
        id: row.try_get::<i64, _>("id")? as u64,
        dispute_id: row.try_get::<i64, _>("dispute_id")? as u64,
        user_id: row.try_get::<i64, _>("user_id")? as u64,
        body: row.try_get("body")?,
        is_admin: row.try_get("is_admin")?,
        created_at: row.try_get("created_at")?,
    })
}

fn collect<T>(
    rows: &[PgRow],
    map: fn(&PgRow) -> Result<T, StoreError>,
) -> Result<Vec<T>, StoreError> {
    rows.iter().map(map).collect()
}

/// PostgreSQL-backed [`LedgerStore`]
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl LedgerStore for PgStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTx { tx }))
    }

    async fn get_or_create_wallet(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Wallet, StoreError> {
        sqlx::query(
            "INSERT INTO wallets (user_id, created_at, updated_at) VALUES ($1, $2, $2) \
             ON CONFLICT (user_id) DO NOTHING",
        )
        .bind(user_id as i64)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query(&format!(
            "SELECT {} FROM wallets WHERE user_id = $1",
            WALLET_COLUMNS
        ))
        .bind(user_id as i64)
        .fetch_one(&self.pool)
        .await?;
        wallet_from_row(&row)
    }

    async fn wallet_history(
        &self,
        user_id: UserId,
        limit: u32,
        offset: u32,
    ) -> Result<(Vec<WalletTransaction>, u64), StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM wallet_transactions WHERE user_id = $1 \
             ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3",
            ENTRY_COLUMNS
        ))
        .bind(user_id as i64)
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM wallet_transactions WHERE user_id = $1")
                .bind(user_id as i64)
                .fetch_one(&self.pool)
                .await?;

        Ok((collect(&rows, entry_from_row)?, total as u64))
    }

    async fn transfer(&self, id: TransferId) -> Result<Option<Transfer>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM transfers WHERE id = $1",
            TRANSFER_COLUMNS
        ))
        .bind(id as i64)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(transfer_from_row).transpose()
    }

    async fn transfer_by_code(&self, code: &str) -> Result<Option<Transfer>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM transfers WHERE code = $1",
            TRANSFER_COLUMNS
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(transfer_from_row).transpose()
    }

    async fn transfers_for_user(
        &self,
        filter: &TransferFilter,
    ) -> Result<(Vec<Transfer>, u64), StoreError> {
        let party = match filter.role {
            TransferRole::Sender => "sender_id = $1",
            TransferRole::Receiver => "receiver_id = $1",
            TransferRole::Any => "(sender_id = $1 OR receiver_id = $1)",
        };
        let predicate = format!("{} AND ($2::TEXT IS NULL OR status = $2)", party);
        let status = filter.status.map(|s| s.as_str());

        let rows = sqlx::query(&format!(
            "SELECT {} FROM transfers WHERE {} ORDER BY created_at DESC, id DESC \
             LIMIT $3 OFFSET $4",
            TRANSFER_COLUMNS, predicate
        ))
        .bind(filter.user_id as i64)
        .bind(status)
        .bind(filter.limit as i64)
        .bind(filter.offset as i64)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(*) FROM transfers WHERE {}", predicate))
                .bind(filter.user_id as i64)
                .bind(status)
                .fetch_one(&self.pool)
                .await?;

        Ok((collect(&rows, transfer_from_row)?, total as u64))
    }

    async fn expired_held_transfers(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Transfer>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM transfers WHERE status = $1 AND hold_until < $2 ORDER BY id",
            TRANSFER_COLUMNS
        ))
        .bind(TransferStatus::Held.as_str())
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        collect(&rows, transfer_from_row)
    }

    async fn dispute(&self, id: DisputeId) -> Result<Option<Dispute>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM disputes WHERE id = $1",
            DISPUTE_COLUMNS
        ))
        .bind(id as i64)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(dispute_from_row).transpose()
    }

    async fn dispute_by_code(&self, code: &str) -> Result<Option<Dispute>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM disputes WHERE code = $1",
            DISPUTE_COLUMNS
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(dispute_from_row).transpose()
    }

    async fn disputes_for_user(
        &self,
        user_id: UserId,
        limit: u32,
        offset: u32,
    ) -> Result<(Vec<Dispute>, u64), StoreError> {
        let rows = sqlx::query(
            "SELECT d.id, d.code, d.transfer_id, d.initiated_by, d.reason, d.status, d.phase, \
                    d.phase_deadline, d.admin_id, d.admin_decision, d.resolved_at, \
                    d.created_at, d.updated_at \
             FROM disputes d JOIN transfers t ON t.id = d.transfer_id \
             WHERE t.sender_id = $1 OR t.receiver_id = $1 \
             ORDER BY d.created_at DESC, d.id DESC LIMIT $2 OFFSET $3",
        )
        .bind(user_id as i64)
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM disputes d JOIN transfers t ON t.id = d.transfer_id \
             WHERE t.sender_id = $1 OR t.receiver_id = $1",
        )
        .bind(user_id as i64)
        .fetch_one(&self.pool)
        .await?;

        Ok((collect(&rows, dispute_from_row)?, total as u64))
    }

    async fn disputes_past_deadline(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Dispute>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM disputes WHERE phase IN ($1, $2) AND phase_deadline < $3 ORDER BY id",
            DISPUTE_COLUMNS
        ))
        .bind(DisputePhase::MutualResolution.as_str())
        .bind(DisputePhase::Evidence.as_str())
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        collect(&rows, dispute_from_row)
    }

    async fn insert_evidence(&self, evidence: NewEvidence) -> Result<Evidence, StoreError> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO dispute_evidence \
             (dispute_id, user_id, kind, content, file_name, file_size, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING id",
        )
        .bind(evidence.dispute_id as i64)
        .bind(evidence.user_id as i64)
        .bind(evidence.kind.as_str())
        .bind(&evidence.content)
        .bind(&evidence.file_name)
        .bind(evidence.file_size)
        .bind(evidence.created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(evidence.with_id(id as u64))
    }

    async fn evidence_for(&self, dispute_id: DisputeId) -> Result<Vec<Evidence>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, dispute_id, user_id, kind, content, file_name, file_size, created_at \
             FROM dispute_evidence WHERE dispute_id = $1 ORDER BY created_at, id",
        )
        .bind(dispute_id as i64)
        .fetch_all(&self.pool)
        .await?;
        collect(&rows, evidence_from_row)
    }

    async fn insert_message(&self, message: NewMessage) -> Result<Message, StoreError> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO dispute_messages (dispute_id, user_id, body, is_admin, created_at) \
             VALUES ($1, $2, $3, $4, $5) RETURNING id",
        )
        .bind(message.dispute_id as i64)
        .bind(message.user_id as i64)
        .bind(&message.body)
        .bind(message.is_admin)
        .bind(message.created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(message.with_id(id as u64))
    }

    async fn messages_for(&self, dispute_id: DisputeId) -> Result<Vec<Message>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, dispute_id, user_id, body, is_admin, created_at \
             FROM dispute_messages WHERE dispute_id = $1 ORDER BY created_at, id",
        )
        .bind(dispute_id as i64)
        .fetch_all(&self.pool)
        .await?;
        collect(&rows, message_from_row)
    }
}

struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgTx {
    async fn wallet_for_update(
        &mut self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Wallet, StoreError> {
        sqlx::query(
            "INSERT INTO wallets (user_id, created_at, updated_at) VALUES ($1, $2, $2) \
             ON CONFLICT (user_id) DO NOTHING",
        )
        .bind(user_id as i64)
        .bind(now)
        .execute(&mut *self.tx)
        .await?;

        let row = sqlx::query(&format!(
            "SELECT {} FROM wallets WHERE user_id = $1 FOR UPDATE",
            WALLET_COLUMNS
        ))
        .bind(user_id as i64)
        .fetch_one(&mut *self.tx)
        .await?;
        wallet_from_row(&row)
    }

    async fn update_wallet(&mut self, wallet: &Wallet) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE wallets SET balance = $2, pin_hash = $3, pin_set = $4, \
             failed_pin_attempts = $5, pin_locked_until = $6, updated_at = $7 \
             WHERE user_id = $1",
        )
        .bind(wallet.user_id as i64)
        .bind(wallet.balance)
        .bind(&wallet.pin_hash)
        .bind(wallet.pin_set)
        .bind(wallet.failed_pin_attempts as i32)
        .bind(wallet.pin_locked_until)
        .bind(wallet.updated_at)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::RowNotFound(format!("wallet {}", wallet.user_id)));
        }
        Ok(())
    }

    async fn append_entry(
        &mut self,
        entry: NewWalletEntry,
    ) -> Result<WalletTransaction, StoreError> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO wallet_transactions \
             (user_id, kind, amount, balance_before, balance_after, reference_type, \
              reference_id, description, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING id",
        )
        .bind(entry.user_id as i64)
        .bind(entry.kind.as_str())
        .bind(entry.amount)
        .bind(entry.balance_before)
        .bind(entry.balance_after)
        .bind(entry.reference.kind())
        .bind(entry.reference.id() as i64)
        .bind(&entry.description)
        .bind(entry.created_at)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(entry.with_id(id as u64))
    }

    async fn transfer_for_update(
        &mut self,
        id: TransferId,
    ) -> Result<Option<Transfer>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM transfers WHERE id = $1 FOR UPDATE",
            TRANSFER_COLUMNS
        ))
        .bind(id as i64)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.as_ref().map(transfer_from_row).transpose()
    }

    async fn insert_transfer(&mut self, transfer: NewTransfer) -> Result<Transfer, StoreError> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO transfers \
             (code, sender_id, receiver_id, amount, hold_days, hold_until, description, \
              status, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9) RETURNING id",
        )
        .bind(&transfer.code)
        .bind(transfer.sender_id as i64)
        .bind(transfer.receiver_id as i64)
        .bind(transfer.amount)
        .bind(transfer.hold_days as i32)
        .bind(transfer.hold_until)
        .bind(&transfer.description)
        .bind(TransferStatus::Held.as_str())
        .bind(transfer.created_at)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(transfer.with_id(id as u64))
    }

    async fn update_transfer(&mut self, transfer: &Transfer) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE transfers SET status = $2, released_at = $3, updated_at = $4 WHERE id = $1",
        )
        .bind(transfer.id as i64)
        .bind(transfer.status.as_str())
        .bind(transfer.released_at)
        .bind(transfer.updated_at)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::RowNotFound(format!("transfer {}", transfer.id)));
        }
        Ok(())
    }

    async fn dispute_for_update(
        &mut self,
        id: DisputeId,
    ) -> Result<Option<Dispute>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM disputes WHERE id = $1 FOR UPDATE",
            DISPUTE_COLUMNS
        ))
        .bind(id as i64)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.as_ref().map(dispute_from_row).transpose()
    }

    async fn active_dispute_for_transfer(
        &mut self,
        transfer_id: TransferId,
    ) -> Result<Option<Dispute>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM disputes WHERE transfer_id = $1 AND status NOT IN ($2, $3) LIMIT 1",
            DISPUTE_COLUMNS
        ))
        .bind(transfer_id as i64)
        .bind(DisputeStatus::ResolvedToSender.as_str())
        .bind(DisputeStatus::ResolvedToReceiver.as_str())
        .fetch_optional(&mut *self.tx)
        .await?;
        row.as_ref().map(dispute_from_row).transpose()
    }

    async fn insert_dispute(&mut self, dispute: NewDispute) -> Result<Dispute, StoreError> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO disputes \
             (code, transfer_id, initiated_by, reason, status, phase, phase_deadline, \
              created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8) RETURNING id",
        )
        .bind(&dispute.code)
        .bind(dispute.transfer_id as i64)
        .bind(dispute.initiated_by as i64)
        .bind(&dispute.reason)
        .bind(DisputeStatus::MutualResolution.as_str())
        .bind(DisputePhase::MutualResolution.as_str())
        .bind(dispute.phase_deadline)
        .bind(dispute.created_at)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(dispute.with_id(id as u64))
    }

    async fn update_dispute(&mut self, dispute: &Dispute) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE disputes SET status = $2, phase = $3, phase_deadline = $4, admin_id = $5, \
             admin_decision = $6, resolved_at = $7, updated_at = $8 WHERE id = $1",
        )
        .bind(dispute.id as i64)
        .bind(dispute.status.as_str())
        .bind(dispute.phase.as_str())
        .bind(dispute.phase_deadline)
        .bind(dispute.admin_id.map(|v| v as i64))
        .bind(&dispute.admin_decision)
        .bind(dispute.resolved_at)
        .bind(dispute.updated_at)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::RowNotFound(format!("dispute {}", dispute.id)));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

/// Receiver lookup against the `users` table
#[derive(Clone)]
pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn exists(&self, user_id: UserId) -> Result<bool, StoreError> {
        let found: Option<i32> = sqlx::query_scalar("SELECT 1 FROM users WHERE user_id = $1")
            .bind(user_id as i64)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }
}
