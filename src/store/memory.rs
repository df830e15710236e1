//! In-process ledger store
//!
//! Committed rows live in one table set behind a short-lived mutex. A
//! transaction buffers its writes and holds one async mutex per locked row
//! until it commits or is dropped, which gives the same serialization as
//! `SELECT ... FOR UPDATE` on a relational store.
//!
//! Lock order used by the engines: dispute -> transfer -> wallet.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex as RowMutex, OwnedMutexGuard};

use super::{LedgerStore, StoreError, StoreTx, UserDirectory};
use crate::core_types::{DisputeId, TransferId, UserId};
use crate::dispute::{Dispute, Evidence, Message, NewDispute, NewEvidence, NewMessage};
use crate::transfer::{NewTransfer, Transfer, TransferFilter, TransferStatus};
use crate::wallet::{NewWalletEntry, Wallet, WalletTransaction};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum RowKey {
    Wallet(UserId),
    Transfer(TransferId),
    Dispute(DisputeId),
}

#[derive(Default)]
struct Tables {
    wallets: HashMap<UserId, Wallet>,
    entries: Vec<WalletTransaction>,
    transfers: BTreeMap<TransferId, Transfer>,
    disputes: BTreeMap<DisputeId, Dispute>,
    evidence: Vec<Evidence>,
    messages: Vec<Message>,
}

#[derive(Default)]
struct Sequences {
    entry: AtomicU64,
    transfer: AtomicU64,
    dispute: AtomicU64,
    evidence: AtomicU64,
    message: AtomicU64,
}

fn next(seq: &AtomicU64) -> u64 {
    seq.fetch_add(1, Ordering::SeqCst) + 1
}

#[derive(Default)]
struct Inner {
    tables: Mutex<Tables>,
    row_locks: DashMap<RowKey, Arc<RowMutex<()>>>,
    seq: Sequences,
}

/// In-memory [`LedgerStore`]
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every ledger entry ever committed, in commit order
    pub fn all_entries(&self) -> Vec<WalletTransaction> {
        self.inner.tables.lock().entries.clone()
    }
}

fn page<T: Clone>(rows: &[T], limit: u32, offset: u32) -> Vec<T> {
    rows.iter()
        .skip(offset as usize)
        .take(limit as usize)
        .cloned()
        .collect()
}

fn is_active_for(dispute: &Dispute, transfer_id: TransferId) -> bool {
    dispute.transfer_id == transfer_id && dispute.status.is_active()
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        Ok(Box::new(MemoryTx {
            inner: Arc::clone(&self.inner),
            guards: Vec::new(),
            held: HashSet::new(),
            writes: WriteSet::default(),
        }))
    }

    async fn get_or_create_wallet(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Wallet, StoreError> {
        let mut tables = self.inner.tables.lock();
        Ok(tables
            .wallets
            .entry(user_id)
            .or_insert_with(|| Wallet::new(user_id, now))
            .clone())
    }

    async fn wallet_history(
        &self,
        user_id: UserId,
        limit: u32,
        offset: u32,
    ) -> Result<(Vec<WalletTransaction>, u64), StoreError> {
        let tables = self.inner.tables.lock();
        let mut rows: Vec<WalletTransaction> = tables
            .entries
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        let total = rows.len() as u64;
        Ok((page(&rows, limit, offset), total))
    }

    async fn transfer(&self, id: TransferId) -> Result<Option<Transfer>, StoreError> {
        Ok(self.inner.tables.lock().transfers.get(&id).cloned())
    }

    async fn transfer_by_code(&self, code: &str) -> Result<Option<Transfer>, StoreError> {
        let tables = self.inner.tables.lock();
        Ok(tables.transfers.values().find(|t| t.code == code).cloned())
    }

    async fn transfers_for_user(
        &self,
        filter: &TransferFilter,
    ) -> Result<(Vec<Transfer>, u64), StoreError> {
        let tables = self.inner.tables.lock();
        // Newest-first: ids are assigned in creation order
        let rows: Vec<Transfer> = tables
            .transfers
            .values()
            .rev()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect();
        let total = rows.len() as u64;
        Ok((page(&rows, filter.limit, filter.offset), total))
    }

    async fn expired_held_transfers(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Transfer>, StoreError> {
        let tables = self.inner.tables.lock();
        Ok(tables
            .transfers
            .values()
            .filter(|t| t.status == TransferStatus::Held && t.hold_until < now)
            .cloned()
            .collect())
    }

    async fn dispute(&self, id: DisputeId) -> Result<Option<Dispute>, StoreError> {
        Ok(self.inner.tables.lock().disputes.get(&id).cloned())
    }

    async fn dispute_by_code(&self, code: &str) -> Result<Option<Dispute>, StoreError> {
        let tables = self.inner.tables.lock();
        Ok(tables.disputes.values().find(|d| d.code == code).cloned())
    }

    async fn disputes_for_user(
        &self,
        user_id: UserId,
        limit: u32,
        offset: u32,
    ) -> Result<(Vec<Dispute>, u64), StoreError> {
        let tables = self.inner.tables.lock();
        let rows: Vec<Dispute> = tables
            .disputes
            .values()
            .rev()
            .filter(|d| {
                tables
                    .transfers
                    .get(&d.transfer_id)
                    .is_some_and(|t| t.is_party(user_id))
            })
            .cloned()
            .collect();
        let total = rows.len() as u64;
        Ok((page(&rows, limit, offset), total))
    }

    async fn disputes_past_deadline(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Dispute>, StoreError> {
        let tables = self.inner.tables.lock();
        Ok(tables
            .disputes
            .values()
            .filter(|d| d.phase.has_deadline() && d.phase_deadline.is_some_and(|dl| dl < now))
            .cloned()
            .collect())
    }

    async fn insert_evidence(&self, evidence: NewEvidence) -> Result<Evidence, StoreError> {
        let row = evidence.with_id(next(&self.inner.seq.evidence));
        self.inner.tables.lock().evidence.push(row.clone());
        Ok(row)
    }

    async fn evidence_for(&self, dispute_id: DisputeId) -> Result<Vec<Evidence>, StoreError> {
        let tables = self.inner.tables.lock();
        Ok(tables
            .evidence
            .iter()
            .filter(|e| e.dispute_id == dispute_id)
            .cloned()
            .collect())
    }

    async fn insert_message(&self, message: NewMessage) -> Result<Message, StoreError> {
        let row = message.with_id(next(&self.inner.seq.message));
        self.inner.tables.lock().messages.push(row.clone());
        Ok(row)
    }

    async fn messages_for(&self, dispute_id: DisputeId) -> Result<Vec<Message>, StoreError> {
        let tables = self.inner.tables.lock();
        Ok(tables
            .messages
            .iter()
            .filter(|m| m.dispute_id == dispute_id)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
struct WriteSet {
    wallets: HashMap<UserId, Wallet>,
    entries: Vec<WalletTransaction>,
    transfers: HashMap<TransferId, Transfer>,
    disputes: HashMap<DisputeId, Dispute>,
}

struct MemoryTx {
    inner: Arc<Inner>,
    guards: Vec<OwnedMutexGuard<()>>,
    held: HashSet<RowKey>,
    writes: WriteSet,
}

impl MemoryTx {
    /// Block until the row lock is ours; re-entrant within this transaction
    async fn lock(&mut self, key: RowKey) {
        if self.held.contains(&key) {
            return;
        }
        let row = self
            .inner
            .row_locks
            .entry(key)
            .or_insert_with(|| Arc::new(RowMutex::new(())))
            .value()
            .clone();
        let guard = row.lock_owned().await;
        self.guards.push(guard);
        self.held.insert(key);
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn wallet_for_update(
        &mut self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Wallet, StoreError> {
        self.lock(RowKey::Wallet(user_id)).await;
        if let Some(w) = self.writes.wallets.get(&user_id) {
            return Ok(w.clone());
        }
        // Lazy creation is committed immediately, like an upsert ahead of the lock
        let mut tables = self.inner.tables.lock();
        Ok(tables
            .wallets
            .entry(user_id)
            .or_insert_with(|| Wallet::new(user_id, now))
            .clone())
    }

    async fn update_wallet(&mut self, wallet: &Wallet) -> Result<(), StoreError> {
        self.writes.wallets.insert(wallet.user_id, wallet.clone());
        Ok(())
    }

    async fn append_entry(
        &mut self,
        entry: NewWalletEntry,
    ) -> Result<WalletTransaction, StoreError> {
        let row = entry.with_id(next(&self.inner.seq.entry));
        self.writes.entries.push(row.clone());
        Ok(row)
    }

    async fn transfer_for_update(
        &mut self,
        id: TransferId,
    ) -> Result<Option<Transfer>, StoreError> {
        self.lock(RowKey::Transfer(id)).await;
        if let Some(t) = self.writes.transfers.get(&id) {
            return Ok(Some(t.clone()));
        }
        Ok(self.inner.tables.lock().transfers.get(&id).cloned())
    }

    async fn insert_transfer(&mut self, transfer: NewTransfer) -> Result<Transfer, StoreError> {
        let row = transfer.with_id(next(&self.inner.seq.transfer));
        self.lock(RowKey::Transfer(row.id)).await;
        self.writes.transfers.insert(row.id, row.clone());
        Ok(row)
    }

    async fn update_transfer(&mut self, transfer: &Transfer) -> Result<(), StoreError> {
        let current = match self.writes.transfers.get(&transfer.id) {
            Some(t) => t.clone(),
            None => self
                .inner
                .tables
                .lock()
                .transfers
                .get(&transfer.id)
                .cloned()
                .ok_or_else(|| StoreError::RowNotFound(format!("transfer {}", transfer.id)))?,
        };
        let updated = Transfer {
            status: transfer.status,
            released_at: transfer.released_at,
            updated_at: transfer.updated_at,
            ..current
        };
        self.writes.transfers.insert(updated.id, updated);
        Ok(())
    }

    async fn dispute_for_update(
        &mut self,
        id: DisputeId,
    ) -> Result<Option<Dispute>, StoreError> {
        self.lock(RowKey::Dispute(id)).await;
        if let Some(d) = self.writes.disputes.get(&id) {
            return Ok(Some(d.clone()));
        }
        Ok(self.inner.tables.lock().disputes.get(&id).cloned())
    }

    async fn active_dispute_for_transfer(
        &mut self,
        transfer_id: TransferId,
    ) -> Result<Option<Dispute>, StoreError> {
        if let Some(d) = self
            .writes
            .disputes
            .values()
            .find(|d| is_active_for(d, transfer_id))
        {
            return Ok(Some(d.clone()));
        }
        let tables = self.inner.tables.lock();
        Ok(tables
            .disputes
            .values()
            .filter(|d| !self.writes.disputes.contains_key(&d.id))
            .find(|d| is_active_for(d, transfer_id))
            .cloned())
    }

    async fn insert_dispute(&mut self, dispute: NewDispute) -> Result<Dispute, StoreError> {
        let row = dispute.with_id(next(&self.inner.seq.dispute));
        self.lock(RowKey::Dispute(row.id)).await;
        self.writes.disputes.insert(row.id, row.clone());
        Ok(row)
    }

    async fn update_dispute(&mut self, dispute: &Dispute) -> Result<(), StoreError> {
        self.writes.disputes.insert(dispute.id, dispute.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTx {
            inner,
            guards,
            writes,
            ..
        } = *self;
        {
            let mut tables = inner.tables.lock();
            tables.wallets.extend(writes.wallets);
            tables.entries.extend(writes.entries);
            tables.transfers.extend(writes.transfers);
            tables.disputes.extend(writes.disputes);
        }
        // Row locks are released only after the writes are visible
        drop(guards);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}

/// In-memory [`UserDirectory`]
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    users: DashSet<UserId>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users(users: impl IntoIterator<Item = UserId>) -> Self {
        let dir = Self::new();
        for u in users {
            dir.register(u);
        }
        dir
    }

    pub fn register(&self, user_id: UserId) {
        self.users.insert(user_id);
    }
}

#[async_trait]
impl UserDirectory for MemoryDirectory {
    async fn exists(&self, user_id: UserId) -> Result<bool, StoreError> {
        Ok(self.users.contains(&user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::Reference;
    use crate::wallet::WalletTxKind;
    use std::time::Duration;

    fn entry(user_id: UserId, amount: i64, before: i64) -> NewWalletEntry {
        NewWalletEntry {
            user_id,
            kind: WalletTxKind::Deposit,
            amount,
            balance_before: before,
            balance_after: before + amount,
            reference: Reference::Deposit(1),
            description: String::new(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_uncommitted_writes_invisible() {
        let store = MemoryStore::new();
        let now = Utc::now();

        let mut tx = store.begin().await.unwrap();
        let mut w = tx.wallet_for_update(1, now).await.unwrap();
        w.balance = 500;
        tx.update_wallet(&w).await.unwrap();
        tx.append_entry(entry(1, 500, 0)).await.unwrap();

        // Lazily created row is visible, the new balance is not
        assert_eq!(store.get_or_create_wallet(1, now).await.unwrap().balance, 0);
        assert_eq!(store.wallet_history(1, 10, 0).await.unwrap().1, 0);

        tx.commit().await.unwrap();
        assert_eq!(store.get_or_create_wallet(1, now).await.unwrap().balance, 500);
        assert_eq!(store.wallet_history(1, 10, 0).await.unwrap().1, 1);
    }

    #[tokio::test]
    async fn test_drop_rolls_back() {
        let store = MemoryStore::new();
        let now = Utc::now();
        {
            let mut tx = store.begin().await.unwrap();
            let mut w = tx.wallet_for_update(1, now).await.unwrap();
            w.balance = 900;
            tx.update_wallet(&w).await.unwrap();
        }
        assert_eq!(store.get_or_create_wallet(1, now).await.unwrap().balance, 0);

        // Lock was released by the drop
        let mut tx = store.begin().await.unwrap();
        tx.wallet_for_update(1, now).await.unwrap();
        tx.rollback().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_row_lock_blocks_second_tx() {
        let store = MemoryStore::new();
        let now = Utc::now();

        let mut tx1 = store.begin().await.unwrap();
        tx1.wallet_for_update(7, now).await.unwrap();

        let contender = {
            let store = store.clone();
            tokio::spawn(async move {
                let mut tx2 = store.begin().await.unwrap();
                let w = tx2.wallet_for_update(7, now).await.unwrap();
                tx2.rollback().await.unwrap();
                w.balance
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!contender.is_finished());

        let mut w = tx1.wallet_for_update(7, now).await.unwrap();
        w.balance = 42;
        tx1.update_wallet(&w).await.unwrap();
        tx1.commit().await.unwrap();

        // Second transaction observes the committed value once it gets the lock
        assert_eq!(contender.await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_history_newest_first_and_paged() {
        let store = MemoryStore::new();
        let base = Utc::now();
        for i in 0..5i64 {
            let mut tx = store.begin().await.unwrap();
            let mut e = entry(3, 10, i * 10);
            e.created_at = base + chrono::Duration::seconds(i);
            tx.append_entry(e).await.unwrap();
            tx.commit().await.unwrap();
        }

        let (rows, total) = store.wallet_history(3, 2, 1).await.unwrap();
        assert_eq!(total, 5);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].balance_before, 30);
        assert_eq!(rows[1].balance_before, 20);
    }

    #[tokio::test]
    async fn test_update_transfer_keeps_amount() {
        let store = MemoryStore::new();
        let now = Utc::now();

        let mut tx = store.begin().await.unwrap();
        let t = tx
            .insert_transfer(NewTransfer {
                code: "TRF-1".into(),
                sender_id: 1,
                receiver_id: 2,
                amount: 1000,
                hold_days: 7,
                hold_until: now,
                description: String::new(),
                created_at: now,
            })
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let mut locked = tx.transfer_for_update(t.id).await.unwrap().unwrap();
        locked.amount = 1;
        locked.status = TransferStatus::Released;
        tx.update_transfer(&locked).await.unwrap();
        tx.commit().await.unwrap();

        let stored = store.transfer(t.id).await.unwrap().unwrap();
        assert_eq!(stored.amount, 1000);
        assert_eq!(stored.status, TransferStatus::Released);
    }

    #[tokio::test]
    async fn test_directory() {
        let dir = MemoryDirectory::with_users([1, 2]);
        assert!(dir.exists(1).await.unwrap());
        assert!(!dir.exists(3).await.unwrap());
    }
}
