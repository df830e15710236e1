//! Wallet Ledger
//!
//! Every balance mutation runs under the wallet row lock and appends exactly
//! one ledger entry in the same transaction.

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::error::WalletError;
use super::models::{NewWalletEntry, PinStatus, Wallet, WalletTransaction, WalletTxKind};
use super::pin::{PinHasher, PinPolicy};
use crate::clock::Clock;
use crate::core_types::{Amount, Reference, UserId};
use crate::store::{LedgerStore, StoreTx};

pub struct WalletLedger {
    store: Arc<dyn LedgerStore>,
    clock: Arc<dyn Clock>,
    hasher: Arc<dyn PinHasher>,
    policy: PinPolicy,
}

impl WalletLedger {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        clock: Arc<dyn Clock>,
        hasher: Arc<dyn PinHasher>,
        policy: PinPolicy,
    ) -> Self {
        Self {
            store,
            clock,
            hasher,
            policy,
        }
    }

    pub fn policy(&self) -> &PinPolicy {
        &self.policy
    }

    /// Current wallet, created with zero balance on first access
    pub async fn wallet(&self, user_id: UserId) -> Result<Wallet, WalletError> {
        Ok(self
            .store
            .get_or_create_wallet(user_id, self.clock.now())
            .await?)
    }

    pub async fn balance(&self, user_id: UserId) -> Result<Amount, WalletError> {
        Ok(self.wallet(user_id).await?.balance)
    }

    pub async fn credit(
        &self,
        user_id: UserId,
        amount: Amount,
        kind: WalletTxKind,
        reference: Reference,
        description: &str,
    ) -> Result<WalletTransaction, WalletError> {
        if amount <= 0 {
            return Err(WalletError::InvalidAmount);
        }
        let mut tx = self.store.begin().await?;
        let entry = self
            .credit_in(tx.as_mut(), user_id, amount, kind, reference, description)
            .await?;
        tx.commit().await?;
        Ok(entry)
    }

    pub async fn debit(
        &self,
        user_id: UserId,
        amount: Amount,
        kind: WalletTxKind,
        reference: Reference,
        description: &str,
    ) -> Result<WalletTransaction, WalletError> {
        if amount <= 0 {
            return Err(WalletError::InvalidAmount);
        }
        let mut tx = self.store.begin().await?;
        let entry = self
            .debit_in(tx.as_mut(), user_id, amount, kind, reference, description)
            .await?;
        tx.commit().await?;
        Ok(entry)
    }

    /// Credit inside the caller's transaction. The caller commits.
    pub async fn credit_in(
        &self,
        tx: &mut dyn StoreTx,
        user_id: UserId,
        amount: Amount,
        kind: WalletTxKind,
        reference: Reference,
        description: &str,
    ) -> Result<WalletTransaction, WalletError> {
        if amount <= 0 {
            return Err(WalletError::InvalidAmount);
        }
        let now = self.clock.now();
        let mut wallet = tx.wallet_for_update(user_id, now).await?;
        let before = wallet.balance;
        wallet.balance = before.checked_add(amount).ok_or(WalletError::Overflow)?;
        wallet.updated_at = now;
        tx.update_wallet(&wallet).await?;

        let entry = tx
            .append_entry(NewWalletEntry {
                user_id,
                kind,
                amount,
                balance_before: before,
                balance_after: wallet.balance,
                reference,
                description: description.to_string(),
                created_at: now,
            })
            .await?;

        debug!(user_id, amount, kind = %kind, reference = %reference, "Wallet credited");
        Ok(entry)
    }

    /// Debit inside the caller's transaction. The caller commits.
    pub async fn debit_in(
        &self,
        tx: &mut dyn StoreTx,
        user_id: UserId,
        amount: Amount,
        kind: WalletTxKind,
        reference: Reference,
        description: &str,
    ) -> Result<WalletTransaction, WalletError> {
        if amount <= 0 {
            return Err(WalletError::InvalidAmount);
        }
        let now = self.clock.now();
        let mut wallet = tx.wallet_for_update(user_id, now).await?;
        if wallet.balance < amount {
            return Err(WalletError::InsufficientBalance);
        }
        let before = wallet.balance;
        wallet.balance = before - amount;
        wallet.updated_at = now;
        tx.update_wallet(&wallet).await?;

        let entry = tx
            .append_entry(NewWalletEntry {
                user_id,
                kind,
                amount: -amount,
                balance_before: before,
                balance_after: wallet.balance,
                reference,
                description: description.to_string(),
                created_at: now,
            })
            .await?;

        debug!(user_id, amount, kind = %kind, reference = %reference, "Wallet debited");
        Ok(entry)
    }

    /// Store a salted hash of a new PIN and clear any lockout
    pub async fn set_pin(&self, user_id: UserId, pin: &str) -> Result<(), WalletError> {
        self.policy.validate(pin)?;
        let hash = self.hasher.hash(pin)?;

        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let mut wallet = tx.wallet_for_update(user_id, now).await?;
        wallet.pin_hash = Some(hash);
        wallet.pin_set = true;
        wallet.failed_pin_attempts = 0;
        wallet.pin_locked_until = None;
        wallet.updated_at = now;
        tx.update_wallet(&wallet).await?;
        tx.commit().await?;

        info!(user_id, "PIN set");
        Ok(())
    }

    /// Check a PIN, counting failures toward the lockout.
    ///
    /// Returns `Ok(false)` on a wrong PIN. The attempt counter is committed
    /// either way.
    pub async fn verify_pin(&self, user_id: UserId, pin: &str) -> Result<bool, WalletError> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let mut wallet = tx.wallet_for_update(user_id, now).await?;

        let hash = match (&wallet.pin_hash, wallet.pin_set) {
            (Some(h), true) => h.clone(),
            _ => return Err(WalletError::PinNotSet),
        };
        if let Some(until) = wallet.pin_locked_until.filter(|u| *u > now) {
            return Err(WalletError::PinLocked { until });
        }

        let valid = self.hasher.verify(pin, &hash)?;
        if valid {
            if wallet.failed_pin_attempts == 0 && wallet.pin_locked_until.is_none() {
                tx.rollback().await?;
                return Ok(true);
            }
            wallet.failed_pin_attempts = 0;
            wallet.pin_locked_until = None;
        } else {
            wallet.failed_pin_attempts += 1;
            if wallet.failed_pin_attempts >= self.policy.max_attempts {
                let until = now + self.policy.lock_duration;
                wallet.pin_locked_until = Some(until);
                wallet.failed_pin_attempts = 0;
                warn!(user_id, until = %until, "PIN locked after repeated failures");
            } else {
                debug!(user_id, attempts = wallet.failed_pin_attempts, "Wrong PIN");
            }
        }
        wallet.updated_at = now;
        tx.update_wallet(&wallet).await?;
        tx.commit().await?;
        Ok(valid)
    }

    pub async fn is_pin_set(&self, user_id: UserId) -> Result<bool, WalletError> {
        Ok(self.wallet(user_id).await?.pin_set)
    }

    pub async fn pin_status(&self, user_id: UserId) -> Result<PinStatus, WalletError> {
        let now = self.clock.now();
        let wallet = self.wallet(user_id).await?;
        Ok(PinStatus {
            pin_set: wallet.pin_set,
            locked_until: wallet.pin_locked_until.filter(|u| *u > now),
            failed_attempts: wallet.failed_pin_attempts,
            max_attempts: self.policy.max_attempts,
        })
    }

    /// Ledger entries newest-first plus the total count
    pub async fn history(
        &self,
        user_id: UserId,
        limit: u32,
        offset: u32,
    ) -> Result<(Vec<WalletTransaction>, u64), WalletError> {
        Ok(self.store.wallet_history(user_id, limit, offset).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;
    use crate::wallet::Argon2PinHasher;
    use chrono::Duration;

    fn ledger() -> (WalletLedger, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        let ledger = WalletLedger::new(
            Arc::new(MemoryStore::new()),
            clock.clone(),
            Arc::new(Argon2PinHasher::new(8, 1, 1).unwrap()),
            PinPolicy::default(),
        );
        (ledger, clock)
    }

    #[tokio::test]
    async fn test_balance_creates_wallet() {
        let (ledger, _) = ledger();
        assert_eq!(ledger.balance(1).await.unwrap(), 0);
        assert!(!ledger.is_pin_set(1).await.unwrap());
    }

    #[tokio::test]
    async fn test_credit_then_debit_snapshots() {
        let (ledger, _) = ledger();
        let c = ledger
            .credit(1, 1000, WalletTxKind::Deposit, Reference::Deposit(1), "top up")
            .await
            .unwrap();
        assert_eq!((c.balance_before, c.balance_after, c.amount), (0, 1000, 1000));

        let d = ledger
            .debit(1, 300, WalletTxKind::Withdrawal, Reference::Withdrawal(1), "cash out")
            .await
            .unwrap();
        assert_eq!((d.balance_before, d.balance_after, d.amount), (1000, 700, -300));
        assert_eq!(ledger.balance(1).await.unwrap(), 700);

        let (rows, total) = ledger.history(1, 10, 0).await.unwrap();
        assert_eq!(total, 2);
        assert_eq!(rows[0].id, d.id);
    }

    #[tokio::test]
    async fn test_debit_insufficient_leaves_state() {
        let (ledger, _) = ledger();
        ledger
            .credit(1, 100, WalletTxKind::Deposit, Reference::Deposit(1), "")
            .await
            .unwrap();

        let err = ledger
            .debit(1, 101, WalletTxKind::Withdrawal, Reference::Withdrawal(1), "")
            .await
            .unwrap_err();
        assert_eq!(err, WalletError::InsufficientBalance);
        assert_eq!(ledger.balance(1).await.unwrap(), 100);
        assert_eq!(ledger.history(1, 10, 0).await.unwrap().1, 1);
    }

    #[tokio::test]
    async fn test_non_positive_amounts() {
        let (ledger, _) = ledger();
        for amount in [0, -5] {
            assert_eq!(
                ledger
                    .credit(1, amount, WalletTxKind::Deposit, Reference::Deposit(1), "")
                    .await,
                Err(WalletError::InvalidAmount)
            );
            assert_eq!(
                ledger
                    .debit(1, amount, WalletTxKind::Withdrawal, Reference::Withdrawal(1), "")
                    .await,
                Err(WalletError::InvalidAmount)
            );
        }
    }

    #[tokio::test]
    async fn test_pin_set_and_verify() {
        let (ledger, _) = ledger();
        assert_eq!(ledger.verify_pin(1, "123456").await, Err(WalletError::PinNotSet));
        assert_eq!(
            ledger.set_pin(1, "12ab56").await,
            Err(WalletError::InvalidPin(6))
        );

        ledger.set_pin(1, "123456").await.unwrap();
        assert!(ledger.is_pin_set(1).await.unwrap());
        assert!(ledger.verify_pin(1, "123456").await.unwrap());
        assert!(!ledger.verify_pin(1, "000000").await.unwrap());
        assert_eq!(ledger.pin_status(1).await.unwrap().failed_attempts, 1);

        // Correct PIN resets the counter
        assert!(ledger.verify_pin(1, "123456").await.unwrap());
        assert_eq!(ledger.pin_status(1).await.unwrap().failed_attempts, 0);
    }

    #[tokio::test]
    async fn test_pin_lockout_and_expiry() {
        let (ledger, clock) = ledger();
        ledger.set_pin(1, "123456").await.unwrap();

        for _ in 0..4 {
            assert!(!ledger.verify_pin(1, "999999").await.unwrap());
        }
        let status = ledger.pin_status(1).await.unwrap();
        let until = status.locked_until.unwrap();
        assert_eq!(status.failed_attempts, 0);

        // Locked: even the right PIN is refused
        assert_eq!(
            ledger.verify_pin(1, "123456").await,
            Err(WalletError::PinLocked { until })
        );

        clock.advance(Duration::hours(4) + Duration::seconds(1));
        assert!(ledger.pin_status(1).await.unwrap().locked_until.is_none());
        assert!(ledger.verify_pin(1, "123456").await.unwrap());
    }

    #[tokio::test]
    async fn test_set_pin_clears_lockout() {
        let (ledger, _) = ledger();
        ledger.set_pin(1, "123456").await.unwrap();
        for _ in 0..4 {
            ledger.verify_pin(1, "999999").await.unwrap();
        }
        ledger.set_pin(1, "654321").await.unwrap();
        assert!(ledger.verify_pin(1, "654321").await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_credits_serialize() {
        let (ledger, _) = ledger();
        let ledger = Arc::new(ledger);

        let handles: Vec<_> = (0..20)
            .map(|i| {
                let ledger = ledger.clone();
                tokio::spawn(async move {
                    ledger
                        .credit(9, 10, WalletTxKind::Deposit, Reference::Deposit(i), "")
                        .await
                })
            })
            .collect();
        for res in futures::future::join_all(handles).await {
            res.unwrap().unwrap();
        }

        assert_eq!(ledger.balance(9).await.unwrap(), 200);
        let (rows, total) = ledger.history(9, 100, 0).await.unwrap();
        assert_eq!(total, 20);
        // Snapshots chain without gaps
        let mut afters: Vec<_> = rows.iter().map(|e| e.balance_after).collect();
        afters.sort();
        assert_eq!(afters, (1..=20).map(|i| i * 10).collect::<Vec<_>>());
    }
}
