//! Integration Tests for the Transfer Engine
//!
//! Full escrow flows against the in-memory store and a manual clock.

use chrono::Duration;
use std::sync::Arc;

use crate::clock::{Clock, ManualClock};
use crate::core_types::{Reference, UserId};
use crate::store::{LedgerStore, MemoryDirectory, MemoryStore};
use crate::transfer::{
    Actor, OpenTransferRequest, TransferEngine, TransferError, TransferFilter, TransferRole,
    TransferStatus,
};
use crate::wallet::{Argon2PinHasher, PinPolicy, WalletLedger, WalletTxKind};

const SENDER: UserId = 1;
const RECEIVER: UserId = 2;
const PIN: &str = "123456";

struct TestHarness {
    store: MemoryStore,
    clock: Arc<ManualClock>,
    wallets: Arc<WalletLedger>,
    engine: Arc<TransferEngine>,
}

impl TestHarness {
    async fn new() -> Self {
        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::starting_now());
        let wallets = Arc::new(WalletLedger::new(
            Arc::new(store.clone()),
            clock.clone(),
            Arc::new(Argon2PinHasher::new(8, 1, 1).unwrap()),
            PinPolicy::default(),
        ));
        let engine = Arc::new(TransferEngine::new(
            Arc::new(store.clone()),
            wallets.clone(),
            Arc::new(MemoryDirectory::with_users([SENDER, RECEIVER])),
            clock.clone(),
        ));

        wallets.set_pin(SENDER, PIN).await.unwrap();
        wallets
            .credit(SENDER, 5000, WalletTxKind::Deposit, Reference::Deposit(1), "seed")
            .await
            .unwrap();

        Self {
            store,
            clock,
            wallets,
            engine,
        }
    }

    fn request(&self, amount: i64, hold_days: u32) -> OpenTransferRequest {
        OpenTransferRequest {
            sender_id: SENDER,
            receiver_id: RECEIVER,
            amount,
            hold_days,
            description: "order #42".into(),
            pin: PIN.into(),
        }
    }

    async fn balances(&self) -> (i64, i64) {
        (
            self.wallets.balance(SENDER).await.unwrap(),
            self.wallets.balance(RECEIVER).await.unwrap(),
        )
    }
}

// ========================================================================
// Happy Path Tests
// ========================================================================

#[tokio::test]
async fn test_open_debits_sender_once() {
    let h = TestHarness::new().await;
    let t = h.engine.open(h.request(1000, 7)).await.unwrap();

    assert_eq!(t.status, TransferStatus::Held);
    assert_eq!(t.hold_days, 7);
    assert_eq!(t.hold_until, h.clock.now() + Duration::days(7));
    assert!(t.code.starts_with("TRF-"));
    assert_eq!(h.balances().await, (4000, 0));

    let (entries, _) = h.wallets.history(SENDER, 10, 0).await.unwrap();
    let out = &entries[0];
    assert_eq!(out.kind, WalletTxKind::TransferOut);
    assert_eq!(out.amount, -1000);
    assert_eq!((out.balance_before, out.balance_after), (5000, 4000));
    assert_eq!(out.reference, Reference::Transfer(t.id));
}

#[tokio::test]
async fn test_sender_release_credits_receiver() {
    let h = TestHarness::new().await;
    let t = h.engine.open(h.request(1000, 7)).await.unwrap();

    let released = h.engine.release(t.id, Actor::User(SENDER)).await.unwrap();
    assert_eq!(released.status, TransferStatus::Released);
    assert!(released.released_at.is_some());
    assert_eq!(released.amount, 1000);
    assert_eq!(h.balances().await, (4000, 1000));

    let (entries, _) = h.wallets.history(RECEIVER, 10, 0).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].kind, WalletTxKind::TransferIn);
}

#[tokio::test]
async fn test_receiver_cancel_refunds_sender() {
    let h = TestHarness::new().await;
    let t = h.engine.open(h.request(1000, 7)).await.unwrap();

    let cancelled = h.engine.cancel(t.id, RECEIVER).await.unwrap();
    assert_eq!(cancelled.status, TransferStatus::Cancelled);
    assert!(cancelled.released_at.is_none());
    assert_eq!(h.balances().await, (5000, 0));

    assert_eq!(
        h.engine.cancel(t.id, RECEIVER).await,
        Err(TransferError::NotHeld(TransferStatus::Cancelled))
    );
    assert_eq!(h.balances().await, (5000, 0));
}

// ========================================================================
// Validation & Authorization
// ========================================================================

#[tokio::test]
async fn test_open_validation() {
    let h = TestHarness::new().await;

    let mut req = h.request(1000, 7);
    req.receiver_id = SENDER;
    assert_eq!(h.engine.open(req).await, Err(TransferError::SelfTransfer));

    assert_eq!(
        h.engine.open(h.request(0, 7)).await,
        Err(TransferError::InvalidAmount)
    );
    assert_eq!(
        h.engine.open(h.request(100, 14)).await,
        Err(TransferError::InvalidHoldPeriod(14))
    );
    assert_eq!(
        h.engine.open(h.request(9999, 30)).await,
        Err(TransferError::InsufficientBalance)
    );

    let mut req = h.request(100, 7);
    req.pin = "000000".into();
    assert_eq!(h.engine.open(req).await, Err(TransferError::InvalidPin));

    let mut req = h.request(100, 7);
    req.receiver_id = 99;
    assert_eq!(h.engine.open(req).await, Err(TransferError::ReceiverNotFound));

    // Nothing moved
    assert_eq!(h.balances().await, (5000, 0));
    assert_eq!(h.wallets.history(SENDER, 10, 0).await.unwrap().1, 1);
}

#[tokio::test]
async fn test_open_without_pin() {
    let h = TestHarness::new().await;
    let mut req = h.request(100, 7);
    req.sender_id = RECEIVER;
    req.receiver_id = SENDER;
    assert_eq!(h.engine.open(req).await, Err(TransferError::PinNotSet));
}

#[tokio::test]
async fn test_wrong_actor_forbidden() {
    let h = TestHarness::new().await;
    let t = h.engine.open(h.request(1000, 7)).await.unwrap();

    assert_eq!(
        h.engine.release(t.id, Actor::User(RECEIVER)).await,
        Err(TransferError::Forbidden)
    );
    assert_eq!(h.engine.cancel(t.id, SENDER).await, Err(TransferError::Forbidden));
    assert_eq!(
        h.engine.release(t.id, Actor::User(77)).await,
        Err(TransferError::Forbidden)
    );
    assert_eq!(h.engine.get(t.id).await.unwrap().status, TransferStatus::Held);
}

#[tokio::test]
async fn test_unknown_transfer() {
    let h = TestHarness::new().await;
    assert!(matches!(
        h.engine.release(404, Actor::System).await,
        Err(TransferError::TransferNotFound(_))
    ));
    assert!(matches!(
        h.engine.get_by_code("TRF-ffffffff").await,
        Err(TransferError::TransferNotFound(_))
    ));
}

// ========================================================================
// Sweep
// ========================================================================

#[tokio::test]
async fn test_sweep_releases_only_expired() {
    let h = TestHarness::new().await;
    let short = h.engine.open(h.request(1000, 7)).await.unwrap();
    let long = h.engine.open(h.request(500, 30)).await.unwrap();

    assert_eq!(h.engine.sweep_expired().await.unwrap(), 0);

    h.clock.advance(Duration::days(7) + Duration::seconds(1));
    assert_eq!(h.engine.sweep_expired().await.unwrap(), 1);
    assert_eq!(
        h.engine.get(short.id).await.unwrap().status,
        TransferStatus::Released
    );
    assert_eq!(h.engine.get(long.id).await.unwrap().status, TransferStatus::Held);
    assert_eq!(h.balances().await, (3500, 1000));

    // Already released transfers are not picked up again
    assert_eq!(h.engine.sweep_expired().await.unwrap(), 0);
}

#[tokio::test]
async fn test_sweep_skips_non_held() {
    let h = TestHarness::new().await;
    let t = h.engine.open(h.request(1000, 7)).await.unwrap();
    h.engine.cancel(t.id, RECEIVER).await.unwrap();

    h.clock.advance(Duration::days(8));
    assert_eq!(h.engine.sweep_expired().await.unwrap(), 0);
    assert_eq!(h.balances().await, (5000, 0));
}

// ========================================================================
// Concurrency
// ========================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_release_cancel_race_single_winner() {
    for _ in 0..20 {
        let h = TestHarness::new().await;
        let t = h.engine.open(h.request(1000, 7)).await.unwrap();

        let release = {
            let engine = h.engine.clone();
            tokio::spawn(async move { engine.release(t.id, Actor::User(SENDER)).await })
        };
        let cancel = {
            let engine = h.engine.clone();
            tokio::spawn(async move { engine.cancel(t.id, RECEIVER).await })
        };
        let (r, c) = (release.await.unwrap(), cancel.await.unwrap());

        assert!(r.is_ok() ^ c.is_ok(), "exactly one settlement must win");
        let loser = if r.is_ok() { c } else { r };
        assert!(matches!(loser, Err(TransferError::NotHeld(_))));

        let (s, rcv) = h.balances().await;
        assert_eq!(s + rcv, 5000);
        let credits = h
            .store
            .all_entries()
            .iter()
            .filter(|e| e.reference == Reference::Transfer(t.id) && e.amount > 0)
            .count();
        assert_eq!(credits, 1);
    }
}

#[tokio::test]
async fn test_list_for_user() {
    let h = TestHarness::new().await;
    let a = h.engine.open(h.request(100, 7)).await.unwrap();
    let b = h.engine.open(h.request(200, 30)).await.unwrap();
    h.engine.cancel(a.id, RECEIVER).await.unwrap();

    let (rows, total) = h
        .engine
        .list_for_user(&TransferFilter::for_user(SENDER))
        .await
        .unwrap();
    assert_eq!(total, 2);
    assert_eq!(rows[0].id, b.id);

    let mut filter = TransferFilter::for_user(RECEIVER);
    filter.role = TransferRole::Receiver;
    filter.status = Some(TransferStatus::Held);
    let (rows, total) = h.engine.list_for_user(&filter).await.unwrap();
    assert_eq!(total, 1);
    assert_eq!(rows[0].id, b.id);

    filter.role = TransferRole::Sender;
    assert_eq!(h.engine.list_for_user(&filter).await.unwrap().1, 0);

    let by_code = h.engine.get_by_code(&b.code).await.unwrap();
    assert_eq!(by_code.id, b.id);
    assert_eq!(
        h.store.transfer(b.id).await.unwrap().unwrap().amount,
        200
    );
}
