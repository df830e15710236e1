//! Service wiring
//!
//! Builds the wallet ledger and both engines over one store and clock.

use std::sync::Arc;

use crate::clock::Clock;
use crate::config::AppConfig;
use crate::dispute::{DisputeEngine, DisputePolicy};
use crate::store::{LedgerStore, UserDirectory};
use crate::transfer::TransferEngine;
use crate::wallet::{PinHasher, PinPolicy, WalletLedger};

#[derive(Clone)]
pub struct EscrowServices {
    pub wallets: Arc<WalletLedger>,
    pub transfers: Arc<TransferEngine>,
    pub disputes: Arc<DisputeEngine>,
}

impl EscrowServices {
    pub fn build(
        store: Arc<dyn LedgerStore>,
        users: Arc<dyn UserDirectory>,
        clock: Arc<dyn Clock>,
        hasher: Arc<dyn PinHasher>,
        config: &AppConfig,
    ) -> Self {
        let wallets = Arc::new(WalletLedger::new(
            store.clone(),
            clock.clone(),
            hasher,
            PinPolicy::from_config(&config.pin),
        ));
        let transfers = Arc::new(
            TransferEngine::new(store.clone(), wallets.clone(), users, clock.clone())
                .with_hold_tiers(config.escrow.hold_tiers_days.clone()),
        );
        let disputes = Arc::new(
            DisputeEngine::new(store, wallets.clone(), clock)
                .with_policy(DisputePolicy::from_config(&config.escrow)),
        );

        Self {
            wallets,
            transfers,
            disputes,
        }
    }
}
