//! Wallet Ledger
//!
//! Per-user balances and the append-only ledger of every mutation.

pub mod error;
pub mod models;
pub mod pin;
pub mod service;

pub use error::WalletError;
pub use models::{NewWalletEntry, PinStatus, Wallet, WalletTransaction, WalletTxKind};
pub use pin::{Argon2PinHasher, PinHasher, PinPolicy};
pub use service::WalletLedger;
