//! Escrow Engine - Held P2P transfers with dispute resolution
//!
//! # Modules
//!
//! - [`core_types`] - Core type definitions (UserId, Amount, Reference)
//! - [`wallet`] - Wallet ledger, PIN verification and lockout
//! - [`transfer`] - Held transfers: open, release, cancel, expiry sweep
//! - [`dispute`] - Phased disputes and settlement
//! - [`breaker`] - Circuit breakers for external dependencies
//! - [`store`] - Transactional persistence (PostgreSQL and in-memory)
//! - [`sweeper`] - Background sweep worker

// Core types - must be first!
pub mod core_types;

pub mod clock;
pub mod codes;

// Escrow components
pub mod dispute;
pub mod services;
pub mod store;
pub mod sweeper;
pub mod transfer;
pub mod wallet;

// Resilience
pub mod breaker;
pub mod feature_client;

// Infrastructure
pub mod config;
pub mod db;
pub mod logging;

// Convenient re-exports at crate root
pub use breaker::{BreakerRegistry, CircuitBreaker};
pub use core_types::{Amount, DisputeId, Reference, TransferId, UserId};
pub use dispute::{DisputeEngine, DisputeError};
pub use services::EscrowServices;
pub use sweeper::{SweepReport, SweepWorker};
pub use transfer::{TransferEngine, TransferError};
pub use wallet::{WalletError, WalletLedger};
