//! Escrow Transfer Engine
//!
//! # State Machine
//!
//! ```text
//! HELD ──┬──> RELEASED    (sender, or hold expiry)
//!        ├──> CANCELLED   (receiver)
//!        └──> DISPUTED ──┬──> RELEASED   (dispute resolved to receiver)
//!                        └──> REFUNDED   (dispute resolved to sender)
//! ```
//!
//! # Safety Invariants
//!
//! 1. **One debit, one credit**: the sender is debited once on open and exactly
//!    one party is credited once on settlement
//! 2. **Re-check under lock**: the held status is re-validated after the
//!    transfer row lock is taken, in the transaction that credits
//! 3. **Immutable amount**: stores never rewrite `amount`

pub mod error;
pub mod service;
pub mod state;
pub mod types;

#[cfg(test)]
mod integration_tests;

pub use error::TransferError;
pub use service::{HoldPeriod, TransferEngine};
pub use state::TransferStatus;
pub use types::{
    Actor, NewTransfer, OpenTransferRequest, Transfer, TransferFilter, TransferRole,
};
