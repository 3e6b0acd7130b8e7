//! Money movement for a neobank: a double-entry ledger, customer wallets cached on top of it,
//! and an orchestrator that moves money between them as compensable sagas.
//!
//! - [`ledger`] keeps the books. Every posting is a balanced journal entry.
//! - [`wallets`] enforces status, funds and spend limits, and posts to the ledger before changing a wallet.
//! - [`transactions`] drives transfers, deposits, withdrawals, fees, reversals and refunds to a terminal state.
//! - [`io`] and [`processors`] apply a CSV batch of requests and report every wallet.

pub mod clock;
pub mod io;
pub mod ledger;
pub mod money;
pub mod processors;
pub mod settings;
pub mod transactions;
pub mod wallets;
