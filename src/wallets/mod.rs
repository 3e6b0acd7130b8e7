//! Customer wallets: a cached view of their ledger account, their spend limits and their holds.
//!
//! Every debit and credit is posted to the [`LedgerStore`](crate::ledger::LedgerStore) before the wallet changes.
//

mod limits;
mod store;
mod wallet;

pub use limits::WalletLimits;
pub use store::{InMemoryWalletStore, Reconciliation, Result as WalletResult, WalletError, WalletStore};
pub use wallet::{
  Counterparty, Leg, NewWallet, PostingKey, Wallet, WalletBalance, WalletId, WalletKind,
  WalletStatus,
};
