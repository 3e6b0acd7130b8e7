//! Transactions and their orchestration over the wallet store.
//!
//! The [`Orchestrator`] is the only writer of transactions: it records them in a [`TransactionRepository`]
//! and moves them through their lifecycle while the money moves through the [`WalletStore`](crate::wallets::WalletStore).
//

mod events;
mod orchestrator;
mod repository;
mod transaction;

pub use events::{DomainEvent, EventPublisher, LogPublisher, Notification, Notifier};
pub use orchestrator::{
  Orchestrator, OrchestratorConfig, OrchestratorError, Result as OrchestratorResult,
  TransactionService, WalletReport,
};
pub use repository::{InMemoryTransactionRepository, Insertion, RepositoryError, TransactionRepository};
pub use transaction::{
  FailureReason, ReconciliationHint, Transaction, TransactionId, TransactionKind,
  TransactionRequest, TransactionStatus,
};
