use std::{collections::HashMap, sync::Mutex};

use async_trait::async_trait;
use thiserror::Error;

use super::transaction::{Transaction, TransactionId, TransactionStatus};

pub type Result<T> = core::result::Result<T, RepositoryError>;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum RepositoryError {
  #[error("Transaction not found: {0}")]
  NotFound(TransactionId),

  #[error("Transaction {id} cannot go from {from} to {to}")]
  InvalidTransition {
    id: TransactionId,
    from: TransactionStatus,
    to: TransactionStatus,
  },

  #[error("Invalid transaction: {0}")]
  InvalidTransaction(String),

  #[error("Transaction repository unavailable")]
  Unavailable,
}

/// Outcome of [`TransactionRepository::insert`].
#[derive(Debug, Clone, PartialEq)]
pub enum Insertion {
  Inserted(Transaction),
  /// A transaction with the same id was already there; it is returned untouched.
  Existing(Transaction),
}

/// Durable record of transactions. Every status change goes through `update`, which refuses illegal transitions.
#[async_trait]
pub trait TransactionRepository: Send + Sync {
  async fn insert(&self, transaction: Transaction) -> Result<Insertion>;

  async fn get(&self, id: &str) -> Result<Option<Transaction>>;

  async fn update(&self, transaction: Transaction) -> Result<()>;

  /// Reversals and refunds of `parent_id`, oldest first.
  async fn children_of(&self, parent_id: &str) -> Result<Vec<Transaction>>;
}

#[derive(Debug, Default)]
struct Records {
  transactions: HashMap<TransactionId, Transaction>,
  children: HashMap<TransactionId, Vec<TransactionId>>,
}

#[derive(Debug, Default)]
pub struct InMemoryTransactionRepository {
  records: Mutex<Records>,
}

impl InMemoryTransactionRepository {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl TransactionRepository for InMemoryTransactionRepository {
  async fn insert(&self, transaction: Transaction) -> Result<Insertion> {
    transaction
      .check_invariants()
      .map_err(RepositoryError::InvalidTransaction)?;

    let mut records = self.records.lock().map_err(|_| RepositoryError::Unavailable)?;
    if let Some(existing) = records.transactions.get(&transaction.id) {
      return Ok(Insertion::Existing(existing.clone()));
    }
    if let Some(parent_id) = &transaction.parent_transaction_id {
      records
        .children
        .entry(parent_id.clone())
        .or_default()
        .push(transaction.id.clone());
    }
    records
      .transactions
      .insert(transaction.id.clone(), transaction.clone());
    Ok(Insertion::Inserted(transaction))
  }

  async fn get(&self, id: &str) -> Result<Option<Transaction>> {
    let records = self.records.lock().map_err(|_| RepositoryError::Unavailable)?;
    Ok(records.transactions.get(id).cloned())
  }

  async fn update(&self, transaction: Transaction) -> Result<()> {
    transaction
      .check_invariants()
      .map_err(RepositoryError::InvalidTransaction)?;

    let mut records = self.records.lock().map_err(|_| RepositoryError::Unavailable)?;
    let stored = records
      .transactions
      .get_mut(&transaction.id)
      .ok_or_else(|| RepositoryError::NotFound(transaction.id.clone()))?;

    if stored.status != transaction.status && !stored.status.can_transition_to(transaction.status) {
      return Err(RepositoryError::InvalidTransition {
        id: transaction.id,
        from: stored.status,
        to: transaction.status,
      });
    }
    *stored = transaction;
    Ok(())
  }

  async fn children_of(&self, parent_id: &str) -> Result<Vec<Transaction>> {
    let records = self.records.lock().map_err(|_| RepositoryError::Unavailable)?;
    let children = records
      .children
      .get(parent_id)
      .map(|ids| {
        ids
          .iter()
          .filter_map(|id| records.transactions.get(id).cloned())
          .collect()
      })
      .unwrap_or_default();
    Ok(children)
  }
}
