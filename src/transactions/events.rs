use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use super::transaction::{FailureReason, Transaction, TransactionId, TransactionKind, TransactionStatus};
use crate::wallets::{WalletBalance, WalletId};

/// Facts published after they are durable. Consumers get them at least once.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum DomainEvent {
  #[serde(rename = "transaction.created")]
  TransactionCreated(Transaction),

  #[serde(rename = "transaction.completed")]
  TransactionCompleted(Transaction),

  #[serde(rename = "transaction.failed")]
  TransactionFailed(Transaction),

  #[serde(rename = "transaction.reversed")]
  TransactionReversed(Transaction),

  #[serde(rename = "transaction.cancelled")]
  TransactionCancelled(Transaction),

  #[serde(rename = "wallet.updated")]
  WalletUpdated {
    transaction_id: TransactionId,
    wallet: WalletBalance,
  },
}

impl DomainEvent {
  pub fn name(&self) -> &'static str {
    match self {
      DomainEvent::TransactionCreated(_) => "transaction.created",
      DomainEvent::TransactionCompleted(_) => "transaction.completed",
      DomainEvent::TransactionFailed(_) => "transaction.failed",
      DomainEvent::TransactionReversed(_) => "transaction.reversed",
      DomainEvent::TransactionCancelled(_) => "transaction.cancelled",
      DomainEvent::WalletUpdated { .. } => "wallet.updated",
    }
  }

  /// The event announcing that `transaction` reached its current status, if any.
  pub fn for_status(transaction: &Transaction) -> Option<Self> {
    let transaction = transaction.clone();
    match transaction.status {
      TransactionStatus::Pending => Some(DomainEvent::TransactionCreated(transaction)),
      TransactionStatus::Completed => Some(DomainEvent::TransactionCompleted(transaction)),
      TransactionStatus::Failed => Some(DomainEvent::TransactionFailed(transaction)),
      TransactionStatus::Reversed => Some(DomainEvent::TransactionReversed(transaction)),
      TransactionStatus::Cancelled => Some(DomainEvent::TransactionCancelled(transaction)),
      TransactionStatus::Processing => None,
    }
  }
}

/// A transaction reached a state its owner should hear about.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
  pub transaction_id: TransactionId,
  pub kind: TransactionKind,
  pub status: TransactionStatus,
  pub failure_reason: Option<FailureReason>,
  pub wallet_ids: Vec<WalletId>,
}

impl From<&Transaction> for Notification {
  fn from(transaction: &Transaction) -> Self {
    Self {
      transaction_id: transaction.id.clone(),
      kind: transaction.kind,
      status: transaction.status,
      failure_reason: transaction.failure_reason,
      wallet_ids: transaction
        .source_wallet_id
        .iter()
        .chain(transaction.destination_wallet_id.iter())
        .cloned()
        .collect(),
    }
  }
}

/// Outbound seam for domain events. Delivery failures are the caller's to log, never to act on.
#[async_trait]
pub trait EventPublisher: Send + Sync {
  async fn publish(&self, event: DomainEvent) -> anyhow::Result<()>;
}

/// Outbound seam for user notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
  async fn notify(&self, notification: Notification) -> anyhow::Result<()>;
}

/// Writes events and notifications as JSON to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPublisher;

#[async_trait]
impl EventPublisher for LogPublisher {
  async fn publish(&self, event: DomainEvent) -> anyhow::Result<()> {
    let payload = serde_json::to_string(&event)?;
    info!(event = event.name(), %payload, "domain event");
    Ok(())
  }
}

#[async_trait]
impl Notifier for LogPublisher {
  async fn notify(&self, notification: Notification) -> anyhow::Result<()> {
    let payload = serde_json::to_string(&notification)?;
    info!(transaction_id = %notification.transaction_id, %payload, "notification");
    Ok(())
  }
}
