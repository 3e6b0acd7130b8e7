use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
  ledger::JournalEntryId,
  money::{Amount, Currency},
  wallets::WalletId,
};

/// Alias for a transaction ID. Callers may choose it to make a submission idempotent.
pub type TransactionId = String;

const COMPENSATION_SUFFIX: &str = ":reverse";

/// Id of the reversal recorded when the credit of a transfer is refused and its debit given back.
/// Submitted requests cannot use ids of this shape.
pub fn compensation_id(transaction_id: &str) -> TransactionId {
  format!("{}{}", transaction_id, COMPENSATION_SUFFIX)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
  Transfer,
  Deposit,
  Withdrawal,
  Reversal,
  Fee,
  Refund,
}

impl TransactionKind {
  /// Reversals and refunds return money of a parent transaction.
  pub fn is_return(self) -> bool {
    matches!(self, TransactionKind::Reversal | TransactionKind::Refund)
  }

  pub fn category(self) -> &'static str {
    match self {
      TransactionKind::Transfer => "p2p",
      TransactionKind::Deposit => "top_up",
      TransactionKind::Withdrawal => "cash_out",
      TransactionKind::Reversal => "reversal",
      TransactionKind::Fee => "fee",
      TransactionKind::Refund => "refund",
    }
  }
}

impl fmt::Display for TransactionKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let kind = match self {
      TransactionKind::Transfer => "transfer",
      TransactionKind::Deposit => "deposit",
      TransactionKind::Withdrawal => "withdrawal",
      TransactionKind::Reversal => "reversal",
      TransactionKind::Fee => "fee",
      TransactionKind::Refund => "refund",
    };
    f.write_str(kind)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
  Pending,
  Processing,
  Completed,
  Failed,
  Reversed,
  Cancelled,
}

impl TransactionStatus {
  /// Lifecycle of a transaction:
  ///
  /// ```text
  /// pending -> processing -> completed -> reversed
  ///    |            |
  ///    v            v
  /// cancelled    failed
  /// ```
  pub fn can_transition_to(self, next: TransactionStatus) -> bool {
    use TransactionStatus::*;
    matches!(
      (self, next),
      (Pending, Processing)
        | (Pending, Cancelled)
        | (Processing, Completed)
        | (Processing, Failed)
        | (Completed, Reversed)
    )
  }

  /// No more processing will happen on the transaction.
  pub fn is_terminal(self) -> bool {
    !matches!(self, TransactionStatus::Pending | TransactionStatus::Processing)
  }
}

impl fmt::Display for TransactionStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let status = match self {
      TransactionStatus::Pending => "pending",
      TransactionStatus::Processing => "processing",
      TransactionStatus::Completed => "completed",
      TransactionStatus::Failed => "failed",
      TransactionStatus::Reversed => "reversed",
      TransactionStatus::Cancelled => "cancelled",
    };
    f.write_str(status)
  }
}

/// Why a transaction ended up `failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
  InsufficientFunds,
  LimitExceeded,
  WalletNotTransactable,
  UpstreamTimeout,
  UpstreamUnavailable,
  CompensationFailed,
  LedgerInvariantViolation,
  InvalidRequest,
}

impl fmt::Display for FailureReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let reason = match self {
      FailureReason::InsufficientFunds => "insufficient_funds",
      FailureReason::LimitExceeded => "limit_exceeded",
      FailureReason::WalletNotTransactable => "wallet_not_transactable",
      FailureReason::UpstreamTimeout => "upstream_timeout",
      FailureReason::UpstreamUnavailable => "upstream_unavailable",
      FailureReason::CompensationFailed => "compensation_failed",
      FailureReason::LedgerInvariantViolation => "ledger_invariant_violation",
      FailureReason::InvalidRequest => "invalid_request",
    };
    f.write_str(reason)
  }
}

/// Money an operator has to look at: a debit that could not be undone, or whose outcome is unknown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconciliationHint {
  pub wallet_id: WalletId,
  pub amount: Amount,
  /// Posting key of the movement in doubt.
  pub posting_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transaction {
  pub id: TransactionId,
  pub kind: TransactionKind,
  pub status: TransactionStatus,
  pub source_wallet_id: Option<WalletId>,
  pub destination_wallet_id: Option<WalletId>,
  pub amount: Amount,
  pub currency: Currency,
  pub parent_transaction_id: Option<TransactionId>,
  /// Entry that completed the movement.
  pub ledger_entry_id: Option<JournalEntryId>,
  pub failure_reason: Option<FailureReason>,
  pub failure_detail: Option<String>,
  pub reconciliation: Option<ReconciliationHint>,
  pub category: String,
  pub description: Option<String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
  pub completed_at: Option<DateTime<Utc>>,
}

impl Transaction {
  pub fn pending(
    id: TransactionId,
    kind: TransactionKind,
    source_wallet_id: Option<WalletId>,
    destination_wallet_id: Option<WalletId>,
    amount: Amount,
    currency: Currency,
    now: DateTime<Utc>,
  ) -> Self {
    Self {
      id,
      kind,
      status: TransactionStatus::Pending,
      source_wallet_id,
      destination_wallet_id,
      amount,
      currency,
      parent_transaction_id: None,
      ledger_entry_id: None,
      failure_reason: None,
      failure_detail: None,
      reconciliation: None,
      category: kind.category().to_string(),
      description: None,
      created_at: now,
      updated_at: now,
      completed_at: None,
    }
  }

  pub fn with_parent(self, parent_transaction_id: TransactionId) -> Self {
    Self {
      parent_transaction_id: Some(parent_transaction_id),
      ..self
    }
  }

  pub fn with_description(self, description: Option<String>) -> Self {
    Self {
      description,
      ..self
    }
  }

  /// Structural rules every stored transaction follows.
  pub fn check_invariants(&self) -> Result<(), String> {
    let source = self.source_wallet_id.is_some();
    let destination = self.destination_wallet_id.is_some();
    let shape_ok = match self.kind {
      TransactionKind::Transfer => source && destination,
      TransactionKind::Deposit => !source && destination,
      TransactionKind::Withdrawal | TransactionKind::Fee => source && !destination,
      TransactionKind::Reversal | TransactionKind::Refund => source || destination,
    };
    if !shape_ok {
      return Err(format!("{} {} has invalid wallets", self.kind, self.id));
    }
    if self.source_wallet_id.is_some() && self.source_wallet_id == self.destination_wallet_id {
      return Err(format!("{} moves money to its own source", self.id));
    }
    if self.kind.is_return() != self.parent_transaction_id.is_some() {
      return Err(format!("{} {} has an invalid parent", self.kind, self.id));
    }
    if (self.status == TransactionStatus::Failed) != self.failure_reason.is_some() {
      return Err(format!("{} is {} with reason {:?}", self.id, self.status, self.failure_reason));
    }
    Ok(())
  }
}

/// What a caller asks the orchestrator to do. Amounts are in minor units and validated on submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionRequest {
  Transfer {
    id: Option<TransactionId>,
    source_wallet_id: WalletId,
    destination_wallet_id: WalletId,
    amount: i64,
    currency: Currency,
    description: Option<String>,
  },
  Deposit {
    id: Option<TransactionId>,
    destination_wallet_id: WalletId,
    amount: i64,
    currency: Currency,
  },
  Withdrawal {
    id: Option<TransactionId>,
    source_wallet_id: WalletId,
    amount: i64,
    currency: Currency,
  },
  Fee {
    id: Option<TransactionId>,
    source_wallet_id: WalletId,
    amount: i64,
    currency: Currency,
  },
  /// Returns everything not yet returned of the parent.
  Reversal {
    id: Option<TransactionId>,
    parent_transaction_id: TransactionId,
  },
  /// Returns `amount` of the parent, or everything left when absent.
  /// An amount needs its currency, which must be the one of the parent.
  Refund {
    id: Option<TransactionId>,
    parent_transaction_id: TransactionId,
    amount: Option<i64>,
    currency: Option<Currency>,
  },
}

impl TransactionRequest {
  pub fn id(&self) -> Option<&TransactionId> {
    match self {
      TransactionRequest::Transfer { id, .. }
      | TransactionRequest::Deposit { id, .. }
      | TransactionRequest::Withdrawal { id, .. }
      | TransactionRequest::Fee { id, .. }
      | TransactionRequest::Reversal { id, .. }
      | TransactionRequest::Refund { id, .. } => id.as_ref(),
    }
  }

  pub fn kind(&self) -> TransactionKind {
    match self {
      TransactionRequest::Transfer { .. } => TransactionKind::Transfer,
      TransactionRequest::Deposit { .. } => TransactionKind::Deposit,
      TransactionRequest::Withdrawal { .. } => TransactionKind::Withdrawal,
      TransactionRequest::Fee { .. } => TransactionKind::Fee,
      TransactionRequest::Reversal { .. } => TransactionKind::Reversal,
      TransactionRequest::Refund { .. } => TransactionKind::Refund,
    }
  }

  /// Checks the shape of the request, before looking at any wallet.
  pub fn validate(&self) -> Result<(), String> {
    if let Some(id) = self.id() {
      if id.trim().is_empty() {
        return Err("transaction id cannot be blank".to_string());
      }
      if id.ends_with(COMPENSATION_SUFFIX) {
        return Err(format!("transaction ids ending in {} are reserved", COMPENSATION_SUFFIX));
      }
    }
    match self {
      TransactionRequest::Transfer {
        source_wallet_id,
        destination_wallet_id,
        amount,
        ..
      } => {
        non_blank(source_wallet_id, "source wallet")?;
        non_blank(destination_wallet_id, "destination wallet")?;
        if source_wallet_id == destination_wallet_id {
          return Err("source and destination wallets must differ".to_string());
        }
        positive(*amount)
      }
      TransactionRequest::Deposit {
        destination_wallet_id: wallet_id,
        amount,
        ..
      }
      | TransactionRequest::Withdrawal {
        source_wallet_id: wallet_id,
        amount,
        ..
      }
      | TransactionRequest::Fee {
        source_wallet_id: wallet_id,
        amount,
        ..
      } => {
        non_blank(wallet_id, "wallet")?;
        positive(*amount)
      }
      TransactionRequest::Reversal {
        parent_transaction_id,
        ..
      } => non_blank(parent_transaction_id, "parent transaction"),
      TransactionRequest::Refund {
        parent_transaction_id,
        amount,
        currency,
        ..
      } => {
        non_blank(parent_transaction_id, "parent transaction")?;
        match (amount, currency) {
          (Some(_), None) => Err("a refund amount needs its currency".to_string()),
          (Some(amount), Some(_)) => positive(*amount),
          (None, _) => Ok(()),
        }
      }
    }
  }

  /// Whether `transaction` is what this request would have created.
  pub fn matches(&self, transaction: &Transaction) -> bool {
    if self.kind() != transaction.kind {
      return false;
    }
    let same = |wallet: &WalletId, stored: &Option<WalletId>| stored.as_ref() == Some(wallet);
    match self {
      TransactionRequest::Transfer {
        source_wallet_id,
        destination_wallet_id,
        amount,
        currency,
        ..
      } => {
        same(source_wallet_id, &transaction.source_wallet_id)
          && same(destination_wallet_id, &transaction.destination_wallet_id)
          && *amount == transaction.amount.minor()
          && *currency == transaction.currency
      }
      TransactionRequest::Deposit {
        destination_wallet_id,
        amount,
        currency,
        ..
      } => {
        same(destination_wallet_id, &transaction.destination_wallet_id)
          && *amount == transaction.amount.minor()
          && *currency == transaction.currency
      }
      TransactionRequest::Withdrawal {
        source_wallet_id,
        amount,
        currency,
        ..
      }
      | TransactionRequest::Fee {
        source_wallet_id,
        amount,
        currency,
        ..
      } => {
        same(source_wallet_id, &transaction.source_wallet_id)
          && *amount == transaction.amount.minor()
          && *currency == transaction.currency
      }
      TransactionRequest::Reversal {
        parent_transaction_id,
        ..
      } => transaction.parent_transaction_id.as_ref() == Some(parent_transaction_id),
      TransactionRequest::Refund {
        parent_transaction_id,
        amount,
        currency,
        ..
      } => {
        transaction.parent_transaction_id.as_ref() == Some(parent_transaction_id)
          && amount.map_or(true, |amount| amount == transaction.amount.minor())
          && currency.map_or(true, |currency| currency == transaction.currency)
      }
    }
  }
}

fn non_blank(value: &str, what: &str) -> Result<(), String> {
  if value.trim().is_empty() {
    Err(format!("{} cannot be blank", what))
  } else {
    Ok(())
  }
}

fn positive(amount: i64) -> Result<(), String> {
  if amount > 0 {
    Ok(())
  } else {
    Err(format!("amount must be positive, got {}", amount))
  }
}
