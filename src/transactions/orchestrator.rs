use std::{future::Future, sync::Arc, time::Duration};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{
  events::{DomainEvent, EventPublisher, Notification, Notifier},
  repository::{Insertion, RepositoryError, TransactionRepository},
  transaction::{
    compensation_id, FailureReason, ReconciliationHint, Transaction, TransactionId,
    TransactionKind, TransactionRequest, TransactionStatus,
  },
};
use crate::{
  clock::Clock,
  ledger::JournalEntryId,
  money::{Amount, Currency},
  wallets::{
    Counterparty, Leg, PostingKey, Wallet, WalletBalance, WalletError, WalletId, WalletResult,
    WalletStore,
  },
};

pub type Result<T> = core::result::Result<T, OrchestratorError>;

/// Errors returned to the caller instead of a transaction.
/// Business failures (funds, limits, frozen wallets, ...) are not errors: they produce a `failed` transaction.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum OrchestratorError {
  #[error("Invalid request: {0}")]
  Validation(String),

  #[error("Transaction {0} was already submitted with a different payload")]
  IdempotencyConflict(TransactionId),

  #[error("Transaction not found: {0}")]
  TransactionNotFound(TransactionId),

  #[error("Transaction {0} is {1}, only completed transactions can be returned")]
  ParentNotCompleted(TransactionId, TransactionStatus),

  #[error("Transaction {0} cannot be cancelled while {1}")]
  InvalidState(TransactionId, TransactionStatus),

  #[error(transparent)]
  Repository(#[from] RepositoryError),

  #[error(transparent)]
  Wallet(#[from] WalletError),

  #[error("Transaction processing aborted: {0}")]
  Internal(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
  /// Deadline of every single call to the wallet store.
  pub call_timeout: Duration,
  /// Attempts per call when the wallet store times out or is unavailable.
  pub max_attempts: u32,
  /// Grows linearly with the attempt number.
  pub retry_backoff: Duration,
}

impl Default for OrchestratorConfig {
  fn default() -> Self {
    Self {
      call_timeout: Duration::from_millis(2000),
      max_attempts: 3,
      retry_backoff: Duration::from_millis(50),
    }
  }
}

/// Balance of a wallet next to the balance of its ledger account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletReport {
  pub balance: WalletBalance,
  pub ledger_balance: i64,
}

/// Interface used by the request processors.
#[async_trait]
pub trait TransactionService: Send + Sync {
  /// Runs the request to a terminal state. Resubmitting the same id returns the stored transaction.
  async fn submit(&self, request: TransactionRequest) -> Result<Transaction>;

  /// Every wallet, checked against the ledger.
  async fn wallets_report(&self) -> Result<Vec<WalletReport>>;
}

/// How a transaction moves money.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Plan {
  Credit {
    wallet_id: WalletId,
    from: Counterparty,
  },
  Debit {
    wallet_id: WalletId,
    to: Counterparty,
  },
  Transfer {
    source: WalletId,
    destination: WalletId,
  },
}

impl Plan {
  fn for_request(request: &TransactionRequest) -> Option<(Plan, i64, Currency)> {
    match request {
      TransactionRequest::Transfer {
        source_wallet_id,
        destination_wallet_id,
        amount,
        currency,
        ..
      } => Some((
        Plan::Transfer {
          source: source_wallet_id.clone(),
          destination: destination_wallet_id.clone(),
        },
        *amount,
        *currency,
      )),
      TransactionRequest::Deposit {
        destination_wallet_id,
        amount,
        currency,
        ..
      } => Some((
        Plan::Credit {
          wallet_id: destination_wallet_id.clone(),
          from: Counterparty::External,
        },
        *amount,
        *currency,
      )),
      TransactionRequest::Withdrawal {
        source_wallet_id,
        amount,
        currency,
        ..
      } => Some((
        Plan::Debit {
          wallet_id: source_wallet_id.clone(),
          to: Counterparty::External,
        },
        *amount,
        *currency,
      )),
      TransactionRequest::Fee {
        source_wallet_id,
        amount,
        currency,
        ..
      } => Some((
        Plan::Debit {
          wallet_id: source_wallet_id.clone(),
          to: Counterparty::Fees,
        },
        *amount,
        *currency,
      )),
      TransactionRequest::Reversal { .. } | TransactionRequest::Refund { .. } => None,
    }
  }

  /// The movement of a stored transaction, for those that can be returned.
  fn of(transaction: &Transaction) -> Option<Plan> {
    let source = transaction.source_wallet_id.clone();
    let destination = transaction.destination_wallet_id.clone();
    match (transaction.kind, source, destination) {
      (TransactionKind::Transfer, Some(source), Some(destination)) => Some(Plan::Transfer {
        source,
        destination,
      }),
      (TransactionKind::Deposit, _, Some(wallet_id)) => Some(Plan::Credit {
        wallet_id,
        from: Counterparty::External,
      }),
      (TransactionKind::Withdrawal, Some(wallet_id), _) => Some(Plan::Debit {
        wallet_id,
        to: Counterparty::External,
      }),
      (TransactionKind::Fee, Some(wallet_id), _) => Some(Plan::Debit {
        wallet_id,
        to: Counterparty::Fees,
      }),
      _ => None,
    }
  }

  /// The movement that gives the money back.
  fn mirror(self) -> Plan {
    match self {
      Plan::Credit { wallet_id, from } => Plan::Debit { wallet_id, to: from },
      Plan::Debit { wallet_id, to } => Plan::Credit { wallet_id, from: to },
      Plan::Transfer {
        source,
        destination,
      } => Plan::Transfer {
        source: destination,
        destination: source,
      },
    }
  }

  fn source(&self) -> Option<WalletId> {
    match self {
      Plan::Debit { wallet_id, .. } => Some(wallet_id.clone()),
      Plan::Transfer { source, .. } => Some(source.clone()),
      Plan::Credit { .. } => None,
    }
  }

  fn destination(&self) -> Option<WalletId> {
    match self {
      Plan::Credit { wallet_id, .. } => Some(wallet_id.clone()),
      Plan::Transfer { destination, .. } => Some(destination.clone()),
      Plan::Debit { .. } => None,
    }
  }

  /// Wallets involved, in the order they are always visited.
  fn wallet_ids(&self) -> Vec<&WalletId> {
    match self {
      Plan::Credit { wallet_id, .. } | Plan::Debit { wallet_id, .. } => vec![wallet_id],
      Plan::Transfer {
        source,
        destination,
      } => {
        let mut ids = vec![source, destination];
        ids.sort();
        ids
      }
    }
  }
}

/// Why a call to the wallet store did not succeed, after retries.
#[derive(Debug, Clone, PartialEq)]
enum CallFailure {
  /// The wallet store answered no. Nothing was applied.
  Rejected(WalletError),
  /// The wallet store kept failing with transient errors. Nothing was applied.
  Unavailable(WalletError),
  /// No answer in time: the outcome is unknown.
  TimedOut,
}

impl CallFailure {
  fn reason(&self) -> FailureReason {
    match self {
      CallFailure::Rejected(err) => failure_reason(err),
      CallFailure::Unavailable(_) => FailureReason::UpstreamUnavailable,
      CallFailure::TimedOut => FailureReason::UpstreamTimeout,
    }
  }

  fn detail(&self) -> String {
    match self {
      CallFailure::Rejected(err) | CallFailure::Unavailable(err) => err.to_string(),
      CallFailure::TimedOut => "wallet store did not answer in time".to_string(),
    }
  }
}

fn failure_reason(err: &WalletError) -> FailureReason {
  match err {
    WalletError::InsufficientFunds { .. } => FailureReason::InsufficientFunds,
    WalletError::LimitExceeded(_) => FailureReason::LimitExceeded,
    WalletError::NotTransactable(..) | WalletError::WalletClosed(_) => {
      FailureReason::WalletNotTransactable
    }
    WalletError::LedgerInvariantViolation(_) => FailureReason::LedgerInvariantViolation,
    WalletError::Ledger(err) if err.is_transient() => FailureReason::UpstreamUnavailable,
    WalletError::Ledger(_) => FailureReason::LedgerInvariantViolation,
    WalletError::WalletNotFound(_)
    | WalletError::WalletExists(_)
    | WalletError::InvalidLimits(_)
    | WalletError::HoldNotFound(..)
    | WalletError::KeyConflict(_) => FailureReason::InvalidRequest,
  }
}

/// The transaction orchestrator: validates requests, drives every movement through the [`WalletStore`]
/// and keeps the transaction lifecycle in a [`TransactionRepository`].
///
/// A transfer debits the source into the clearing account and credits the destination from it.
/// When the credit is refused after the debit went through, the debit is compensated with a credit back to the source,
/// recorded as a linked reversal, and the transfer is marked `failed`.
///
/// It is a cheap handle: clones share the same state.
#[derive(Clone)]
pub struct Orchestrator {
  inner: Arc<Inner>,
}

struct Inner {
  wallets: Arc<dyn WalletStore>,
  transactions: Arc<dyn TransactionRepository>,
  events: Arc<dyn EventPublisher>,
  notifier: Arc<dyn Notifier>,
  clock: Arc<dyn Clock>,
  config: OrchestratorConfig,
  /// Serializes reversals and refunds, so two of them never return the same money.
  returns: Mutex<()>,
}

impl Orchestrator {
  pub fn new(
    wallets: Arc<dyn WalletStore>,
    transactions: Arc<dyn TransactionRepository>,
    events: Arc<dyn EventPublisher>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    config: OrchestratorConfig,
  ) -> Self {
    Self {
      inner: Arc::new(Inner {
        wallets,
        transactions,
        events,
        notifier,
        clock,
        config,
        returns: Mutex::new(()),
      }),
    }
  }

  pub async fn transaction(&self, id: &str) -> Result<Transaction> {
    self
      .inner
      .transactions
      .get(id)
      .await?
      .ok_or_else(|| OrchestratorError::TransactionNotFound(id.to_string()))
  }

  pub async fn wallet_balance(&self, wallet_id: &str) -> Result<WalletBalance> {
    Ok(self.inner.wallets.balance(wallet_id).await?)
  }

  /// Only a `pending` transaction can be cancelled. Anything already processing runs to its end.
  pub async fn cancel(&self, id: &str) -> Result<Transaction> {
    let mut transaction = self.transaction(id).await?;
    if transaction.status != TransactionStatus::Pending {
      return Err(OrchestratorError::InvalidState(
        transaction.id,
        transaction.status,
      ));
    }
    self
      .inner
      .transition(&mut transaction, TransactionStatus::Cancelled)
      .await?;
    info!(transaction_id = %transaction.id, "transaction cancelled");
    Ok(transaction)
  }
}

#[async_trait]
impl TransactionService for Orchestrator {
  async fn submit(&self, request: TransactionRequest) -> Result<Transaction> {
    request.validate().map_err(OrchestratorError::Validation)?;

    let id = request
      .id()
      .cloned()
      .unwrap_or_else(|| Uuid::new_v4().to_string());
    if let Some(existing) = self.inner.transactions.get(&id).await? {
      return replay(&request, existing);
    }

    // Once started, processing is not tied to the caller: dropping this future does not stop it half way.
    let inner = self.inner.clone();
    tokio::spawn(async move { inner.process(id, request).await })
      .await
      .map_err(|err| OrchestratorError::Internal(err.to_string()))?
  }

  async fn wallets_report(&self) -> Result<Vec<WalletReport>> {
    let wallets = &self.inner.wallets;
    let mut reports = Vec::new();
    for wallet_id in wallets.wallet_ids().await? {
      let balance = wallets.balance(&wallet_id).await?;
      let reconciliation = wallets.reconcile(&wallet_id).await?;
      if !reconciliation.is_consistent() {
        error!(
          wallet_id = %wallet_id,
          cached_balance = reconciliation.cached_balance,
          ledger_balance = reconciliation.ledger_balance,
          "wallet diverges from its ledger account"
        );
      }
      reports.push(WalletReport {
        balance,
        ledger_balance: reconciliation.ledger_balance,
      });
    }
    Ok(reports)
  }
}

fn replay(request: &TransactionRequest, existing: Transaction) -> Result<Transaction> {
  if request.matches(&existing) {
    debug!(transaction_id = %existing.id, "replaying submitted transaction");
    Ok(existing)
  } else {
    Err(OrchestratorError::IdempotencyConflict(existing.id))
  }
}

impl Inner {
  async fn process(&self, id: TransactionId, request: TransactionRequest) -> Result<Transaction> {
    match &request {
      TransactionRequest::Reversal {
        parent_transaction_id,
        ..
      } => {
        self
          .process_return(id, &request, parent_transaction_id, None, None)
          .await
      }
      TransactionRequest::Refund {
        parent_transaction_id,
        amount,
        currency,
        ..
      } => {
        self
          .process_return(id, &request, parent_transaction_id, *amount, *currency)
          .await
      }
      _ => {
        let (plan, amount, currency) = Plan::for_request(&request)
          .ok_or_else(|| OrchestratorError::Validation(format!("unsupported request {}", id)))?;
        let amount = Amount::new(amount).map_err(|err| OrchestratorError::Validation(err.to_string()))?;
        let wallets = self.preflight(&plan, currency).await?;

        let description = match &request {
          TransactionRequest::Transfer { description, .. } => description.clone(),
          _ => None,
        };
        let transaction = Transaction::pending(
          id,
          request.kind(),
          plan.source(),
          plan.destination(),
          amount,
          currency,
          self.clock.now(),
        )
        .with_description(description);

        self.run(&request, transaction, plan, wallets).await
      }
    }
  }

  /// Reversals and refunds mirror the movement of their parent.
  async fn process_return(
    &self,
    id: TransactionId,
    request: &TransactionRequest,
    parent_id: &str,
    amount: Option<i64>,
    currency: Option<Currency>,
  ) -> Result<Transaction> {
    let _returns = self.returns.lock().await;

    // a duplicate may have been waiting for the lock while the first one ran
    if let Some(existing) = self.transactions.get(&id).await? {
      return replay(request, existing);
    }

    let parent = self
      .transactions
      .get(parent_id)
      .await?
      .ok_or_else(|| OrchestratorError::Validation(format!("parent transaction {} not found", parent_id)))?;
    if parent.status != TransactionStatus::Completed {
      return Err(OrchestratorError::ParentNotCompleted(
        parent.id,
        parent.status,
      ));
    }
    if let Some(currency) = currency {
      if currency != parent.currency {
        return Err(OrchestratorError::Validation(format!(
          "refund in {} of {}, which moved {}",
          currency, parent.id, parent.currency
        )));
      }
    }
    let plan = Plan::of(&parent)
      .ok_or_else(|| {
        OrchestratorError::Validation(format!("{} {} cannot be returned", parent.kind, parent.id))
      })?
      .mirror();

    let returned = self.returned_amount(&parent.id).await?;
    let remaining = parent.amount.minor() - returned;
    let requested = amount.unwrap_or(remaining);
    if requested > remaining {
      return Err(OrchestratorError::Validation(format!(
        "{} exceeds the {} left to return of {}",
        requested, remaining, parent.id
      )));
    }
    let amount = Amount::new(requested).map_err(|_| {
      OrchestratorError::Validation(format!("nothing left to return of {}", parent.id))
    })?;

    let wallets = self.preflight(&plan, parent.currency).await?;
    let transaction = Transaction::pending(
      id,
      request.kind(),
      plan.source(),
      plan.destination(),
      amount,
      parent.currency,
      self.clock.now(),
    )
    .with_parent(parent.id.clone());

    let transaction = self.run(request, transaction, plan, wallets).await?;

    if transaction.status == TransactionStatus::Completed
      && returned + transaction.amount.minor() == parent.amount.minor()
    {
      let mut parent = parent;
      if let Err(err) = self.transition(&mut parent, TransactionStatus::Reversed).await {
        error!(transaction_id = %parent.id, error = %err, "could not mark transaction as reversed");
      } else {
        info!(transaction_id = %parent.id, "transaction fully returned");
      }
    }
    Ok(transaction)
  }

  async fn returned_amount(&self, parent_id: &str) -> Result<i64> {
    let returned = self
      .transactions
      .children_of(parent_id)
      .await?
      .iter()
      .filter(|child| child.kind.is_return() && child.status == TransactionStatus::Completed)
      .map(|child| child.amount.minor())
      .sum();
    Ok(returned)
  }

  /// Looks the wallets up, in lexicographic order. Unknown wallets and foreign currencies are rejected
  /// before anything is recorded. A lookup the wallet store could not answer is handed back
  /// so the transaction gets recorded as failed.
  async fn preflight(
    &self,
    plan: &Plan,
    currency: Currency,
  ) -> Result<core::result::Result<Vec<Wallet>, CallFailure>> {
    let mut wallets = Vec::new();
    for wallet_id in plan.wallet_ids() {
      let wallet = match self.call("wallet", || self.wallets.wallet(wallet_id)).await {
        Ok(wallet) => wallet,
        Err(CallFailure::Rejected(WalletError::WalletNotFound(_))) => {
          return Err(OrchestratorError::Validation(format!(
            "wallet {} not found",
            wallet_id
          )))
        }
        Err(failure) => return Ok(Err(failure)),
      };
      if wallet.currency != currency {
        return Err(OrchestratorError::Validation(format!(
          "wallet {} holds {}, not {}",
          wallet_id, wallet.currency, currency
        )));
      }
      wallets.push(wallet);
    }
    Ok(Ok(wallets))
  }

  /// Records the transaction and drives it to a terminal state.
  async fn run(
    &self,
    request: &TransactionRequest,
    transaction: Transaction,
    plan: Plan,
    wallets: core::result::Result<Vec<Wallet>, CallFailure>,
  ) -> Result<Transaction> {
    let mut transaction = match self.transactions.insert(transaction).await? {
      Insertion::Inserted(transaction) => transaction,
      Insertion::Existing(existing) => return replay(request, existing),
    };
    info!(
      transaction_id = %transaction.id,
      kind = %transaction.kind,
      amount = %transaction.amount,
      currency = %transaction.currency,
      "transaction created"
    );
    self.announce(&transaction).await;

    if let Err(err) = self
      .transition(&mut transaction, TransactionStatus::Processing)
      .await
    {
      // cancelled in the meantime
      return match self.transactions.get(&transaction.id).await? {
        Some(stored) if stored.status == TransactionStatus::Cancelled => Ok(stored),
        _ => Err(err),
      };
    }

    let wallets = match wallets {
      Ok(wallets) => wallets,
      // nothing was moved, there is nothing to reconcile
      Err(failure) => {
        let detail = format!("wallet lookup: {}", failure.detail());
        return self.fail(transaction, failure.reason(), detail, None).await;
      }
    };
    if let Some(wallet) = wallets.iter().find(|wallet| !wallet.status.is_transactable()) {
      let detail = WalletError::NotTransactable(wallet.id.clone(), wallet.status).to_string();
      return self
        .fail(transaction, FailureReason::WalletNotTransactable, detail, None)
        .await;
    }

    self.execute(transaction, plan).await
  }

  async fn execute(&self, transaction: Transaction, plan: Plan) -> Result<Transaction> {
    let amount = transaction.amount;
    match plan {
      Plan::Credit { wallet_id, from } => {
        let key = PostingKey::new(transaction.id.clone(), Leg::Credit);
        let credited = self
          .call("credit", || self.wallets.credit(&wallet_id, amount, &key, from))
          .await;
        match credited {
          Ok(entry_id) => {
            self.wallet_updated(&transaction.id, &wallet_id).await;
            self.complete(transaction, entry_id).await
          }
          Err(failure) => self.fail_call(transaction, failure, &wallet_id, &key).await,
        }
      }

      Plan::Debit { wallet_id, to } => {
        let key = PostingKey::new(transaction.id.clone(), Leg::Debit);
        let debited = self
          .call("debit", || self.wallets.debit(&wallet_id, amount, &key, to))
          .await;
        match debited {
          Ok(entry_id) => {
            self.wallet_updated(&transaction.id, &wallet_id).await;
            self.complete(transaction, entry_id).await
          }
          Err(failure) => self.fail_call(transaction, failure, &wallet_id, &key).await,
        }
      }

      Plan::Transfer {
        source,
        destination,
      } => {
        let debit_key = PostingKey::new(transaction.id.clone(), Leg::Debit);
        let debited = self
          .call("debit", || {
            self
              .wallets
              .debit(&source, amount, &debit_key, Counterparty::Clearing)
          })
          .await;
        if let Err(failure) = debited {
          return self.fail_call(transaction, failure, &source, &debit_key).await;
        }
        self.wallet_updated(&transaction.id, &source).await;

        let credit_key = PostingKey::new(transaction.id.clone(), Leg::Credit);
        let credited = self
          .call("credit", || {
            self
              .wallets
              .credit(&destination, amount, &credit_key, Counterparty::Clearing)
          })
          .await;
        match credited {
          Ok(entry_id) => {
            self.wallet_updated(&transaction.id, &destination).await;
            self.complete(transaction, entry_id).await
          }
          // the credit may have landed: compensating could pay twice
          Err(CallFailure::TimedOut) => {
            self
              .fail_call(transaction, CallFailure::TimedOut, &destination, &credit_key)
              .await
          }
          Err(failure) => self.compensate(transaction, &source, failure).await,
        }
      }
    }
  }

  /// Gives the debited amount back to the source of a transfer whose credit was refused.
  async fn compensate(
    &self,
    transaction: Transaction,
    source: &str,
    cause: CallFailure,
  ) -> Result<Transaction> {
    let amount = transaction.amount;
    warn!(
      transaction_id = %transaction.id,
      reason = %cause.reason(),
      "credit refused, compensating the debit"
    );

    let key = PostingKey::new(transaction.id.clone(), Leg::Reverse);
    let compensated = self
      .call("compensate", || {
        self
          .wallets
          .credit(source, amount, &key, Counterparty::Clearing)
      })
      .await;

    match compensated {
      Ok(entry_id) => {
        self.wallet_updated(&transaction.id, source).await;
        if let Err(err) = self.record_compensation(&transaction, source, entry_id).await {
          error!(transaction_id = %transaction.id, error = %err, "could not record the compensation");
        }
        self
          .fail(transaction, cause.reason(), cause.detail(), None)
          .await
      }
      Err(failure) => {
        error!(
          transaction_id = %transaction.id,
          wallet_id = source,
          %amount,
          error = %failure.detail(),
          "compensation failed, funds left in clearing"
        );
        let detail = format!("{}; compensation: {}", cause.detail(), failure.detail());
        let hint = ReconciliationHint {
          wallet_id: source.to_string(),
          amount,
          posting_key: key.to_string(),
        };
        self
          .fail(transaction, FailureReason::CompensationFailed, detail, Some(hint))
          .await
      }
    }
  }

  /// The linked reversal of a compensated transfer.
  async fn record_compensation(
    &self,
    original: &Transaction,
    source: &str,
    entry_id: JournalEntryId,
  ) -> Result<()> {
    let reversal = Transaction::pending(
      compensation_id(&original.id),
      TransactionKind::Reversal,
      None,
      Some(source.to_string()),
      original.amount,
      original.currency,
      self.clock.now(),
    )
    .with_parent(original.id.clone());

    let mut reversal = match self.transactions.insert(reversal).await? {
      Insertion::Inserted(reversal) => reversal,
      Insertion::Existing(existing) => {
        warn!(transaction_id = %existing.id, "compensation already recorded");
        return Ok(());
      }
    };
    self.announce(&reversal).await;
    self
      .transition(&mut reversal, TransactionStatus::Processing)
      .await?;
    reversal.ledger_entry_id = Some(entry_id);
    self
      .transition(&mut reversal, TransactionStatus::Completed)
      .await
  }

  async fn complete(&self, mut transaction: Transaction, entry_id: JournalEntryId) -> Result<Transaction> {
    transaction.ledger_entry_id = Some(entry_id);
    self
      .transition(&mut transaction, TransactionStatus::Completed)
      .await?;
    info!(transaction_id = %transaction.id, "transaction completed");
    Ok(transaction)
  }

  /// Fails after an unsuccessful call. A timed out call may have been applied and is flagged for reconciliation.
  async fn fail_call(
    &self,
    transaction: Transaction,
    failure: CallFailure,
    wallet_id: &str,
    key: &PostingKey,
  ) -> Result<Transaction> {
    let hint = match failure {
      CallFailure::TimedOut => Some(ReconciliationHint {
        wallet_id: wallet_id.to_string(),
        amount: transaction.amount,
        posting_key: key.to_string(),
      }),
      _ => None,
    };
    self
      .fail(transaction, failure.reason(), failure.detail(), hint)
      .await
  }

  async fn fail(
    &self,
    mut transaction: Transaction,
    reason: FailureReason,
    detail: String,
    reconciliation: Option<ReconciliationHint>,
  ) -> Result<Transaction> {
    transaction.failure_reason = Some(reason);
    transaction.failure_detail = Some(detail);
    transaction.reconciliation = reconciliation;
    self
      .transition(&mut transaction, TransactionStatus::Failed)
      .await?;
    warn!(
      transaction_id = %transaction.id,
      %reason,
      detail = transaction.failure_detail.as_deref().unwrap_or_default(),
      "transaction failed"
    );
    Ok(transaction)
  }

  /// Persists the new status, then announces it.
  async fn transition(&self, transaction: &mut Transaction, status: TransactionStatus) -> Result<()> {
    let now = self.clock.now();
    let mut next = transaction.clone();
    next.status = status;
    next.updated_at = now;
    if status == TransactionStatus::Completed {
      next.completed_at = Some(now);
    }
    self.transactions.update(next.clone()).await?;
    debug!(transaction_id = %next.id, from = %transaction.status, to = %status, "transaction transitioned");
    *transaction = next;
    self.announce(transaction).await;
    Ok(())
  }

  async fn announce(&self, transaction: &Transaction) {
    if let Some(event) = DomainEvent::for_status(transaction) {
      self.publish(event).await;
    }
    if transaction.status.is_terminal() {
      if let Err(err) = self.notifier.notify(Notification::from(transaction)).await {
        warn!(transaction_id = %transaction.id, error = %err, "notification not delivered");
      }
    }
  }

  async fn wallet_updated(&self, transaction_id: &str, wallet_id: &str) {
    match self.wallets.balance(wallet_id).await {
      Ok(wallet) => {
        self
          .publish(DomainEvent::WalletUpdated {
            transaction_id: transaction_id.to_string(),
            wallet,
          })
          .await
      }
      Err(err) => warn!(wallet_id, error = %err, "could not read the updated wallet"),
    }
  }

  async fn publish(&self, event: DomainEvent) {
    let name = event.name();
    if let Err(err) = self.events.publish(event).await {
      warn!(event = name, error = %err, "event not published");
    }
  }

  /// Calls the wallet store with a deadline, retrying timeouts and transient errors.
  async fn call<T, F, Fut>(&self, operation: &'static str, mut attempt: F) -> core::result::Result<T, CallFailure>
  where
    F: FnMut() -> Fut,
    Fut: Future<Output = WalletResult<T>>,
  {
    let max_attempts = self.config.max_attempts.max(1);
    let mut attempts = 0;
    loop {
      attempts += 1;
      let failure = match tokio::time::timeout(self.config.call_timeout, attempt()).await {
        Ok(Ok(value)) => return Ok(value),
        Ok(Err(err)) if !err.is_transient() => return Err(CallFailure::Rejected(err)),
        Ok(Err(err)) => CallFailure::Unavailable(err),
        Err(_) => CallFailure::TimedOut,
      };
      if attempts >= max_attempts {
        warn!(operation, attempts, error = %failure.detail(), "giving up on wallet store");
        return Err(failure);
      }
      debug!(operation, attempts, error = %failure.detail(), "retrying wallet store call");
      tokio::time::sleep(self.config.retry_backoff * attempts).await;
    }
  }
}
