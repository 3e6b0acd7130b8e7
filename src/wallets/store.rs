use std::{
  collections::HashMap,
  sync::{Arc, RwLock},
};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error};

use super::{
  limits::WalletLimits,
  wallet::{
    owner_reference, AppliedMovement, Counterparty, NewWallet, PostingKey, Wallet, WalletBalance,
    WalletId, WalletStatus,
  },
};
use crate::{
  clock::Clock,
  ledger::{JournalEntryId, LedgerError, LedgerStore, NewJournalEntry},
  money::Amount,
};

pub type Result<T> = core::result::Result<T, WalletError>;

/// Possible errors of a wallet operation.
/// None of them leaves a trace: the cached balances and the limits only change after the ledger accepted the posting.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum WalletError {
  #[error("Wallet not found: {0}")]
  WalletNotFound(WalletId),

  #[error("Wallet already exists: {0}")]
  WalletExists(WalletId),

  #[error("Wallet {0} is not transactable: {1}")]
  NotTransactable(WalletId, WalletStatus),

  #[error("Insufficient funds in wallet {wallet_id}: available {available}, requested {requested}")]
  InsufficientFunds {
    wallet_id: WalletId,
    available: i64,
    requested: i64,
  },

  #[error("Spend limit exceeded for wallet {0}")]
  LimitExceeded(WalletId),

  #[error("Invalid limits for wallet {0}")]
  InvalidLimits(WalletId),

  #[error("Hold {1} not found on wallet {0}")]
  HoldNotFound(WalletId, String),

  #[error("Posting key {0} was already used for a different movement")]
  KeyConflict(String),

  #[error("Wallet {0} is closed for good")]
  WalletClosed(WalletId),

  #[error("Ledger invariant violated: {0}")]
  LedgerInvariantViolation(String),

  #[error(transparent)]
  Ledger(#[from] LedgerError),
}

impl WalletError {
  pub fn is_transient(&self) -> bool {
    match self {
      WalletError::Ledger(err) => err.is_transient(),
      _ => false,
    }
  }
}

/// Result of comparing the cached balance of a wallet with its ledger account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
  pub wallet_id: WalletId,
  pub cached_balance: i64,
  pub ledger_balance: i64,
}

impl Reconciliation {
  pub fn is_consistent(&self) -> bool {
    self.cached_balance == self.ledger_balance
  }
}

/// Interface of the wallet store.
///
/// `debit` and `credit` post to the ledger before touching the wallet, and are idempotent on their [`PostingKey`]:
/// calling them again after a success is a no-op returning the entry posted the first time.
#[async_trait]
pub trait WalletStore: Send + Sync {
  async fn open_wallet(&self, wallet: NewWallet) -> Result<Wallet>;

  async fn wallet(&self, wallet_id: &str) -> Result<Wallet>;

  async fn wallet_ids(&self) -> Result<Vec<WalletId>>;

  async fn limits(&self, wallet_id: &str) -> Result<WalletLimits>;

  async fn balance(&self, wallet_id: &str) -> Result<WalletBalance>;

  async fn set_status(&self, wallet_id: &str, status: WalletStatus) -> Result<Wallet>;

  async fn debit(
    &self,
    wallet_id: &str,
    amount: Amount,
    key: &PostingKey,
    counterparty: Counterparty,
  ) -> Result<JournalEntryId>;

  async fn credit(
    &self,
    wallet_id: &str,
    amount: Amount,
    key: &PostingKey,
    counterparty: Counterparty,
  ) -> Result<JournalEntryId>;

  /// Reserves part of the available balance without posting anything.
  async fn place_hold(&self, wallet_id: &str, hold_id: &str, amount: Amount) -> Result<()>;

  async fn release_hold(&self, wallet_id: &str, hold_id: &str) -> Result<()>;

  async fn reconcile(&self, wallet_id: &str) -> Result<Reconciliation>;
}

#[derive(Debug)]
struct WalletRecord {
  wallet: Wallet,
  limits: WalletLimits,
  holds: HashMap<String, Amount>,
  applied: HashMap<String, AppliedMovement>,
}

impl WalletRecord {
  fn ensure_transactable(&self) -> Result<()> {
    if self.wallet.status.is_transactable() {
      Ok(())
    } else {
      Err(WalletError::NotTransactable(
        self.wallet.id.clone(),
        self.wallet.status,
      ))
    }
  }

  /// The entry of `key` if it was already applied. Reusing a key for another movement is an error.
  fn already_applied(&self, key: &str, credit: bool, amount: Amount) -> Result<Option<JournalEntryId>> {
    match self.applied.get(key) {
      Some(applied) if applied.credit == credit && applied.amount == amount => {
        Ok(Some(applied.entry_id))
      }
      Some(_) => Err(WalletError::KeyConflict(key.to_string())),
      None => Ok(None),
    }
  }
}

/// Implementation of the [`WalletStore`] that keeps wallets in memory and books every movement in a [`LedgerStore`].
///
/// Each wallet sits behind its own async mutex, held for the whole check, post and update sequence,
/// so two debits on one wallet can never both pass the funds check. Different wallets never share a lock.
pub struct InMemoryWalletStore {
  wallets: RwLock<HashMap<WalletId, Arc<Mutex<WalletRecord>>>>,
  ledger: Arc<dyn LedgerStore>,
  clock: Arc<dyn Clock>,
}

impl InMemoryWalletStore {
  pub fn new(ledger: Arc<dyn LedgerStore>, clock: Arc<dyn Clock>) -> Self {
    Self {
      wallets: RwLock::new(HashMap::default()),
      ledger,
      clock,
    }
  }

  fn record(&self, wallet_id: &str) -> Result<Arc<Mutex<WalletRecord>>> {
    self
      .wallets
      .read()
      .map_err(|_| WalletError::Ledger(LedgerError::StoreUnavailable))?
      .get(wallet_id)
      .cloned()
      .ok_or_else(|| WalletError::WalletNotFound(wallet_id.to_string()))
  }

  /// Posts one movement of a wallet against its counterparty.
  async fn post(
    &self,
    record: &WalletRecord,
    amount: Amount,
    key: &PostingKey,
    counterparty: Counterparty,
    credit: bool,
  ) -> Result<JournalEntryId> {
    let counter_account = self
      .ledger
      .account_for_owner(counterparty.owner_reference(), record.wallet.currency)
      .await
      .map_err(ledger_failure)?;
    let wallet_account = record.wallet.ledger_account_id;
    let (debit_account, credit_account) = if credit {
      (counter_account.id, wallet_account)
    } else {
      (wallet_account, counter_account.id)
    };
    let entry = NewJournalEntry::transfer(
      key.to_string(),
      key.transaction_id.clone(),
      debit_account,
      credit_account,
      amount,
    );
    self.ledger.post_entry(entry).await.map_err(ledger_failure)
  }
}

/// A rejected posting built by the wallet store itself can only be a bug.
fn ledger_failure(err: LedgerError) -> WalletError {
  if err.is_transient() {
    WalletError::Ledger(err)
  } else {
    error!(error = %err, "ledger rejected a wallet posting");
    WalletError::LedgerInvariantViolation(err.to_string())
  }
}

#[async_trait]
impl WalletStore for InMemoryWalletStore {
  async fn open_wallet(&self, new_wallet: NewWallet) -> Result<Wallet> {
    if new_wallet.daily_limit < 0 || new_wallet.monthly_limit < 0 {
      return Err(WalletError::InvalidLimits(new_wallet.id));
    }
    if self.record(&new_wallet.id).is_ok() {
      return Err(WalletError::WalletExists(new_wallet.id));
    }

    let account = self
      .ledger
      .open_account(&owner_reference(&new_wallet.id), new_wallet.currency)
      .await?;

    let wallet = Wallet {
      id: new_wallet.id.clone(),
      owner_user_id: new_wallet.owner_user_id,
      kind: new_wallet.kind,
      currency: new_wallet.currency,
      ledger_account_id: account.id,
      balance: 0,
      available_balance: 0,
      status: new_wallet.status,
    };
    let record = WalletRecord {
      wallet: wallet.clone(),
      limits: WalletLimits::new(
        new_wallet.id.clone(),
        new_wallet.daily_limit,
        new_wallet.monthly_limit,
        self.clock.now(),
      ),
      holds: HashMap::default(),
      applied: HashMap::default(),
    };

    let mut wallets = self
      .wallets
      .write()
      .map_err(|_| WalletError::Ledger(LedgerError::StoreUnavailable))?;
    if wallets.contains_key(&new_wallet.id) {
      return Err(WalletError::WalletExists(new_wallet.id));
    }
    wallets.insert(new_wallet.id, Arc::new(Mutex::new(record)));

    debug!(wallet_id = %wallet.id, account_id = %wallet.ledger_account_id, "opened wallet");
    Ok(wallet)
  }

  async fn wallet(&self, wallet_id: &str) -> Result<Wallet> {
    let record = self.record(wallet_id)?;
    let record = record.lock().await;
    Ok(record.wallet.clone())
  }

  async fn wallet_ids(&self) -> Result<Vec<WalletId>> {
    let mut ids: Vec<WalletId> = self
      .wallets
      .read()
      .map_err(|_| WalletError::Ledger(LedgerError::StoreUnavailable))?
      .keys()
      .cloned()
      .collect();
    ids.sort();
    Ok(ids)
  }

  async fn limits(&self, wallet_id: &str) -> Result<WalletLimits> {
    let record = self.record(wallet_id)?;
    let record = record.lock().await;
    Ok(record.limits.clone())
  }

  async fn balance(&self, wallet_id: &str) -> Result<WalletBalance> {
    let record = self.record(wallet_id)?;
    let record = record.lock().await;
    Ok(WalletBalance::from(&record.wallet))
  }

  async fn set_status(&self, wallet_id: &str, status: WalletStatus) -> Result<Wallet> {
    let record = self.record(wallet_id)?;
    let mut record = record.lock().await;
    if record.wallet.status == WalletStatus::Closed && status != WalletStatus::Closed {
      return Err(WalletError::WalletClosed(wallet_id.to_string()));
    }
    record.wallet.status = status;
    debug!(wallet_id, %status, "wallet status changed");
    Ok(record.wallet.clone())
  }

  async fn debit(
    &self,
    wallet_id: &str,
    amount: Amount,
    key: &PostingKey,
    counterparty: Counterparty,
  ) -> Result<JournalEntryId> {
    let record = self.record(wallet_id)?;
    let mut record = record.lock().await;

    let key_str = key.to_string();
    if let Some(entry_id) = record.already_applied(&key_str, false, amount)? {
      debug!(wallet_id, key = %key_str, "debit already applied");
      return Ok(entry_id);
    }

    record.ensure_transactable()?;
    if record.wallet.available_balance < amount.minor() {
      return Err(WalletError::InsufficientFunds {
        wallet_id: wallet_id.to_string(),
        available: record.wallet.available_balance,
        requested: amount.minor(),
      });
    }
    let now = self.clock.now();
    if !record.limits.can_transfer(amount, now) {
      return Err(WalletError::LimitExceeded(wallet_id.to_string()));
    }

    let entry_id = self.post(&record, amount, key, counterparty, false).await?;

    record.wallet.balance -= amount.minor();
    record.wallet.available_balance -= amount.minor();
    record.limits.record_spend(amount, now);
    record.applied.insert(
      key_str,
      AppliedMovement {
        credit: false,
        amount,
        entry_id,
      },
    );

    debug!(wallet_id, %amount, %key, balance = record.wallet.balance, "debited wallet");
    Ok(entry_id)
  }

  async fn credit(
    &self,
    wallet_id: &str,
    amount: Amount,
    key: &PostingKey,
    counterparty: Counterparty,
  ) -> Result<JournalEntryId> {
    let record = self.record(wallet_id)?;
    let mut record = record.lock().await;

    let key_str = key.to_string();
    if let Some(entry_id) = record.already_applied(&key_str, true, amount)? {
      debug!(wallet_id, key = %key_str, "credit already applied");
      return Ok(entry_id);
    }

    record.ensure_transactable()?;

    let entry_id = self.post(&record, amount, key, counterparty, true).await?;

    record.wallet.balance += amount.minor();
    record.wallet.available_balance += amount.minor();
    record.applied.insert(
      key_str,
      AppliedMovement {
        credit: true,
        amount,
        entry_id,
      },
    );

    debug!(wallet_id, %amount, %key, balance = record.wallet.balance, "credited wallet");
    Ok(entry_id)
  }

  async fn place_hold(&self, wallet_id: &str, hold_id: &str, amount: Amount) -> Result<()> {
    let record = self.record(wallet_id)?;
    let mut record = record.lock().await;

    match record.holds.get(hold_id) {
      Some(existing) if *existing == amount => return Ok(()),
      Some(_) => return Err(WalletError::KeyConflict(hold_id.to_string())),
      None => {}
    }
    record.ensure_transactable()?;
    if record.wallet.available_balance < amount.minor() {
      return Err(WalletError::InsufficientFunds {
        wallet_id: wallet_id.to_string(),
        available: record.wallet.available_balance,
        requested: amount.minor(),
      });
    }

    record.wallet.available_balance -= amount.minor();
    record.holds.insert(hold_id.to_string(), amount);
    debug!(wallet_id, hold_id, %amount, "placed hold");
    Ok(())
  }

  async fn release_hold(&self, wallet_id: &str, hold_id: &str) -> Result<()> {
    let record = self.record(wallet_id)?;
    let mut record = record.lock().await;

    let amount = record
      .holds
      .remove(hold_id)
      .ok_or_else(|| WalletError::HoldNotFound(wallet_id.to_string(), hold_id.to_string()))?;
    record.wallet.available_balance += amount.minor();
    debug!(wallet_id, hold_id, %amount, "released hold");
    Ok(())
  }

  async fn reconcile(&self, wallet_id: &str) -> Result<Reconciliation> {
    let record = self.record(wallet_id)?;
    let record = record.lock().await;
    let ledger_balance = self.ledger.balance(record.wallet.ledger_account_id).await?;
    Ok(Reconciliation {
      wallet_id: wallet_id.to_string(),
      cached_balance: record.wallet.balance,
      ledger_balance,
    })
  }
}

#[cfg(test)]
mod tests {

  use std::sync::atomic::{AtomicUsize, Ordering};

  use chrono::Duration;

  use super::*;
  use crate::{
    clock::FixedClock,
    ledger::{Account, AccountId, InMemoryLedgerStore, JournalEntry, JournalEntryId, LedgerResult},
    money::{amount, Currency},
    wallets::{Leg, WalletKind},
  };

  struct Fixture {
    ledger: Arc<InMemoryLedgerStore>,
    clock: Arc<FixedClock>,
    store: InMemoryWalletStore,
  }

  fn fixture() -> Fixture {
    let clock = Arc::new(FixedClock::at(2024, 3, 10, 9));
    let ledger = Arc::new(InMemoryLedgerStore::new(clock.clone()));
    let store = InMemoryWalletStore::new(ledger.clone(), clock.clone());
    Fixture {
      ledger,
      clock,
      store,
    }
  }

  fn new_wallet(id: &str) -> NewWallet {
    NewWallet {
      id: id.to_string(),
      owner_user_id: format!("user-{}", id),
      kind: WalletKind::Personal,
      currency: Currency::Inr,
      status: WalletStatus::Active,
      daily_limit: 5000,
      monthly_limit: 100_000,
    }
  }

  fn key(transaction_id: &str, leg: Leg) -> PostingKey {
    PostingKey::new(transaction_id, leg)
  }

  async fn funded(store: &impl WalletStore, id: &str, minor: i64) {
    store.open_wallet(new_wallet(id)).await.unwrap();
    store
      .credit(
        id,
        amount(minor),
        &key(&format!("fund-{}", id), Leg::Credit),
        Counterparty::External,
      )
      .await
      .unwrap();
  }

  #[tokio::test]
  async fn open_wallet_creates_ledger_account() {
    let f = fixture();

    let wallet = f.store.open_wallet(new_wallet("a")).await.unwrap();

    assert_eq!(wallet.balance, 0);
    assert_eq!(wallet.available_balance, 0);
    assert_eq!(f.ledger.balance(wallet.ledger_account_id).await, Ok(0));
    assert_eq!(
      f.store.open_wallet(new_wallet("a")).await,
      Err(WalletError::WalletExists("a".to_string()))
    );
  }

  #[tokio::test]
  async fn open_wallet_rejects_negative_limits() {
    let f = fixture();

    let result = f
      .store
      .open_wallet(NewWallet {
        daily_limit: -1,
        ..new_wallet("a")
      })
      .await;

    assert_eq!(result, Err(WalletError::InvalidLimits("a".to_string())));
  }

  #[tokio::test]
  async fn debit_updates_balance_limits_and_ledger() {
    let f = fixture();
    funded(&f.store, "a", 10_000).await;

    let result = f
      .store
      .debit("a", amount(3000), &key("tx-1", Leg::Debit), Counterparty::Clearing)
      .await;

    let entry_id = result.unwrap();
    assert_eq!(f.ledger.entries_for("tx-1").await.unwrap()[0].id, entry_id);
    let wallet = f.store.wallet("a").await.unwrap();
    assert_eq!(wallet.balance, 7000);
    assert_eq!(wallet.available_balance, 7000);
    assert_eq!(f.store.limits("a").await.unwrap().daily_spent, 3000);
    assert_eq!(f.ledger.balance(wallet.ledger_account_id).await, Ok(7000));
    let clearing = f
      .ledger
      .account_for_owner("clearing", Currency::Inr)
      .await
      .unwrap();
    assert_eq!(f.ledger.balance(clearing.id).await, Ok(3000));
  }

  #[tokio::test]
  async fn debit_is_idempotent_on_posting_key() {
    let f = fixture();
    funded(&f.store, "a", 10_000).await;
    let debit_key = key("tx-1", Leg::Debit);

    let first = f
      .store
      .debit("a", amount(1000), &debit_key, Counterparty::External)
      .await
      .unwrap();
    for _ in 0..2 {
      let result = f
        .store
        .debit("a", amount(1000), &debit_key, Counterparty::External)
        .await;
      assert_eq!(result, Ok(first));
    }

    assert_eq!(f.store.wallet("a").await.unwrap().balance, 9000);
    assert_eq!(f.store.limits("a").await.unwrap().daily_spent, 1000);
    assert_eq!(f.ledger.entries_for("tx-1").await.unwrap().len(), 1);
  }

  #[tokio::test]
  async fn reusing_a_key_for_another_movement_is_rejected() {
    let f = fixture();
    funded(&f.store, "a", 10_000).await;
    let debit_key = key("tx-1", Leg::Debit);
    f.store
      .debit("a", amount(1000), &debit_key, Counterparty::External)
      .await
      .unwrap();

    let result = f
      .store
      .debit("a", amount(2000), &debit_key, Counterparty::External)
      .await;

    assert_eq!(result, Err(WalletError::KeyConflict("tx-1:debit".to_string())));
  }

  #[tokio::test]
  async fn debit_with_insufficient_funds() {
    let f = fixture();
    funded(&f.store, "a", 1000).await;

    let result = f
      .store
      .debit("a", amount(1001), &key("tx-1", Leg::Debit), Counterparty::External)
      .await;

    assert_eq!(
      result,
      Err(WalletError::InsufficientFunds {
        wallet_id: "a".to_string(),
        available: 1000,
        requested: 1001,
      })
    );
    assert_eq!(f.store.wallet("a").await.unwrap().balance, 1000);
  }

  #[tokio::test]
  async fn debit_over_daily_limit_changes_nothing() {
    let f = fixture();
    funded(&f.store, "a", 10_000).await;
    f.store
      .debit("a", amount(3000), &key("tx-1", Leg::Debit), Counterparty::Clearing)
      .await
      .unwrap();

    let result = f
      .store
      .debit("a", amount(3000), &key("tx-2", Leg::Debit), Counterparty::Clearing)
      .await;

    assert_eq!(result, Err(WalletError::LimitExceeded("a".to_string())));
    let wallet = f.store.wallet("a").await.unwrap();
    assert_eq!(wallet.balance, 7000);
    assert_eq!(f.store.limits("a").await.unwrap().daily_spent, 3000);
    assert!(f.ledger.entries_for("tx-2").await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn daily_limit_frees_up_the_next_day() {
    let f = fixture();
    funded(&f.store, "a", 10_000).await;
    f.store
      .debit("a", amount(5000), &key("tx-1", Leg::Debit), Counterparty::External)
      .await
      .unwrap();

    f.clock.advance(Duration::days(1));
    let result = f
      .store
      .debit("a", amount(4000), &key("tx-2", Leg::Debit), Counterparty::External)
      .await;

    assert!(result.is_ok());
    let limits = f.store.limits("a").await.unwrap();
    assert_eq!(limits.daily_spent, 4000);
    assert_eq!(limits.monthly_spent, 9000);
  }

  #[tokio::test]
  async fn frozen_wallet_is_not_transactable() {
    let f = fixture();
    funded(&f.store, "a", 1000).await;
    f.store.set_status("a", WalletStatus::Frozen).await.unwrap();

    let debit = f
      .store
      .debit("a", amount(10), &key("tx-1", Leg::Debit), Counterparty::External)
      .await;
    let credit = f
      .store
      .credit("a", amount(10), &key("tx-2", Leg::Credit), Counterparty::External)
      .await;

    let expected = Err(WalletError::NotTransactable(
      "a".to_string(),
      WalletStatus::Frozen,
    ));
    assert_eq!(debit, expected);
    assert_eq!(credit, expected);
  }

  #[tokio::test]
  async fn closed_wallet_cannot_be_reopened() {
    let f = fixture();
    f.store.open_wallet(new_wallet("a")).await.unwrap();
    f.store.set_status("a", WalletStatus::Closed).await.unwrap();

    let result = f.store.set_status("a", WalletStatus::Active).await;

    assert_eq!(result, Err(WalletError::WalletClosed("a".to_string())));
  }

  #[tokio::test]
  async fn unknown_wallet() {
    let f = fixture();

    let result = f
      .store
      .credit("nope", amount(10), &key("tx-1", Leg::Credit), Counterparty::External)
      .await;

    assert_eq!(result, Err(WalletError::WalletNotFound("nope".to_string())));
  }

  #[tokio::test]
  async fn holds_reduce_available_balance() {
    let f = fixture();
    funded(&f.store, "a", 1000).await;

    f.store.place_hold("a", "hold-1", amount(600)).await.unwrap();
    let balance = f.store.balance("a").await.unwrap();
    assert_eq!(balance.balance, 1000);
    assert_eq!(balance.available_balance, 400);
    assert_eq!(balance.held_amount, 600);

    let result = f
      .store
      .debit("a", amount(500), &key("tx-1", Leg::Debit), Counterparty::External)
      .await;
    assert!(matches!(result, Err(WalletError::InsufficientFunds { .. })));

    f.store.release_hold("a", "hold-1").await.unwrap();
    assert_eq!(f.store.balance("a").await.unwrap().available_balance, 1000);
    assert_eq!(
      f.store.release_hold("a", "hold-1").await,
      Err(WalletError::HoldNotFound("a".to_string(), "hold-1".to_string()))
    );
  }

  #[tokio::test]
  async fn concurrent_debits_never_overdraw() {
    let f = fixture();
    let store = Arc::new(f.store);
    store
      .open_wallet(NewWallet {
        daily_limit: 1_000_000,
        ..new_wallet("a")
      })
      .await
      .unwrap();
    store
      .credit("a", amount(1000), &key("fund", Leg::Credit), Counterparty::External)
      .await
      .unwrap();

    let handles: Vec<_> = (0..10)
      .map(|index| {
        let store = store.clone();
        tokio::spawn(async move {
          store
            .debit(
              "a",
              amount(600),
              &key(&format!("tx-{}", index), Leg::Debit),
              Counterparty::External,
            )
            .await
        })
      })
      .collect();

    let mut successes = 0;
    let mut insufficient = 0;
    for handle in handles {
      match handle.await.unwrap() {
        Ok(_) => successes += 1,
        Err(WalletError::InsufficientFunds { .. }) => insufficient += 1,
        Err(other) => panic!("unexpected error {}", other),
      }
    }

    assert_eq!(successes, 1);
    assert_eq!(insufficient, 9);
    assert_eq!(store.wallet("a").await.unwrap().balance, 400);
    assert!(store.reconcile("a").await.unwrap().is_consistent());
  }

  /// A ledger that refuses a number of posts before delegating.
  struct UnavailableLedger {
    inner: InMemoryLedgerStore,
    failures: AtomicUsize,
  }

  #[async_trait]
  impl LedgerStore for UnavailableLedger {
    async fn open_account(&self, owner: &str, currency: Currency) -> LedgerResult<Account> {
      self.inner.open_account(owner, currency).await
    }

    async fn account_for_owner(&self, owner: &str, currency: Currency) -> LedgerResult<Account> {
      self.inner.account_for_owner(owner, currency).await
    }

    async fn post_entry(&self, entry: NewJournalEntry) -> LedgerResult<JournalEntryId> {
      let remaining = self.failures.load(Ordering::SeqCst);
      if remaining > 0 {
        self.failures.store(remaining - 1, Ordering::SeqCst);
        return Err(LedgerError::StoreUnavailable);
      }
      self.inner.post_entry(entry).await
    }

    async fn balance(&self, account_id: AccountId) -> LedgerResult<i64> {
      self.inner.balance(account_id).await
    }

    async fn replay_balance(&self, account_id: AccountId) -> LedgerResult<i64> {
      self.inner.replay_balance(account_id).await
    }

    async fn trial_balance(&self, currency: Currency) -> LedgerResult<i64> {
      self.inner.trial_balance(currency).await
    }

    async fn entries_for(&self, reference: &str) -> LedgerResult<Vec<JournalEntry>> {
      self.inner.entries_for(reference).await
    }
  }

  #[tokio::test]
  async fn failed_ledger_post_leaves_wallet_untouched() {
    let clock = Arc::new(FixedClock::at(2024, 3, 10, 9));
    let ledger = Arc::new(UnavailableLedger {
      inner: InMemoryLedgerStore::new(clock.clone()),
      failures: AtomicUsize::new(0),
    });
    let store = InMemoryWalletStore::new(ledger.clone(), clock);
    funded(&store, "a", 5000).await;
    ledger.failures.store(1, Ordering::SeqCst);
    let debit_key = key("tx-1", Leg::Debit);

    let result = store
      .debit("a", amount(1000), &debit_key, Counterparty::External)
      .await;

    assert_eq!(result, Err(WalletError::Ledger(LedgerError::StoreUnavailable)));
    assert!(result.unwrap_err().is_transient());
    assert_eq!(store.wallet("a").await.unwrap().balance, 5000);
    assert_eq!(store.limits("a").await.unwrap().daily_spent, 0);
    assert!(store.reconcile("a").await.unwrap().is_consistent());

    // the retry with the same key goes through exactly once
    assert!(store
      .debit("a", amount(1000), &debit_key, Counterparty::External)
      .await
      .is_ok());
    assert_eq!(store.wallet("a").await.unwrap().balance, 4000);
    assert!(store.reconcile("a").await.unwrap().is_consistent());
  }
}
