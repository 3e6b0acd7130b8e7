use std::{
  collections::HashMap,
  sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use super::entry::{
  Account, AccountId, JournalEntry, JournalEntryId, LedgerLine, NewJournalEntry, Side,
};
use crate::{
  clock::Clock,
  money::{Amount, Currency},
};

pub type Result<T> = core::result::Result<T, LedgerError>;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum LedgerError {
  #[error("Invalid journal entry: {0}")]
  InvalidEntry(String),

  #[error("Unbalanced journal entry: debits {debits} != credits {credits}")]
  Unbalanced { debits: i128, credits: i128 },

  #[error("Account not found: {0}")]
  AccountNotFound(AccountId),

  #[error("Ledger store unavailable")]
  StoreUnavailable,
}

impl LedgerError {
  /// Only an unavailable store is worth retrying, everything else is the caller's fault.
  pub fn is_transient(&self) -> bool {
    matches!(self, LedgerError::StoreUnavailable)
  }
}

/// The system of record for money.
///
/// Balances are `sum(credit lines) - sum(debit lines)` for an account, so the balances of all
/// the accounts of one currency always add up to zero.
#[async_trait]
pub trait LedgerStore: Send + Sync {
  /// Opens a new account. Accounts are never deleted.
  async fn open_account(&self, owner_reference: &str, currency: Currency) -> Result<Account>;

  /// Returns the account of `owner_reference` in `currency`, opening it the first time.
  async fn account_for_owner(&self, owner_reference: &str, currency: Currency) -> Result<Account>;

  /// Posts a balanced entry atomically.
  /// Posting twice with the same idempotency key is a no-op that returns the original entry ID.
  async fn post_entry(&self, entry: NewJournalEntry) -> Result<JournalEntryId>;

  /// Current balance of an account.
  async fn balance(&self, account_id: AccountId) -> Result<i64>;

  /// Balance of an account recomputed from every line ever posted to it.
  async fn replay_balance(&self, account_id: AccountId) -> Result<i64>;

  /// Sum of the balances of every account in `currency`.
  async fn trial_balance(&self, currency: Currency) -> Result<i64>;

  /// Entries posted on behalf of a transaction, in posting order.
  async fn entries_for(&self, reference: &str) -> Result<Vec<JournalEntry>>;
}

#[derive(Debug, Default)]
struct LedgerState {
  accounts: HashMap<AccountId, Account>,
  owners: HashMap<(String, Currency), AccountId>,
  entries: Vec<JournalEntry>,
  entries_by_key: HashMap<String, JournalEntryId>,
  balances: HashMap<AccountId, i64>,
}

impl LedgerState {
  fn insert_account(&mut self, owner_reference: &str, currency: Currency) -> Account {
    let account = Account {
      id: Uuid::new_v4(),
      owner_reference: owner_reference.to_string(),
      currency,
    };
    self
      .owners
      .entry((owner_reference.to_string(), currency))
      .or_insert(account.id);
    self.balances.insert(account.id, 0);
    self.accounts.insert(account.id, account.clone());
    account
  }

  fn account_balance(&self, account_id: AccountId) -> Result<i64> {
    self
      .balances
      .get(&account_id)
      .copied()
      .ok_or(LedgerError::AccountNotFound(account_id))
  }
}

/// Implementation of the [`LedgerStore`] that keeps the books in memory.
///
/// All the state sits behind one lock, so concurrent posts are serialized and an entry is either
/// fully applied or not applied at all. Balances are materialized on every post.
pub struct InMemoryLedgerStore {
  state: Mutex<LedgerState>,
  clock: Arc<dyn Clock>,
}

impl InMemoryLedgerStore {
  pub fn new(clock: Arc<dyn Clock>) -> Self {
    Self {
      state: Mutex::new(LedgerState::default()),
      clock,
    }
  }

  fn state(&self) -> Result<MutexGuard<'_, LedgerState>> {
    self.state.lock().map_err(|_| LedgerError::StoreUnavailable)
  }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
  async fn open_account(&self, owner_reference: &str, currency: Currency) -> Result<Account> {
    let mut state = self.state()?;
    let account = state.insert_account(owner_reference, currency);
    debug!(account_id = %account.id, owner = owner_reference, %currency, "opened ledger account");
    Ok(account)
  }

  async fn account_for_owner(&self, owner_reference: &str, currency: Currency) -> Result<Account> {
    let mut state = self.state()?;
    let existing = state
      .owners
      .get(&(owner_reference.to_string(), currency))
      .and_then(|account_id| state.accounts.get(account_id))
      .cloned();
    match existing {
      Some(account) => Ok(account),
      None => {
        let account = state.insert_account(owner_reference, currency);
        debug!(account_id = %account.id, owner = owner_reference, %currency, "opened ledger account");
        Ok(account)
      }
    }
  }

  async fn post_entry(&self, entry: NewJournalEntry) -> Result<JournalEntryId> {
    let mut state = self.state()?;

    if let Some(existing) = state.entries_by_key.get(&entry.idempotency_key) {
      debug!(key = %entry.idempotency_key, entry_id = %existing, "duplicate post ignored");
      return Ok(*existing);
    }

    let currency = entry.validate(&state.accounts)?;

    // Compute every new balance before touching any, so a failure leaves no trace.
    let mut updated: HashMap<AccountId, i64> = HashMap::new();
    for line in &entry.lines {
      let current = match updated.get(&line.account_id) {
        Some(balance) => *balance,
        None => state.account_balance(line.account_id)?,
      };
      let delta = match line.side {
        Side::Credit => line.amount,
        Side::Debit => -line.amount,
      };
      let next = current.checked_add(delta).ok_or_else(|| {
        LedgerError::InvalidEntry(format!("balance overflow on account {}", line.account_id))
      })?;
      updated.insert(line.account_id, next);
    }

    let id = Uuid::new_v4();
    let lines = entry
      .lines
      .iter()
      .map(|line| {
        Amount::new(line.amount)
          .map(|amount| LedgerLine {
            journal_entry_id: id,
            account_id: line.account_id,
            side: line.side,
            amount,
          })
          .map_err(|err| LedgerError::InvalidEntry(err.to_string()))
      })
      .collect::<Result<Vec<_>>>()?;

    state.balances.extend(updated);
    state.entries_by_key.insert(entry.idempotency_key.clone(), id);
    state.entries.push(JournalEntry {
      id,
      created_at: self.clock.now(),
      reference: entry.reference,
      idempotency_key: entry.idempotency_key,
      currency,
      lines,
    });

    debug!(entry_id = %id, %currency, "posted journal entry");
    Ok(id)
  }

  async fn balance(&self, account_id: AccountId) -> Result<i64> {
    self.state()?.account_balance(account_id)
  }

  async fn replay_balance(&self, account_id: AccountId) -> Result<i64> {
    let state = self.state()?;
    if !state.accounts.contains_key(&account_id) {
      return Err(LedgerError::AccountNotFound(account_id));
    }
    Ok(
      state
        .entries
        .iter()
        .flat_map(|entry| entry.lines.iter())
        .filter(|line| line.account_id == account_id)
        .map(LedgerLine::signed_amount)
        .sum(),
    )
  }

  async fn trial_balance(&self, currency: Currency) -> Result<i64> {
    let state = self.state()?;
    Ok(
      state
        .accounts
        .values()
        .filter(|account| account.currency == currency)
        .filter_map(|account| state.balances.get(&account.id))
        .sum(),
    )
  }

  async fn entries_for(&self, reference: &str) -> Result<Vec<JournalEntry>> {
    Ok(
      self
        .state()?
        .entries
        .iter()
        .filter(|entry| entry.reference == reference)
        .cloned()
        .collect(),
    )
  }
}
