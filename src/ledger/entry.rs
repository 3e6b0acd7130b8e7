use std::{collections::HashMap, fmt};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::store::LedgerError;
use crate::money::{Amount, Currency};

/// Alias for a ledger account ID
pub type AccountId = Uuid;

/// Alias for a journal entry ID
pub type JournalEntryId = Uuid;

/// An account in the books. Accounts are created once and never change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Account {
  pub id: AccountId,
  /// Opaque link to whatever owns the money, `wallet:<id>` or a system owner like `external`.
  pub owner_reference: String,
  pub currency: Currency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
  Debit,
  Credit,
}

impl fmt::Display for Side {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Side::Debit => f.write_str("debit"),
      Side::Credit => f.write_str("credit"),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerLine {
  pub journal_entry_id: JournalEntryId,
  pub account_id: AccountId,
  pub side: Side,
  pub amount: Amount,
}

impl LedgerLine {
  /// Effect of the line on the balance of its account: credits add, debits subtract.
  pub fn signed_amount(&self) -> i64 {
    match self.side {
      Side::Credit => self.amount.minor(),
      Side::Debit => -self.amount.minor(),
    }
  }
}

/// A posted, balanced and immutable set of lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JournalEntry {
  pub id: JournalEntryId,
  pub created_at: DateTime<Utc>,
  /// The transaction that caused this entry.
  pub reference: String,
  pub idempotency_key: String,
  pub currency: Currency,
  pub lines: Vec<LedgerLine>,
}

/// A line as submitted by a caller, before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLine {
  pub account_id: AccountId,
  pub side: Side,
  pub amount: i64,
}

/// A journal entry as submitted by a caller. It only becomes a [`JournalEntry`] once posted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewJournalEntry {
  pub idempotency_key: String,
  pub reference: String,
  pub lines: Vec<NewLine>,
}

impl NewJournalEntry {
  /// The common two line entry moving `amount` out of `debit` and into `credit`.
  pub fn transfer(
    idempotency_key: impl Into<String>,
    reference: impl Into<String>,
    debit: AccountId,
    credit: AccountId,
    amount: Amount,
  ) -> Self {
    Self {
      idempotency_key: idempotency_key.into(),
      reference: reference.into(),
      lines: vec![
        NewLine {
          account_id: debit,
          side: Side::Debit,
          amount: amount.minor(),
        },
        NewLine {
          account_id: credit,
          side: Side::Credit,
          amount: amount.minor(),
        },
      ],
    }
  }

  /// Checks the entry against the known accounts and returns the single currency it is written in.
  pub(crate) fn validate(&self, accounts: &HashMap<AccountId, Account>) -> Result<Currency, LedgerError> {
    if self.idempotency_key.is_empty() {
      return Err(LedgerError::InvalidEntry("missing idempotency key".to_string()));
    }
    if self.lines.len() < 2 {
      return Err(LedgerError::InvalidEntry(format!(
        "an entry needs at least two lines, got {}",
        self.lines.len()
      )));
    }

    let mut currency = None;
    let mut debits: i128 = 0;
    let mut credits: i128 = 0;

    for line in &self.lines {
      if line.amount <= 0 {
        return Err(LedgerError::InvalidEntry(format!(
          "non-positive amount {} for account {}",
          line.amount, line.account_id
        )));
      }
      let account = accounts
        .get(&line.account_id)
        .ok_or(LedgerError::AccountNotFound(line.account_id))?;
      match currency {
        None => currency = Some(account.currency),
        Some(current) if current != account.currency => {
          return Err(LedgerError::InvalidEntry(format!(
            "mixed currencies {} and {}",
            current, account.currency
          )));
        }
        Some(_) => {}
      }
      match line.side {
        Side::Debit => debits += i128::from(line.amount),
        Side::Credit => credits += i128::from(line.amount),
      }
    }

    if debits != credits {
      return Err(LedgerError::Unbalanced { debits, credits });
    }

    currency.ok_or_else(|| LedgerError::InvalidEntry("entry without lines".to_string()))
  }
}
