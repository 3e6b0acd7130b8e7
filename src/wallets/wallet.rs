use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
  ledger::{AccountId, JournalEntryId},
  money::{Amount, Currency},
};

/// Alias for a wallet ID. Wallet IDs are ordered lexicographically when two wallets are involved.
pub type WalletId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalletStatus {
  Active,
  Frozen,
  Closed,
  Inactive,
}

impl WalletStatus {
  /// Only active wallets can send or receive money.
  pub fn is_transactable(self) -> bool {
    matches!(self, WalletStatus::Active)
  }
}

impl fmt::Display for WalletStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let status = match self {
      WalletStatus::Active => "active",
      WalletStatus::Frozen => "frozen",
      WalletStatus::Closed => "closed",
      WalletStatus::Inactive => "inactive",
    };
    f.write_str(status)
  }
}

impl FromStr for WalletStatus {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "active" => Ok(WalletStatus::Active),
      "frozen" => Ok(WalletStatus::Frozen),
      "closed" => Ok(WalletStatus::Closed),
      "inactive" => Ok(WalletStatus::Inactive),
      other => Err(format!("Invalid wallet status: {}", other)),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalletKind {
  Personal,
  Business,
  Savings,
}

impl Default for WalletKind {
  fn default() -> Self {
    WalletKind::Personal
  }
}

/// A customer facing wallet, backed 1:1 by a ledger account.
///
/// `balance` and `available_balance` are a cache of the ledger, only updated after a successful posting.
/// `available_balance` is the balance minus the outstanding holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Wallet {
  pub id: WalletId,
  pub owner_user_id: String,
  pub kind: WalletKind,
  pub currency: Currency,
  pub ledger_account_id: AccountId,
  pub balance: i64,
  pub available_balance: i64,
  pub status: WalletStatus,
}

impl Wallet {
  pub fn held_amount(&self) -> i64 {
    self.balance - self.available_balance
  }
}

pub(crate) fn owner_reference(wallet_id: &str) -> String {
  format!("wallet:{}", wallet_id)
}

/// What is needed to open a wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewWallet {
  pub id: WalletId,
  pub owner_user_id: String,
  pub kind: WalletKind,
  pub currency: Currency,
  pub status: WalletStatus,
  pub daily_limit: i64,
  pub monthly_limit: i64,
}

/// Balance view of a wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WalletBalance {
  pub wallet_id: WalletId,
  pub currency: Currency,
  pub balance: i64,
  pub available_balance: i64,
  pub held_amount: i64,
  pub status: WalletStatus,
}

impl From<&Wallet> for WalletBalance {
  fn from(wallet: &Wallet) -> Self {
    Self {
      wallet_id: wallet.id.clone(),
      currency: wallet.currency,
      balance: wallet.balance,
      available_balance: wallet.available_balance,
      held_amount: wallet.held_amount(),
      status: wallet.status,
    }
  }
}

/// Who is on the other side of a single wallet movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Counterparty {
  /// Money in flight between two wallets.
  Clearing,
  /// Money entering or leaving the platform.
  External,
  Fees,
}

impl Counterparty {
  pub fn owner_reference(self) -> &'static str {
    match self {
      Counterparty::Clearing => "clearing",
      Counterparty::External => "external",
      Counterparty::Fees => "fees",
    }
  }
}

/// Which step of a transaction a posting belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Leg {
  Debit,
  Credit,
  /// Compensation of a debit whose paired credit could not be applied.
  Reverse,
}

/// Idempotency key of one wallet movement: the owning transaction plus the leg.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PostingKey {
  pub transaction_id: String,
  pub leg: Leg,
}

impl PostingKey {
  pub fn new(transaction_id: impl Into<String>, leg: Leg) -> Self {
    Self {
      transaction_id: transaction_id.into(),
      leg,
    }
  }
}

impl fmt::Display for PostingKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let leg = match self.leg {
      Leg::Debit => "debit",
      Leg::Credit => "credit",
      Leg::Reverse => "reverse",
    };
    write!(f, "{}:{}", self.transaction_id, leg)
  }
}

/// A movement already applied to a wallet, remembered to answer retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct AppliedMovement {
  pub credit: bool,
  pub amount: Amount,
  pub entry_id: JournalEntryId,
}

#[cfg(test)]
mod tests {

  use super::*;

  #[test]
  fn posting_key_display() {
    assert_eq!(PostingKey::new("tx-1", Leg::Debit).to_string(), "tx-1:debit");
    assert_eq!(PostingKey::new("tx-1", Leg::Credit).to_string(), "tx-1:credit");
    assert_eq!(PostingKey::new("tx-1", Leg::Reverse).to_string(), "tx-1:reverse");
  }

  #[test]
  fn only_active_wallets_are_transactable() {
    let cases = vec![
      (WalletStatus::Active, true),
      (WalletStatus::Frozen, false),
      (WalletStatus::Closed, false),
      (WalletStatus::Inactive, false),
    ];

    for (status, expected) in cases {
      assert_eq!(status.is_transactable(), expected);
    }
  }

  #[test]
  fn wallet_status_round_trips_through_strings() {
    for status in ["active", "frozen", "closed", "inactive"] {
      assert_eq!(status.parse::<WalletStatus>().unwrap().to_string(), status);
    }
    assert!("deleted".parse::<WalletStatus>().is_err());
  }
}
