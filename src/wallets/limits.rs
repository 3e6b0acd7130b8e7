use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use serde::Serialize;

use super::wallet::WalletId;
use crate::money::Amount;

/// Daily and monthly spend limits of a wallet.
///
/// Windows are calendar days and calendar months in UTC. There is no job resetting the counters:
/// a window that has elapsed is rebased by the next debit, however many windows were skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WalletLimits {
  pub wallet_id: WalletId,
  pub daily_limit: i64,
  pub daily_spent: i64,
  pub daily_reset_at: DateTime<Utc>,
  pub monthly_limit: i64,
  pub monthly_spent: i64,
  pub monthly_reset_at: DateTime<Utc>,
  /// Bumped on every recorded spend.
  pub version: u64,
}

impl WalletLimits {
  pub fn new(wallet_id: WalletId, daily_limit: i64, monthly_limit: i64, now: DateTime<Utc>) -> Self {
    Self {
      wallet_id,
      daily_limit,
      daily_spent: 0,
      daily_reset_at: next_day(now),
      monthly_limit,
      monthly_spent: 0,
      monthly_reset_at: next_month(now),
      version: 0,
    }
  }

  /// What is left to spend today, never below zero.
  pub fn remaining_daily(&self, now: DateTime<Utc>) -> i64 {
    remaining(self.daily_limit, self.daily_spent, self.daily_reset_at, now)
  }

  /// What is left to spend this month, never below zero.
  pub fn remaining_monthly(&self, now: DateTime<Utc>) -> i64 {
    remaining(self.monthly_limit, self.monthly_spent, self.monthly_reset_at, now)
  }

  pub fn can_transfer(&self, amount: Amount, now: DateTime<Utc>) -> bool {
    amount.minor() <= self.remaining_daily(now) && amount.minor() <= self.remaining_monthly(now)
  }

  /// Accounts a successful debit, rebasing any elapsed window first.
  pub fn record_spend(&mut self, amount: Amount, now: DateTime<Utc>) {
    if now >= self.daily_reset_at {
      self.daily_spent = 0;
      self.daily_reset_at = next_day(now);
    }
    if now >= self.monthly_reset_at {
      self.monthly_spent = 0;
      self.monthly_reset_at = next_month(now);
    }
    self.daily_spent += amount.minor();
    self.monthly_spent += amount.minor();
    self.version += 1;
  }
}

fn remaining(limit: i64, spent: i64, reset_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
  let spent = if now >= reset_at { 0 } else { spent };
  limit.saturating_sub(spent).max(0)
}

fn start_of(date: Option<NaiveDate>) -> DateTime<Utc> {
  date
    .and_then(|date| date.and_hms_opt(0, 0, 0))
    .map(|midnight| Utc.from_utc_datetime(&midnight))
    .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Next UTC midnight strictly after `now`.
fn next_day(now: DateTime<Utc>) -> DateTime<Utc> {
  start_of(now.date_naive().succ_opt())
}

/// First instant of the month following `now`.
fn next_month(now: DateTime<Utc>) -> DateTime<Utc> {
  let (year, month) = if now.month() == 12 {
    (now.year() + 1, 1)
  } else {
    (now.year(), now.month() + 1)
  };
  start_of(NaiveDate::from_ymd_opt(year, month, 1))
}

#[cfg(test)]
mod tests {

  use super::*;
  use crate::money::amount;

  fn at(year: i32, month: u32, day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, 0, 0).unwrap()
  }

  #[test]
  fn new_limits_start_empty_with_next_boundaries() {
    let limits = WalletLimits::new("a".to_string(), 5000, 20000, at(2024, 12, 31, 15));

    assert_eq!(limits.daily_spent, 0);
    assert_eq!(limits.monthly_spent, 0);
    assert_eq!(limits.daily_reset_at, at(2025, 1, 1, 0));
    assert_eq!(limits.monthly_reset_at, at(2025, 1, 1, 0));
  }

  #[test]
  fn can_transfer_within_both_windows() {
    let now = at(2024, 3, 10, 9);
    let mut limits = WalletLimits::new("a".to_string(), 5000, 6000, now);

    assert!(limits.can_transfer(amount(3000), now));
    limits.record_spend(amount(3000), now);

    assert_eq!(limits.daily_spent, 3000);
    assert_eq!(limits.remaining_daily(now), 2000);
    assert!(!limits.can_transfer(amount(3000), now));
    assert!(limits.can_transfer(amount(2000), now));
  }

  #[test]
  fn monthly_limit_applies_across_days() {
    let mut limits = WalletLimits::new("a".to_string(), 5000, 6000, at(2024, 3, 10, 9));
    limits.record_spend(amount(4000), at(2024, 3, 10, 9));

    let next_day = at(2024, 3, 11, 9);
    assert_eq!(limits.remaining_daily(next_day), 5000);
    assert_eq!(limits.remaining_monthly(next_day), 2000);
    assert!(!limits.can_transfer(amount(2500), next_day));
  }

  #[test]
  fn elapsed_windows_are_rebased_on_spend() {
    let mut limits = WalletLimits::new("a".to_string(), 5000, 6000, at(2024, 1, 15, 9));
    limits.record_spend(amount(4500), at(2024, 1, 15, 9));

    // untouched for several windows
    let later = at(2024, 4, 2, 18);
    assert!(limits.can_transfer(amount(5000), later));
    limits.record_spend(amount(1000), later);

    assert_eq!(limits.daily_spent, 1000);
    assert_eq!(limits.monthly_spent, 1000);
    assert_eq!(limits.daily_reset_at, at(2024, 4, 3, 0));
    assert_eq!(limits.monthly_reset_at, at(2024, 5, 1, 0));
    assert_eq!(limits.version, 2);
  }

  #[test]
  fn remaining_is_clamped_at_zero() {
    let now = at(2024, 6, 1, 0);
    let mut limits = WalletLimits::new("a".to_string(), 100, 1000, now);
    limits.daily_spent = 250;

    assert_eq!(limits.remaining_daily(now), 0);
    assert!(!limits.can_transfer(amount(1), now));
  }
}
