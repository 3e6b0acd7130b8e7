use rust_decimal::Decimal;
use serde::Serialize;

use crate::{
  money::Currency,
  transactions,
  wallets::{WalletId, WalletStatus},
};

/// A report on a wallet state used to serialize into a CSV file. Amounts are in major units.
#[derive(Debug, PartialEq, Serialize)]
pub struct WalletReport {
  wallet: WalletId,
  currency: Currency,
  balance: Decimal,
  available: Decimal,
  held: Decimal,
  ledger_balance: Decimal,
  status: WalletStatus,
}

impl From<transactions::WalletReport> for WalletReport {
  /// A conversion between the domain representation of a wallet report into a serializable structure
  fn from(report: transactions::WalletReport) -> Self {
    let currency = report.balance.currency;
    WalletReport {
      wallet: report.balance.wallet_id,
      currency,
      balance: currency.to_major(report.balance.balance),
      available: currency.to_major(report.balance.available_balance),
      held: currency.to_major(report.balance.held_amount),
      ledger_balance: currency.to_major(report.ledger_balance),
      status: report.balance.status,
    }
  }
}
