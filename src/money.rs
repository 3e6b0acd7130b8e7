//! Monetary values.
//!
//! Every amount handled by the engine is an integer number of minor units (paise, cents, ...).
//! Decimal values only appear at the edges, when reading requests or writing reports,
//! and are converted with [`Currency::to_minor`] and [`Currency::to_major`].

use std::{fmt, str::FromStr};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum MoneyError {
  #[error("Amount must be positive, got {0}")]
  NonPositive(i64),

  #[error("Amount {0} has more decimals than {1} allows")]
  TooPrecise(Decimal, Currency),

  #[error("Amount {0} is out of range")]
  Overflow(Decimal),

  #[error("Unsupported currency: {0}")]
  UnsupportedCurrency(String),
}

/// Currencies the engine can keep books in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
  Inr,
  Usd,
  Eur,
  Jpy,
}

impl Currency {
  pub const fn code(self) -> &'static str {
    match self {
      Currency::Inr => "INR",
      Currency::Usd => "USD",
      Currency::Eur => "EUR",
      Currency::Jpy => "JPY",
    }
  }

  /// Number of fraction digits between the major and the minor unit.
  pub const fn minor_units(self) -> u32 {
    match self {
      Currency::Inr | Currency::Usd | Currency::Eur => 2,
      Currency::Jpy => 0,
    }
  }

  /// Converts a major unit decimal (`30.50`) into minor units (`3050`).
  /// Values with more decimals than the currency supports are rejected instead of rounded.
  pub fn to_minor(self, value: Decimal) -> Result<i64, MoneyError> {
    let value = value.normalize();
    if value.scale() > self.minor_units() {
      return Err(MoneyError::TooPrecise(value, self));
    }
    let factor = Decimal::from(10_i64.pow(self.minor_units()));
    value
      .checked_mul(factor)
      .and_then(|minor| i64::try_from(minor.trunc()).ok())
      .ok_or(MoneyError::Overflow(value))
  }

  /// Converts minor units back into a major unit decimal for presentation.
  pub fn to_major(self, minor: i64) -> Decimal {
    Decimal::new(minor, self.minor_units())
  }
}

impl fmt::Display for Currency {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.code())
  }
}

impl FromStr for Currency {
  type Err = MoneyError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_uppercase().as_str() {
      "INR" => Ok(Currency::Inr),
      "USD" => Ok(Currency::Usd),
      "EUR" => Ok(Currency::Eur),
      "JPY" => Ok(Currency::Jpy),
      other => Err(MoneyError::UnsupportedCurrency(other.to_string())),
    }
  }
}

/// A strictly positive amount of minor units, the only kind of value that can be moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Amount(i64);

impl Amount {
  pub fn new(minor: i64) -> Result<Self, MoneyError> {
    if minor > 0 {
      Ok(Self(minor))
    } else {
      Err(MoneyError::NonPositive(minor))
    }
  }

  pub const fn minor(self) -> i64 {
    self.0
  }
}

impl TryFrom<i64> for Amount {
  type Error = MoneyError;

  fn try_from(value: i64) -> Result<Self, Self::Error> {
    Amount::new(value)
  }
}

impl From<Amount> for i64 {
  fn from(amount: Amount) -> Self {
    amount.0
  }
}

impl fmt::Display for Amount {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

#[cfg(test)]
pub(crate) fn amount(minor: i64) -> Amount {
  Amount::new(minor).unwrap()
}
