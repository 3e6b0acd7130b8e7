use std::convert::TryFrom;

use anyhow::{anyhow, Result};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::{money::Currency, transactions::TransactionRequest};

/// The types of requests supported by the reader
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestType {
  Transfer,
  Deposit,
  Withdrawal,
  Fee,
  Reversal,
  Refund,
}

/// A deserializable request. Amounts are in major units of the currency.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Request {
  #[serde(rename = "type")]
  kind: RequestType,

  #[serde(rename = "tx")]
  transaction_id: Option<String>,

  #[serde(rename = "source")]
  source_wallet_id: Option<String>,

  #[serde(rename = "destination")]
  destination_wallet_id: Option<String>,

  amount: Option<Decimal>,

  currency: Option<Currency>,

  #[serde(rename = "parent")]
  parent_transaction_id: Option<String>,
}

/// Number of columns of a request row.
pub const COLUMNS: usize = 7;

impl TryFrom<Request> for TransactionRequest {
  type Error = anyhow::Error;

  /// Conversion from a deserializable request into one the orchestrator understands.
  fn try_from(request: Request) -> Result<Self> {
    let id = request.transaction_id;
    let request = match request.kind {
      RequestType::Transfer => {
        let (amount, currency) = money(request.amount, request.currency)?;
        TransactionRequest::Transfer {
          id,
          source_wallet_id: required(request.source_wallet_id, "source")?,
          destination_wallet_id: required(request.destination_wallet_id, "destination")?,
          amount,
          currency,
          description: None,
        }
      }
      RequestType::Deposit => {
        let (amount, currency) = money(request.amount, request.currency)?;
        TransactionRequest::Deposit {
          id,
          destination_wallet_id: required(request.destination_wallet_id, "destination")?,
          amount,
          currency,
        }
      }
      RequestType::Withdrawal => {
        let (amount, currency) = money(request.amount, request.currency)?;
        TransactionRequest::Withdrawal {
          id,
          source_wallet_id: required(request.source_wallet_id, "source")?,
          amount,
          currency,
        }
      }
      RequestType::Fee => {
        let (amount, currency) = money(request.amount, request.currency)?;
        TransactionRequest::Fee {
          id,
          source_wallet_id: required(request.source_wallet_id, "source")?,
          amount,
          currency,
        }
      }
      RequestType::Reversal => TransactionRequest::Reversal {
        id,
        parent_transaction_id: required(request.parent_transaction_id, "parent")?,
      },
      RequestType::Refund => {
        // the currency is kept so it can be checked against the parent
        let (amount, currency) = match request.amount {
          Some(amount) => {
            let (amount, currency) = money(Some(amount), request.currency)?;
            (Some(amount), Some(currency))
          }
          None => (None, request.currency),
        };
        TransactionRequest::Refund {
          id,
          parent_transaction_id: required(request.parent_transaction_id, "parent")?,
          amount,
          currency,
        }
      }
    };
    Ok(request)
  }
}

fn required(value: Option<String>, column: &str) -> Result<String> {
  value.ok_or_else(|| anyhow!("Missing {}", column))
}

fn money(amount: Option<Decimal>, currency: Option<Currency>) -> Result<(i64, Currency)> {
  let amount = amount.ok_or_else(|| anyhow!("Missing amount"))?;
  let currency = currency.ok_or_else(|| anyhow!("Missing currency"))?;
  Ok((currency.to_minor(amount)?, currency))
}

#[cfg(test)]
mod tests {

  use rust_decimal_macros::dec;

  use super::*;

  fn request(kind: RequestType) -> Request {
    Request {
      kind,
      transaction_id: Some("tx-1".to_string()),
      source_wallet_id: Some("a".to_string()),
      destination_wallet_id: Some("b".to_string()),
      amount: Some(dec!(30.50)),
      currency: Some(Currency::Inr),
      parent_transaction_id: Some("tx-0".to_string()),
    }
  }

  #[test]
  fn transaction_request_from() {
    let cases = vec![
      (
        request(RequestType::Transfer),
        TransactionRequest::Transfer {
          id: Some("tx-1".to_string()),
          source_wallet_id: "a".to_string(),
          destination_wallet_id: "b".to_string(),
          amount: 3050,
          currency: Currency::Inr,
          description: None,
        },
      ),
      (
        request(RequestType::Deposit),
        TransactionRequest::Deposit {
          id: Some("tx-1".to_string()),
          destination_wallet_id: "b".to_string(),
          amount: 3050,
          currency: Currency::Inr,
        },
      ),
      (
        request(RequestType::Fee),
        TransactionRequest::Fee {
          id: Some("tx-1".to_string()),
          source_wallet_id: "a".to_string(),
          amount: 3050,
          currency: Currency::Inr,
        },
      ),
      (
        request(RequestType::Reversal),
        TransactionRequest::Reversal {
          id: Some("tx-1".to_string()),
          parent_transaction_id: "tx-0".to_string(),
        },
      ),
      (
        Request {
          amount: None,
          ..request(RequestType::Refund)
        },
        TransactionRequest::Refund {
          id: Some("tx-1".to_string()),
          parent_transaction_id: "tx-0".to_string(),
          amount: None,
          currency: Some(Currency::Inr),
        },
      ),
      (
        Request {
          amount: Some(dec!(100)),
          currency: Some(Currency::Jpy),
          ..request(RequestType::Refund)
        },
        TransactionRequest::Refund {
          id: Some("tx-1".to_string()),
          parent_transaction_id: "tx-0".to_string(),
          amount: Some(100),
          currency: Some(Currency::Jpy),
        },
      ),
      (
        Request {
          amount: Some(dec!(1.00)),
          ..request(RequestType::Refund)
        },
        TransactionRequest::Refund {
          id: Some("tx-1".to_string()),
          parent_transaction_id: "tx-0".to_string(),
          amount: Some(100),
          currency: Some(Currency::Inr),
        },
      ),
    ];

    for (input, expected) in cases {
      assert_eq!(TransactionRequest::try_from(input).unwrap(), expected)
    }
  }

  #[test]
  fn incomplete_requests_are_rejected() {
    let cases = vec![
      Request {
        destination_wallet_id: None,
        ..request(RequestType::Transfer)
      },
      Request {
        currency: None,
        ..request(RequestType::Withdrawal)
      },
      Request {
        amount: Some(dec!(1.005)),
        ..request(RequestType::Deposit)
      },
      Request {
        parent_transaction_id: None,
        ..request(RequestType::Reversal)
      },
    ];

    for input in cases {
      assert!(TransactionRequest::try_from(input).is_err());
    }
  }
}
