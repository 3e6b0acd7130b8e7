use std::convert::TryFrom;

use anyhow::Result;
use tokio::io::AsyncRead;
use tokio_stream::{Stream, StreamExt};

use super::request::COLUMNS;
use crate::transactions::TransactionRequest;

/// Source of the requests to submit, one item per request in the order they were written.
pub trait RequestsReader {
  /// A bad request does not end the stream: it is yielded as an `Err` and the next one follows.
  fn read_requests<'a>(
    &'a mut self,
  ) -> Box<dyn Stream<Item = Result<TransactionRequest>> + Unpin + 'a>;
}

/// Reads `type,tx,source,destination,amount,currency,parent` rows with a header line.
///
/// Fields are trimmed and the columns a request does not need can be left empty or cut off at the end
/// of the row, so `reversal,t5,,,,,t2` and `deposit,t1,,a,100,INR` are both complete.
/// Amounts are decimals in major units of the row currency.
pub struct CsvRequestsReader<R>(R);

impl<R> CsvRequestsReader<R>
where
  R: AsyncRead + Unpin + Send + Sync,
{
  pub fn new(reader: R) -> Self {
    Self(reader)
  }
}

impl<R> RequestsReader for CsvRequestsReader<R>
where
  R: AsyncRead + Unpin + Send + Sync,
{
  fn read_requests<'a>(
    &'a mut self,
  ) -> Box<dyn Stream<Item = Result<TransactionRequest>> + Unpin + 'a> {
    Box::new(
      csv_async::AsyncReaderBuilder::new()
        .flexible(true)
        .create_reader(&mut self.0)
        .into_records()
        .map(|maybe_record| {
          maybe_record
            .and_then(|mut record| {
              record.trim();
              // trailing optional columns may be left out
              while record.len() < COLUMNS {
                record.push_field("");
              }
              record.deserialize::<super::request::Request>(None)
            })
            .map_err(anyhow::Error::from)
            .and_then(TransactionRequest::try_from)
        }),
    )
  }
}

#[cfg(test)]
mod tests {

  use indoc::indoc;

  use super::*;
  use crate::money::Currency;

  #[tokio::test]
  async fn read_requests_with_format_errors() {
    let input = indoc! { "
      type,      tx,  source, destination, amount, currency, parent
      transfer
      transfer,,,,,,
      deposit,   t1,       ,           a,   10.5
      withdrawal,t2,      a,            ,  -abc,      INR
      fee,       t3,      a,            ,   1.001,    INR
      unknown,   t4,      a,           b,   1,        INR
      reversal,  t5
      refund,    t6,       ,            ,   1
    " }
    .as_bytes();

    let mut reader = CsvRequestsReader::new(input);

    let requests = reader
      .read_requests()
      .map(|request| request.map(|_| "ok").unwrap_or_else(|_| "err"))
      .collect::<Vec<&str>>()
      .await;

    assert_eq!(requests.iter().filter(|v| **v == "err").count(), 8);
    assert_eq!(requests.iter().filter(|v| **v == "ok").count(), 0);
  }

  #[tokio::test]
  async fn read_requests_success() {
    let input = indoc! { "
      type,        tx,  source, destination,  amount, currency, parent
      deposit,     t1,        ,           a,     100,      INR
      transfer,    t2,       a,           b,   30.50,      INR
       withdrawal, t3,       b,            ,      10,      INR,
      fee,           ,       a,            ,    0.25,      INR
      reversal,    t5,        ,            ,        ,         ,     t2
      refund,      t6,        ,            ,       5,      INR,     t1
      deposit,     t7,        ,          jp,    1200,      JPY
    " }
    .as_bytes();

    let mut reader = CsvRequestsReader::new(input);

    let requests = reader
      .read_requests()
      .map(|request| request.map_err(|err| err.to_string()))
      .collect::<Vec<Result<TransactionRequest, String>>>()
      .await;

    assert_eq!(
      requests,
      vec![
        Ok(TransactionRequest::Deposit {
          id: Some("t1".to_string()),
          destination_wallet_id: "a".to_string(),
          amount: 10_000,
          currency: Currency::Inr,
        }),
        Ok(TransactionRequest::Transfer {
          id: Some("t2".to_string()),
          source_wallet_id: "a".to_string(),
          destination_wallet_id: "b".to_string(),
          amount: 3050,
          currency: Currency::Inr,
          description: None,
        }),
        Ok(TransactionRequest::Withdrawal {
          id: Some("t3".to_string()),
          source_wallet_id: "b".to_string(),
          amount: 1000,
          currency: Currency::Inr,
        }),
        Ok(TransactionRequest::Fee {
          id: None,
          source_wallet_id: "a".to_string(),
          amount: 25,
          currency: Currency::Inr,
        }),
        Ok(TransactionRequest::Reversal {
          id: Some("t5".to_string()),
          parent_transaction_id: "t2".to_string(),
        }),
        Ok(TransactionRequest::Refund {
          id: Some("t6".to_string()),
          parent_transaction_id: "t1".to_string(),
          amount: Some(500),
          currency: Some(Currency::Inr),
        }),
        Ok(TransactionRequest::Deposit {
          id: Some("t7".to_string()),
          destination_wallet_id: "jp".to_string(),
          amount: 1200,
          currency: Currency::Jpy,
        }),
      ]
    )
  }
}
