use anyhow::Result;
use async_trait::async_trait;
use tokio::io::AsyncWrite;
use tokio_stream::StreamExt;

use crate::transactions::WalletReport;

/// Interface for a wallets report writer
#[async_trait(?Send)]
pub trait WalletsReportWriter {
  /// Write the wallets information provided by the [`Iterator`] and return whether the operation was successful or not.
  async fn write_wallets_report<'a, T>(&'a mut self, report: T) -> Result<()>
  where
    T: Iterator<Item = WalletReport> + 'a;
}

/// An implementation of [`WalletsReportWriter`] for the CSV format.
pub struct CsvWalletsReportWriter<W>(W);

impl<W> CsvWalletsReportWriter<W>
where
  W: AsyncWrite + Unpin + Send + Sync,
{
  pub fn new(writer: W) -> Self {
    Self(writer)
  }
}

#[async_trait(?Send)]
impl<W> WalletsReportWriter for CsvWalletsReportWriter<W>
where
  W: AsyncWrite + Unpin + Send + Sync,
{
  async fn write_wallets_report<'a, T>(&'a mut self, report: T) -> Result<()>
  where
    T: Iterator<Item = WalletReport> + 'a,
  {
    let mut report = Box::pin(tokio_stream::iter(
      report.map(super::report::WalletReport::from),
    ));

    let mut serializer = csv_async::AsyncSerializer::from_writer(&mut self.0);
    while let Some(wallet_report) = report.next().await {
      serializer.serialize(wallet_report).await?;
    }
    serializer.flush().await?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {

  use std::io::Cursor;
  use std::iter;

  use super::*;
  use crate::{
    money::Currency,
    wallets::{WalletBalance, WalletStatus},
  };

  fn report(wallet_id: &str, balance: i64, held: i64, status: WalletStatus) -> WalletReport {
    WalletReport {
      balance: WalletBalance {
        wallet_id: wallet_id.to_string(),
        currency: Currency::Inr,
        balance,
        available_balance: balance - held,
        held_amount: held,
        status,
      },
      ledger_balance: balance,
    }
  }

  #[tokio::test]
  async fn write_wallets_report_fails() {
    let buff: &mut [u8] = &mut [0u8, 0, 0, 0];
    let mut buffer = Cursor::new(buff);
    let mut writer = CsvWalletsReportWriter::new(&mut buffer);

    let report = vec![
      report("a", 10_000, 1000, WalletStatus::Active),
      report("b", 3050, 0, WalletStatus::Frozen),
    ]
    .into_iter();

    let result = writer.write_wallets_report(report).await;

    assert!(result.is_err());
  }

  #[tokio::test]
  async fn write_wallets_empty() {
    let mut buffer = Vec::<u8>::with_capacity(1024);
    let mut writer = CsvWalletsReportWriter::new(&mut buffer);

    let result = writer.write_wallets_report(iter::empty()).await;

    assert!(result.is_ok());
    assert_eq!(String::from_utf8_lossy(buffer.as_slice()), "".to_string())
  }

  #[tokio::test]
  async fn write_wallets_report_success() {
    let mut buffer = Vec::<u8>::with_capacity(1024);
    let mut writer = CsvWalletsReportWriter::new(&mut buffer);

    let report = vec![
      report("a", 10_000, 1000, WalletStatus::Active),
      report("b", 3050, 0, WalletStatus::Frozen),
    ]
    .into_iter();

    let result = writer.write_wallets_report(report).await;

    assert!(result.is_ok());
    assert_eq!(
      String::from_utf8_lossy(buffer.as_slice()),
      "wallet,currency,balance,available,held,ledger_balance,status\n\
       a,INR,100.00,90.00,10.00,100.00,active\n\
       b,INR,30.50,30.50,0.00,30.50,frozen\n"
        .to_string()
    )
  }
}
