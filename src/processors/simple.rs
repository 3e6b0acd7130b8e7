use anyhow::Result;
use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::io::{RequestsReader, WalletsReportWriter};
use crate::transactions::{TransactionService, TransactionStatus};

/// This is a simple processor of transaction requests that
/// - reads requests from a [`RequestsReader`]
/// - submits them to a [`TransactionService`], up to `concurrency` at once
/// - writes a report including every wallet checked against the ledger using a [`WalletsReportWriter`]
///
/// The idea is that all those components can be replaced with different implementations.
///
/// This processor tries to be as resilient as possible, meaning that:
/// - errors from the requests reader will be logged and skipped
/// - rejected requests will be logged and skipped
/// - failed transactions are a normal outcome, they are logged with their reason
///
/// With a concurrency of 1 the requests are applied in the order they were read.
/// Higher values only make sense when the order between requests does not matter,
/// for example when refunds never appear in the same batch as their parent.
///
pub async fn run<R, S, W>(
  mut requests_reader: R,
  service: S,
  mut wallets_report_writer: W,
  concurrency: usize,
) -> Result<()>
where
  R: RequestsReader,
  S: TransactionService,
  W: WalletsReportWriter,
{
  let requests = requests_reader.read_requests();
  let service = &service;

  requests
    .enumerate()
    .for_each_concurrent(Some(concurrency.max(1)), |(line, maybe_request)| async move {
      let request = match maybe_request {
        Ok(request) => request,
        Err(err) => {
          warn!(line, error = %err, "skipping unreadable request");
          return;
        }
      };
      match service.submit(request).await {
        Ok(transaction) if transaction.status == TransactionStatus::Failed => {
          debug!(
            line,
            transaction_id = %transaction.id,
            reason = ?transaction.failure_reason,
            "request ended in a failed transaction"
          );
        }
        Ok(transaction) => {
          debug!(line, transaction_id = %transaction.id, status = %transaction.status, "request applied");
        }
        Err(err) => warn!(line, error = %err, "request rejected"),
      }
    })
    .await;

  let report = service.wallets_report().await?;
  info!(wallets = report.len(), "writing wallets report");
  wallets_report_writer
    .write_wallets_report(report.into_iter())
    .await
}
