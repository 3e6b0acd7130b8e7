use std::sync::Arc;

use anyhow::Result;
use tokio::io::AsyncRead;
use tracing::info;
use tracing_subscriber::EnvFilter;

use neobank_ledger::{
  clock::{Clock, SystemClock},
  io::{CsvRequestsReader, CsvWalletsReportWriter},
  ledger::InMemoryLedgerStore,
  processors, settings,
  transactions::{InMemoryTransactionRepository, LogPublisher, Orchestrator, OrchestratorConfig},
  wallets::{InMemoryWalletStore, WalletStore},
};

#[tokio::main]
async fn main() -> Result<()> {
  let settings = settings::load()?;

  // stdout only carries the report
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("neobank_ledger={}", settings.log_level))),
    )
    .with_writer(std::io::stderr)
    .init();

  let clock: Arc<dyn Clock> = Arc::new(SystemClock);
  let ledger = Arc::new(InMemoryLedgerStore::new(clock.clone()));
  let wallets = Arc::new(InMemoryWalletStore::new(ledger, clock.clone()));
  for wallet in &settings.wallets {
    let wallet = wallets.open_wallet(wallet.to_new_wallet()?).await?;
    info!(wallet_id = %wallet.id, currency = %wallet.currency, status = %wallet.status, "wallet opened");
  }

  let publisher = Arc::new(LogPublisher);
  let orchestrator = Orchestrator::new(
    wallets,
    Arc::new(InMemoryTransactionRepository::new()),
    publisher.clone(),
    publisher,
    clock,
    OrchestratorConfig::from(&settings.orchestrator),
  );

  let reader = get_requests_async_read(settings.input.as_deref()).await?;
  let requests_reader = CsvRequestsReader::new(reader);
  let wallets_report_writer = CsvWalletsReportWriter::new(tokio::io::stdout());

  processors::simple::run(
    requests_reader,
    orchestrator,
    wallets_report_writer,
    settings.processor.concurrency,
  )
  .await
}

type RequestsAsyncRead = Box<dyn AsyncRead + Unpin + Send + Sync>;

/// This allows to use either a file if the path is specified in the command line,
/// or the stdin otherwise, which might be more convenient for pipe the data.
async fn get_requests_async_read(path: Option<&str>) -> Result<RequestsAsyncRead> {
  match path {
    Some(path) => tokio::fs::File::open(path)
      .await
      .map(|file| Box::new(file) as RequestsAsyncRead)
      .map_err(anyhow::Error::from),
    None => Ok(Box::new(tokio::io::stdin()) as RequestsAsyncRead),
  }
}
