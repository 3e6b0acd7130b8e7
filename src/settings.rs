use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use config::{builder::DefaultState, ConfigBuilder};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::{
  money::Currency,
  transactions::OrchestratorConfig,
  wallets::{NewWallet, WalletKind, WalletStatus},
};

const DEFAULT_CONFIG_PATH: &str = "settings.toml";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
  pub log_level: String,
  pub orchestrator: OrchestratorSettings,
  pub processor: ProcessorSettings,
  /// Wallets opened at start-up.
  pub wallets: Vec<WalletSettings>,
  /// CSV file with the requests; stdin when absent.
  #[serde(skip)]
  pub input: Option<String>,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      log_level: "info".to_string(),
      orchestrator: OrchestratorSettings::default(),
      processor: ProcessorSettings::default(),
      wallets: Vec::new(),
      input: None,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct OrchestratorSettings {
  pub call_timeout_ms: u64,
  pub max_attempts: u32,
  pub retry_backoff_ms: u64,
}

impl Default for OrchestratorSettings {
  fn default() -> Self {
    Self {
      call_timeout_ms: 2000,
      max_attempts: 3,
      retry_backoff_ms: 50,
    }
  }
}

impl From<&OrchestratorSettings> for OrchestratorConfig {
  fn from(settings: &OrchestratorSettings) -> Self {
    Self {
      call_timeout: Duration::from_millis(settings.call_timeout_ms),
      max_attempts: settings.max_attempts,
      retry_backoff: Duration::from_millis(settings.retry_backoff_ms),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProcessorSettings {
  /// Requests in flight at once. With 1 they are applied in file order.
  pub concurrency: usize,
}

impl Default for ProcessorSettings {
  fn default() -> Self {
    Self { concurrency: 1 }
  }
}

/// A wallet to open, with limits in major units.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WalletSettings {
  pub id: String,
  pub owner: String,
  #[serde(default)]
  pub kind: WalletKind,
  pub currency: Currency,
  #[serde(default = "active")]
  pub status: WalletStatus,
  pub daily_limit: Decimal,
  pub monthly_limit: Decimal,
}

fn active() -> WalletStatus {
  WalletStatus::Active
}

impl WalletSettings {
  pub fn to_new_wallet(&self) -> Result<NewWallet> {
    let limit = |value: Decimal| {
      self
        .currency
        .to_minor(value)
        .with_context(|| format!("Invalid limit for wallet {}", self.id))
    };
    Ok(NewWallet {
      id: self.id.clone(),
      owner_user_id: self.owner.clone(),
      kind: self.kind,
      currency: self.currency,
      status: self.status,
      daily_limit: limit(self.daily_limit)?,
      monthly_limit: limit(self.monthly_limit)?,
    })
  }
}

#[derive(Debug, Parser)]
#[command(name = "neobank-ledger", about = "Applies a CSV batch of money movements and prints every wallet")]
struct Args {
  /// CSV file with the requests. Reads stdin when absent.
  input: Option<String>,
  /// Optional settings file path (TOML).
  #[arg(long)]
  config: Option<String>,
  /// Override the log level (e.g. debug).
  #[arg(long)]
  log_level: Option<String>,
  /// Override the number of requests processed at once.
  #[arg(long)]
  concurrency: Option<usize>,
}

/// Settings from the file, then `NEOBANK_*` environment variables (`NEOBANK_ORCHESTRATOR__MAX_ATTEMPTS=5`),
/// then the command line.
pub fn load() -> Result<Settings> {
  let args = Args::parse();

  let config_path = args.config.as_deref().unwrap_or(DEFAULT_CONFIG_PATH);
  let builder = config::Config::builder()
    .add_source(config::File::with_name(config_path).required(args.config.is_some()))
    .add_source(
      config::Environment::with_prefix("NEOBANK")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true),
    );
  resolve(args, builder)
}

fn resolve(args: Args, builder: ConfigBuilder<DefaultState>) -> Result<Settings> {
  let mut settings: Settings = builder
    .build()
    .context("Failed to load settings")?
    .try_deserialize()
    .context("Invalid settings")?;

  if let Some(log_level) = args.log_level {
    settings.log_level = log_level;
  }
  if let Some(concurrency) = args.concurrency {
    settings.processor.concurrency = concurrency;
  }
  settings.input = args.input;

  Ok(settings)
}

#[cfg(test)]
mod tests {

  use indoc::indoc;
  use rust_decimal_macros::dec;

  use super::*;

  fn toml(content: &str) -> ConfigBuilder<DefaultState> {
    config::Config::builder().add_source(config::File::from_str(content, config::FileFormat::Toml))
  }

  #[test]
  fn defaults_without_sources() {
    let args = Args::parse_from(["neobank-ledger"]);

    let settings = resolve(args, config::Config::builder()).unwrap();

    assert_eq!(settings, Settings::default());
    assert_eq!(
      OrchestratorConfig::from(&settings.orchestrator),
      OrchestratorConfig::default()
    );
  }

  #[test]
  fn file_settings_with_cli_overrides() {
    let args = Args::parse_from([
      "neobank-ledger",
      "requests.csv",
      "--log-level",
      "debug",
      "--concurrency",
      "8",
    ]);
    let builder = toml(indoc! { r#"
      log_level = "warn"

      [orchestrator]
      call_timeout_ms = 500

      [processor]
      concurrency = 2

      [[wallets]]
      id = "a"
      owner = "user-1"
      currency = "INR"
      daily_limit = "50000"
      monthly_limit = "200000.50"

      [[wallets]]
      id = "b"
      owner = "user-2"
      kind = "business"
      currency = "INR"
      status = "frozen"
      daily_limit = "100"
      monthly_limit = "100"
    "# });

    let settings = resolve(args, builder).unwrap();

    assert_eq!(settings.log_level, "debug");
    assert_eq!(settings.processor.concurrency, 8);
    assert_eq!(settings.input.as_deref(), Some("requests.csv"));
    assert_eq!(settings.orchestrator.call_timeout_ms, 500);
    assert_eq!(settings.orchestrator.max_attempts, 3);
    assert_eq!(settings.wallets.len(), 2);
    assert_eq!(settings.wallets[0].kind, WalletKind::Personal);
    assert_eq!(settings.wallets[0].status, WalletStatus::Active);
    assert_eq!(settings.wallets[0].monthly_limit, dec!(200000.50));
    assert_eq!(settings.wallets[1].status, WalletStatus::Frozen);
  }

  #[test]
  fn wallet_limits_are_converted_to_minor_units() {
    let wallet = WalletSettings {
      id: "a".to_string(),
      owner: "user-1".to_string(),
      kind: WalletKind::Savings,
      currency: Currency::Inr,
      status: WalletStatus::Active,
      daily_limit: dec!(50000),
      monthly_limit: dec!(200000.50),
    };

    let new_wallet = wallet.to_new_wallet().unwrap();

    assert_eq!(new_wallet.daily_limit, 5_000_000);
    assert_eq!(new_wallet.monthly_limit, 20_000_050);
    assert!(WalletSettings {
      daily_limit: dec!(0.001),
      ..wallet
    }
    .to_new_wallet()
    .is_err());
  }
}
