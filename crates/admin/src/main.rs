//! Maintenance CLI for the kasir database.
//!
//! `migrate` creates or updates the schema. `verify-stock` replays every
//! product's stock mutations and prints any disagreement with the cached
//! stock as JSON, exiting non-zero when there is drift.

use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;

use kasir_infra::{db, Store, StoreConfig};
use kasir_inventory::StockDrift;

#[derive(Parser)]
#[command(name = "kasir-admin")]
#[command(about = "Schema and stock-ledger maintenance for the kasir POS database")]
#[command(version)]
struct Cli {
    /// Database URL (overrides KASIR_DATABASE_URL)
    #[arg(long)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or update the schema
    Migrate,

    /// Compare cached product stock against the stock mutation history
    VerifyStock,
}

#[derive(Serialize)]
struct DriftReport<'a> {
    consistent: bool,
    drift: Vec<DriftEntry<'a>>,
}

#[derive(Serialize)]
struct DriftEntry<'a> {
    #[serde(flatten)]
    drift: &'a StockDrift,
    difference: i64,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<ExitCode> {
    kasir_observability::init();
    let cli = Cli::parse();

    let mut config = StoreConfig::from_env().context("failed to load store configuration")?;
    if let Some(url) = cli.database_url {
        config.database_url = url;
    }

    match cli.command {
        Commands::Migrate => {
            let pool = db::connect(&config)
                .await
                .with_context(|| format!("failed to open database at {}", config.database_url))?;
            db::migrate(&pool).await.context("migration failed")?;
            println!("schema is up to date ({})", config.database_url);
            Ok(ExitCode::SUCCESS)
        }
        Commands::VerifyStock => {
            let store = Store::open(&config)
                .await
                .with_context(|| format!("failed to open database at {}", config.database_url))?;
            let drift = store
                .verify_stock_consistency()
                .await
                .context("stock consistency check failed")?;

            let report = DriftReport {
                consistent: drift.is_empty(),
                drift: drift
                    .iter()
                    .map(|d| DriftEntry {
                        drift: d,
                        difference: d.difference(),
                    })
                    .collect(),
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to serialize drift report")?
            );

            if drift.is_empty() {
                Ok(ExitCode::SUCCESS)
            } else {
                tracing::warn!(products = drift.len(), "stock drift detected");
                Ok(ExitCode::FAILURE)
            }
        }
    }
}
