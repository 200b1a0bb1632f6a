use clap::Parser;
use gigpay::application::Marketplace;
use gigpay::config::Settings;
use gigpay::domain::ports::SharedStore;
use gigpay::infrastructure::in_memory::InMemoryStore;
use gigpay::infrastructure::notify::LogNotifier;
use gigpay::interfaces::csv::wallet_writer::WalletWriter;
use gigpay::interfaces::scenario::ScenarioRunner;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Scenario file, one JSON operation per line
    scenario: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = Settings::from_env();
    let secret = settings.gateway.secret.clone();

    let store: SharedStore = match cli.db_path {
        #[cfg(feature = "storage-rocksdb")]
        Some(db_path) => Arc::new(
            gigpay::infrastructure::rocksdb::RocksDbStore::open(db_path).into_diagnostic()?,
        ),
        #[cfg(not(feature = "storage-rocksdb"))]
        Some(_) => {
            return Err(miette::miette!(
                "--db-path requires the storage-rocksdb feature"
            ));
        }
        None => Arc::new(InMemoryStore::new()),
    };

    let market = Marketplace::new(store, Arc::new(LogNotifier::new()), settings);
    let mut runner = ScenarioRunner::new(market, secret);

    let file = File::open(cli.scenario).into_diagnostic()?;
    runner.run(BufReader::new(file)).await.into_diagnostic()?;

    let wallets = runner.market().all_wallets().await.into_diagnostic()?;
    let stdout = io::stdout();
    let mut writer = WalletWriter::new(stdout.lock());
    writer.write_wallets(wallets).into_diagnostic()?;

    Ok(())
}
