//! Webhook Ledger CLI
//!
//! Buffers each payload file as one webhook entry, settles all of them through
//! the worker pool, and writes the resulting state as CSV.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- paytech=bulk.txt acme=acme.txt > ledger.csv
//! cargo run -- --wallet paytech=bulk.txt > wallet.csv
//! cargo run -- --webhooks paytech=bulk.txt > entries.csv
//! ```
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Set to `debug` or `warn` to control logging verbosity
//! - `WALLET_ID`, `WALLET_CURRENCY`, `INGEST_WORKERS`, `AMOUNT_POLICY`,
//!   `DATABASE_URL`: see [`webhook_ledger::config`]

use std::env;
use std::io;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use webhook_ledger::{
    export, IngestConfig, IngestError, Ingestor, LedgerStore, MemoryStore, Result, SqliteStore,
    Storage, WalletStore, WebhookBuffer,
};

/// Which CSV view to print once every entry has settled.
enum View {
    Ledger,
    Wallet,
    Webhooks,
}

struct PayloadFile {
    provider: String,
    path: PathBuf,
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    env_logger::init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn parse_args(args: &[String]) -> Result<(View, Vec<PayloadFile>)> {
    let mut view = View::Ledger;
    let mut files = Vec::new();

    for arg in args {
        match arg.as_str() {
            "--wallet" => view = View::Wallet,
            "--webhooks" => view = View::Webhooks,
            _ => {
                let (provider, path) = arg
                    .split_once('=')
                    .filter(|(provider, path)| !provider.is_empty() && !path.is_empty())
                    .ok_or_else(|| IngestError::InvalidArgument(arg.clone()))?;
                files.push(PayloadFile {
                    provider: provider.to_string(),
                    path: PathBuf::from(path),
                });
            }
        }
    }

    if files.is_empty() {
        return Err(IngestError::MissingArgument);
    }

    Ok((view, files))
}

async fn run() -> Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let (view, files) = parse_args(&args)?;
    let config = IngestConfig::from_env()?;

    // Read everything up front so an unreadable file aborts before anything is buffered
    let mut payloads = Vec::with_capacity(files.len());
    for file in files {
        let bytes = tokio::fs::read(&file.path).await?;
        payloads.push((file.provider, bytes));
    }

    let storage: Arc<dyn Storage> = match &config.database_url {
        Some(url) => Arc::new(SqliteStore::connect(url).await?),
        None => Arc::new(MemoryStore::new()),
    };

    let ingestor = Ingestor::start(storage.clone(), &config).await?;
    ingestor.resume_pending().await?;
    for (provider, bytes) in payloads {
        ingestor.enqueue(&provider, bytes).await?;
    }
    ingestor.shutdown().await;

    match view {
        View::Ledger => {
            let rows = storage.transactions_for_wallet(config.wallet_id).await?;
            export::write_ledger(&rows, io::stdout().lock())?;
        }
        View::Wallet => {
            let wallet = storage
                .get_wallet(config.wallet_id)
                .await?
                .ok_or(IngestError::WalletNotFound(config.wallet_id))?;
            export::write_wallet(&wallet, io::stdout().lock())?;
        }
        View::Webhooks => {
            let entries = storage.list_webhooks().await?;
            export::write_webhooks(&entries, io::stdout().lock())?;
        }
    }

    Ok(())
}
