//! # Webhook Ledger
//!
//! Buffers webhooks from bank providers and settles them into an append-only,
//! deduplicated ledger with a derived wallet balance.
//!
//! ## Design Principles
//!
//! - **Buffer first**: raw payloads are stored before any parsing, so a parse
//!   or settlement failure never loses the original notification
//! - **Idempotent ledger**: `(provider, reference)` is unique, enforced by the
//!   storage layer itself
//! - **Derived balance**: `balance == Σcredits − Σdebits` over the ledger,
//!   recomputed after every entry that adds rows
//! - **Fixed-point arithmetic**: 4 decimal places via `rust_decimal`
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use webhook_ledger::{IngestConfig, Ingestor, MemoryStore};
//!
//! # async fn run() -> webhook_ledger::Result<()> {
//! let storage = Arc::new(MemoryStore::new());
//! let ingestor = Ingestor::start(storage.clone(), &IngestConfig::default()).await?;
//! ingestor.enqueue("paytech", "20250615,100#REF1").await?;
//! ingestor.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod decimal;
pub mod error;
pub mod export;
pub mod ingest;
pub mod parser;
pub mod pipeline;
pub mod projector;
pub mod registry;
pub mod store;
pub mod transaction;
pub mod webhook;
pub mod worker;

pub use config::IngestConfig;
pub use decimal::Decimal4;
pub use error::{IngestError, Result};
pub use ingest::Ingestor;
pub use parser::AmountPolicy;
pub use pipeline::{IngestSummary, IngestionPipeline, ProcessingOutcome};
pub use projector::BalanceProjector;
pub use registry::Provider;
pub use store::{LedgerStore, MemoryStore, SqliteStore, Storage, WalletStore, WebhookBuffer};
pub use transaction::{
    AppendOutcome, LedgerTransaction, Metadata, NewLedgerTransaction, ParsedTransaction, TxType,
    Wallet, WalletId,
};
pub use webhook::{WebhookEntry, WebhookId, WebhookStatus};
pub use worker::WorkerPool;
