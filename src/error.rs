//! Error types for webhook ingestion.

use crate::transaction::WalletId;
use thiserror::Error;

/// Result type alias for ingestion operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Errors that can occur while buffering, parsing or settling webhooks.
///
/// Inside the pipeline every variant is caught and turned into a `failed`
/// webhook entry; only the CLI and the configuration layer surface them.
#[derive(Error, Debug)]
pub enum IngestError {
    /// Provider identifier is not one of the supported formats
    #[error("Unknown bank provider: {0}")]
    UnknownProvider(String),

    /// Storage layer rejected or could not complete a write
    #[error("Persistence failure: {0}")]
    Persistence(String),

    /// SQLite backend error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migration failed while opening the SQLite backend
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Configured wallet does not exist in storage
    #[error("Wallet {0} not found")]
    WalletNotFound(WalletId),

    /// Amount cannot be represented by the storage layer
    #[error("Amount out of range: {0}")]
    AmountOutOfRange(String),

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// The worker pool has shut down and no longer accepts entries
    #[error("Worker queue is closed")]
    QueueClosed,

    /// Failed to open or read a payload file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV writing error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Stored metadata could not be encoded or decoded
    #[error("Metadata error: {0}")]
    Metadata(#[from] serde_json::Error),

    /// Malformed command-line argument
    #[error("Invalid argument '{0}'. Expected <provider>=<payload-file>")]
    InvalidArgument(String),

    /// Missing payload argument
    #[error("Missing payload argument. Usage: webhook-ledger [--wallet | --webhooks] <provider>=<payload-file>...")]
    MissingArgument,
}
