//! Storage contracts for the webhook buffer, the ledger and the wallet.
//!
//! Two backends implement all three: [`MemoryStore`] for tests and one-shot
//! CLI runs, and [`SqliteStore`] for durable buffering. The ledger uniqueness
//! guarantee lives inside each backend's `append_if_absent`; callers never
//! check for an existing row before inserting.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::Result;
use crate::transaction::{AppendOutcome, LedgerTransaction, NewLedgerTransaction, Wallet, WalletId};
use crate::webhook::{WebhookEntry, WebhookId};
use async_trait::async_trait;

/// Durable buffer of raw inbound payloads.
#[async_trait]
pub trait WebhookBuffer: Send + Sync {
    /// Stores a new entry and returns its id.
    async fn insert_webhook(&self, entry: WebhookEntry) -> Result<WebhookId>;

    async fn get_webhook(&self, id: WebhookId) -> Result<Option<WebhookEntry>>;

    /// Moves a `pending` entry to `processed` and clears its error message.
    ///
    /// Returns `false` without changing anything if the entry already reached
    /// a terminal state, e.g. because another worker settled it first.
    async fn mark_processed(&self, id: WebhookId) -> Result<bool>;

    /// Moves a `pending` entry to `failed` with `message`. Same return value
    /// as [`mark_processed`](WebhookBuffer::mark_processed).
    async fn mark_failed(&self, id: WebhookId, message: &str) -> Result<bool>;

    /// Entries still `pending`, oldest first.
    async fn pending_webhooks(&self) -> Result<Vec<WebhookEntry>>;

    /// Every entry, oldest first.
    async fn list_webhooks(&self) -> Result<Vec<WebhookEntry>>;
}

/// Append-only transaction ledger keyed by (provider, reference).
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Inserts `tx` unless a row with the same (provider, reference) exists.
    ///
    /// Atomic with respect to the uniqueness key: of any number of concurrent
    /// calls with one key, exactly one reports `inserted = true` and the rest
    /// get the stored row back with `inserted = false`.
    async fn append_if_absent(&self, tx: NewLedgerTransaction) -> Result<AppendOutcome>;

    async fn find_transaction(
        &self,
        provider: &str,
        reference: &str,
    ) -> Result<Option<LedgerTransaction>>;

    /// Rows for `wallet_id` in insertion order.
    async fn transactions_for_wallet(&self, wallet_id: WalletId) -> Result<Vec<LedgerTransaction>>;
}

/// Wallet records. A balance is never written directly, only re-derived from
/// the ledger.
#[async_trait]
pub trait WalletStore: Send + Sync {
    /// Returns the wallet, creating it empty with `currency` if it is missing.
    async fn ensure_wallet(&self, id: WalletId, currency: &str) -> Result<Wallet>;

    async fn get_wallet(&self, id: WalletId) -> Result<Option<Wallet>>;

    /// Sets the wallet balance to Σcredits − Σdebits over its ledger rows and
    /// returns the updated wallet.
    ///
    /// The ledger read and the balance write are one atomic step with respect
    /// to appends and other recomputes, across every handle on the same
    /// storage.
    ///
    /// # Errors
    ///
    /// [`IngestError::WalletNotFound`](crate::IngestError::WalletNotFound) if
    /// the wallet does not exist, and
    /// [`IngestError::AmountOutOfRange`](crate::IngestError::AmountOutOfRange)
    /// if the sum cannot be represented.
    async fn recompute_balance(&self, id: WalletId) -> Result<Wallet>;
}

/// Everything the ingestion pipeline needs from a backend.
pub trait Storage: WebhookBuffer + LedgerStore + WalletStore {}

impl<T> Storage for T where T: WebhookBuffer + LedgerStore + WalletStore {}
