//! In-memory storage backend.
//!
//! Each table sits behind its own `parking_lot` mutex. Guards are never held
//! across an `.await`, so every trait method is a single critical section.

use super::{LedgerStore, WalletStore, WebhookBuffer};
use crate::error::{IngestError, Result};
use crate::projector::project_balance;
use crate::transaction::{AppendOutcome, LedgerTransaction, NewLedgerTransaction, Wallet, WalletId};
use crate::webhook::{WebhookEntry, WebhookId, WebhookStatus};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::hash_map::Entry;
use std::collections::HashMap;

#[derive(Default)]
struct WebhookTable {
    entries: HashMap<WebhookId, WebhookEntry>,

    /// Insertion order, for listing oldest first.
    order: Vec<WebhookId>,
}

impl WebhookTable {
    fn finish(
        &mut self,
        id: WebhookId,
        status: WebhookStatus,
        error_message: Option<String>,
    ) -> Result<bool> {
        let entry = self
            .entries
            .get_mut(&id)
            .ok_or_else(|| IngestError::Persistence(format!("webhook entry {} not found", id)))?;

        if entry.status.is_terminal() {
            return Ok(false);
        }

        entry.status = status;
        entry.error_message = error_message;
        entry.updated_at = Utc::now();
        Ok(true)
    }

    fn ordered(&self, filter: impl Fn(&WebhookEntry) -> bool) -> Vec<WebhookEntry> {
        self.order
            .iter()
            .filter_map(|id| self.entries.get(id))
            .filter(|entry| filter(entry))
            .cloned()
            .collect()
    }
}

#[derive(Default)]
struct LedgerTable {
    /// Rows in insertion order; a row's id is its position plus one.
    rows: Vec<LedgerTransaction>,

    /// (provider, reference) to row position.
    by_key: HashMap<(String, String), usize>,
}

/// Storage backend that keeps everything in process memory.
///
/// Nothing survives a restart, so pending entries cannot be resumed.
#[derive(Default)]
pub struct MemoryStore {
    webhooks: Mutex<WebhookTable>,
    ledger: Mutex<LedgerTable>,
    wallets: Mutex<HashMap<WalletId, Wallet>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of ledger rows across all wallets.
    pub fn ledger_len(&self) -> usize {
        self.ledger.lock().rows.len()
    }
}

#[async_trait]
impl WebhookBuffer for MemoryStore {
    async fn insert_webhook(&self, entry: WebhookEntry) -> Result<WebhookId> {
        let id = entry.id;
        let mut table = self.webhooks.lock();

        if table.entries.contains_key(&id) {
            return Err(IngestError::Persistence(format!(
                "webhook entry {} already exists",
                id
            )));
        }

        table.entries.insert(id, entry);
        table.order.push(id);
        Ok(id)
    }

    async fn get_webhook(&self, id: WebhookId) -> Result<Option<WebhookEntry>> {
        Ok(self.webhooks.lock().entries.get(&id).cloned())
    }

    async fn mark_processed(&self, id: WebhookId) -> Result<bool> {
        self.webhooks
            .lock()
            .finish(id, WebhookStatus::Processed, None)
    }

    async fn mark_failed(&self, id: WebhookId, message: &str) -> Result<bool> {
        self.webhooks
            .lock()
            .finish(id, WebhookStatus::Failed, Some(message.to_string()))
    }

    async fn pending_webhooks(&self) -> Result<Vec<WebhookEntry>> {
        Ok(self
            .webhooks
            .lock()
            .ordered(|entry| entry.status == WebhookStatus::Pending))
    }

    async fn list_webhooks(&self) -> Result<Vec<WebhookEntry>> {
        Ok(self.webhooks.lock().ordered(|_| true))
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn append_if_absent(&self, tx: NewLedgerTransaction) -> Result<AppendOutcome> {
        // Same range the SQLite backend can store
        if tx.amount.to_units().is_none() {
            return Err(IngestError::AmountOutOfRange(tx.amount.to_string()));
        }

        if !self.wallets.lock().contains_key(&tx.wallet_id) {
            return Err(IngestError::WalletNotFound(tx.wallet_id));
        }

        let mut ledger = self.ledger.lock();
        let LedgerTable { rows, by_key } = &mut *ledger;

        match by_key.entry((tx.provider.clone(), tx.reference.clone())) {
            Entry::Occupied(existing) => Ok(AppendOutcome {
                inserted: false,
                record: rows[*existing.get()].clone(),
            }),
            Entry::Vacant(slot) => {
                let position = rows.len();
                let record = tx.into_record(position as u64 + 1);
                slot.insert(position);
                rows.push(record.clone());
                Ok(AppendOutcome {
                    inserted: true,
                    record,
                })
            }
        }
    }

    async fn find_transaction(
        &self,
        provider: &str,
        reference: &str,
    ) -> Result<Option<LedgerTransaction>> {
        let ledger = self.ledger.lock();
        Ok(ledger
            .by_key
            .get(&(provider.to_string(), reference.to_string()))
            .map(|&position| ledger.rows[position].clone()))
    }

    async fn transactions_for_wallet(&self, wallet_id: WalletId) -> Result<Vec<LedgerTransaction>> {
        Ok(self
            .ledger
            .lock()
            .rows
            .iter()
            .filter(|row| row.wallet_id == wallet_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl WalletStore for MemoryStore {
    async fn ensure_wallet(&self, id: WalletId, currency: &str) -> Result<Wallet> {
        Ok(self
            .wallets
            .lock()
            .entry(id)
            .or_insert_with(|| Wallet::new(id, currency))
            .clone())
    }

    async fn get_wallet(&self, id: WalletId) -> Result<Option<Wallet>> {
        Ok(self.wallets.lock().get(&id).cloned())
    }

    async fn recompute_balance(&self, id: WalletId) -> Result<Wallet> {
        // The ledger guard is held until the balance is written, so no append
        // can land between the sum and the write.
        let ledger = self.ledger.lock();
        let balance = project_balance(ledger.rows.iter().filter(|row| row.wallet_id == id))?;
        if balance.to_units().is_none() {
            return Err(IngestError::AmountOutOfRange(balance.to_string()));
        }

        let mut wallets = self.wallets.lock();
        let wallet = wallets.get_mut(&id).ok_or(IngestError::WalletNotFound(id))?;

        wallet.balance = balance;
        wallet.updated_at = Utc::now();
        Ok(wallet.clone())
    }
}
