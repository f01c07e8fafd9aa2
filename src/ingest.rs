//! Entry point for callers: buffer a payload now, settle it later.

use crate::config::IngestConfig;
use crate::error::Result;
use crate::pipeline::IngestionPipeline;
use crate::store::{Storage, WalletStore, WebhookBuffer};
use crate::webhook::{WebhookEntry, WebhookId};
use crate::worker::WorkerPool;
use log::{debug, info};
use std::sync::Arc;

/// Accepts raw webhooks into the buffer and hands them to the worker pool.
///
/// `enqueue` only writes the raw payload; parsing and settlement happen on a
/// worker, and their outcome is visible only on the buffered entry.
pub struct Ingestor {
    storage: Arc<dyn Storage>,
    pool: WorkerPool,
}

impl Ingestor {
    /// Creates the configured wallet if needed and starts the worker pool.
    pub async fn start(storage: Arc<dyn Storage>, config: &IngestConfig) -> Result<Self> {
        let wallet = storage
            .ensure_wallet(config.wallet_id, &config.wallet_currency)
            .await?;
        info!(
            "Crediting wallet {} ({}), {} workers, {:?} amounts",
            wallet.id, wallet.currency, config.workers, config.amount_policy
        );

        let pipeline = Arc::new(IngestionPipeline::new(
            storage.clone(),
            config.wallet_id,
            config.amount_policy,
        ));
        let pool = WorkerPool::spawn(pipeline, config.workers);

        Ok(Ingestor { storage, pool })
    }

    /// Buffers a raw payload as a `pending` entry and queues it.
    ///
    /// The provider is not validated here; an unknown provider fails the entry
    /// once a worker picks it up.
    pub async fn enqueue(&self, provider: &str, raw_payload: impl Into<Vec<u8>>) -> Result<WebhookId> {
        let entry = WebhookEntry::pending(provider, raw_payload.into());
        let id = self.storage.insert_webhook(entry).await?;
        debug!("Webhook {} ({}): buffered", id, provider);

        self.pool.dispatch(id)?;
        Ok(id)
    }

    /// Queues every entry still `pending` in the buffer, e.g. entries left
    /// behind by a previous run. Returns how many were queued.
    pub async fn resume_pending(&self) -> Result<usize> {
        let pending = self.storage.pending_webhooks().await?;
        for entry in &pending {
            self.pool.dispatch(entry.id)?;
        }

        if !pending.is_empty() {
            info!("Resumed {} pending webhook entries", pending.len());
        }
        Ok(pending.len())
    }

    /// Stops accepting entries and waits for queued ones to finish.
    pub async fn shutdown(self) {
        self.pool.shutdown().await;
    }
}
