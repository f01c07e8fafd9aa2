//! Ingestion pipeline: settles one buffered webhook entry.
//!
//! An entry moves from `pending` to exactly one of `processed` or `failed`.
//! Every error raised while resolving, parsing, appending or projecting is
//! caught here and recorded on the entry; nothing propagates to the caller.
//!
//! Ledger appends are committed one by one. If a later line fails, rows
//! appended earlier in the same pass stay in the ledger.

use crate::decimal::Decimal4;
use crate::error::Result;
use crate::parser::AmountPolicy;
use crate::projector::BalanceProjector;
use crate::registry::Provider;
use crate::store::{LedgerStore, Storage, WebhookBuffer};
use crate::transaction::{NewLedgerTransaction, WalletId};
use crate::webhook::{WebhookEntry, WebhookId};
use chrono::Utc;
use log::{debug, error, info, warn};
use std::sync::Arc;

/// Counts from one successful processing pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestSummary {
    /// Transactions the parser produced
    pub parsed: usize,

    /// New ledger rows
    pub inserted: usize,

    /// Lines whose (provider, reference) was already in the ledger
    pub duplicates: usize,

    /// Recomputed wallet balance, present iff `inserted > 0`
    pub balance: Option<Decimal4>,
}

/// Terminal result of processing one entry.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessingOutcome {
    Processed(IngestSummary),
    Failed(String),
}

/// Drives Provider → Ledger → Projector for buffered entries.
pub struct IngestionPipeline {
    storage: Arc<dyn Storage>,
    projector: BalanceProjector,
    wallet_id: WalletId,
    amount_policy: AmountPolicy,
}

impl IngestionPipeline {
    /// Creates a pipeline that credits every parsed transaction to `wallet_id`.
    pub fn new(storage: Arc<dyn Storage>, wallet_id: WalletId, amount_policy: AmountPolicy) -> Self {
        IngestionPipeline {
            projector: BalanceProjector::new(storage.clone()),
            storage,
            wallet_id,
            amount_policy,
        }
    }

    /// Processes the buffered entry `id` to a terminal state.
    ///
    /// Returns `None` when there was nothing to do: the entry does not exist,
    /// could not be loaded, or already reached a terminal state.
    pub async fn process(&self, id: WebhookId) -> Option<ProcessingOutcome> {
        let entry = match self.storage.get_webhook(id).await {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                warn!("Webhook {}: not found in buffer, skipping", id);
                return None;
            }
            Err(e) => {
                error!("Webhook {}: could not load entry: {}", id, e);
                return None;
            }
        };

        if entry.status.is_terminal() {
            debug!("Webhook {}: already {}, skipping", id, entry.status);
            return None;
        }

        // The same id may be settled concurrently (e.g. resumed by two
        // processes). The ledger absorbs the repeat; only the first mark wins.
        let outcome = match self.settle(&entry).await {
            Ok(summary) => {
                match self.storage.mark_processed(id).await {
                    Ok(true) => info!(
                        "Webhook {} ({}): processed, {} inserted, {} duplicate",
                        id, entry.provider, summary.inserted, summary.duplicates
                    ),
                    Ok(false) => debug!("Webhook {}: settled concurrently, already terminal", id),
                    Err(e) => error!("Webhook {}: could not mark processed: {}", id, e),
                }
                ProcessingOutcome::Processed(summary)
            }
            Err(e) => {
                let message = e.to_string();
                match self.storage.mark_failed(id, &message).await {
                    Ok(true) => warn!("Webhook {} ({}): failed: {}", id, entry.provider, message),
                    Ok(false) => debug!("Webhook {}: settled concurrently, already terminal", id),
                    Err(store_err) => error!("Webhook {}: could not mark failed: {}", id, store_err),
                }
                ProcessingOutcome::Failed(message)
            }
        };

        Some(outcome)
    }

    /// Parses the entry and applies every transaction to the ledger, in
    /// payload order.
    async fn settle(&self, entry: &WebhookEntry) -> Result<IngestSummary> {
        let provider = Provider::resolve(&entry.provider)?;
        let parsed = provider.parse(&entry.payload_text(), self.amount_policy);

        let mut summary = IngestSummary {
            parsed: parsed.len(),
            ..IngestSummary::default()
        };

        if parsed.is_empty() {
            debug!("Webhook {}: no transactions in payload", entry.id);
            return Ok(summary);
        }

        for tx in parsed {
            let new_row = NewLedgerTransaction::credit(self.wallet_id, provider.as_str(), tx, Utc::now());
            let outcome = self.storage.append_if_absent(new_row).await?;

            if outcome.inserted {
                summary.inserted += 1;
                debug!(
                    "Webhook {}: credited {} for {}/{}",
                    entry.id, outcome.record.amount, provider, outcome.record.reference
                );
            } else {
                summary.duplicates += 1;
                debug!(
                    "Webhook {}: duplicate {}/{} (ledger row {}), ignoring",
                    entry.id, provider, outcome.record.reference, outcome.record.id
                );
            }
        }

        if summary.inserted > 0 {
            summary.balance = Some(self.projector.recompute(self.wallet_id).await?);
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, WalletStore};
    use crate::webhook::WebhookStatus;

    async fn setup() -> (Arc<MemoryStore>, IngestionPipeline) {
        let store = Arc::new(MemoryStore::new());
        store.ensure_wallet(1, "USD").await.unwrap();
        let pipeline = IngestionPipeline::new(store.clone(), 1, AmountPolicy::Coerce);
        (store, pipeline)
    }

    async fn buffer(store: &MemoryStore, provider: &str, payload: &str) -> WebhookId {
        store
            .insert_webhook(WebhookEntry::pending(provider, payload.as_bytes().to_vec()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_processes_paytech_entry() {
        let (store, pipeline) = setup().await;
        let id = buffer(&store, "paytech", "20250615,50#REF123").await;

        let outcome = pipeline.process(id).await.unwrap();
        let ProcessingOutcome::Processed(summary) = outcome else {
            panic!("Expected Processed");
        };
        assert_eq!(summary.inserted, 1);
        assert_eq!(summary.balance.unwrap().to_string(), "50.0000");

        let row = store.find_transaction("paytech", "REF123").await.unwrap().unwrap();
        assert_eq!(row.amount.to_string(), "50.0000");

        let entry = store.get_webhook(id).await.unwrap().unwrap();
        assert_eq!(entry.status, WebhookStatus::Processed);
        assert!(entry.error_message.is_none());
    }

    #[tokio::test]
    async fn test_unknown_provider_fails_entry() {
        let (store, pipeline) = setup().await;
        let id = buffer(&store, "unknown", "invalid payload").await;

        let outcome = pipeline.process(id).await.unwrap();
        assert_eq!(
            outcome,
            ProcessingOutcome::Failed("Unknown bank provider: unknown".to_string())
        );

        let entry = store.get_webhook(id).await.unwrap().unwrap();
        assert_eq!(entry.status, WebhookStatus::Failed);
        assert_eq!(entry.error_message.as_deref(), Some("Unknown bank provider: unknown"));
    }

    #[tokio::test]
    async fn test_empty_result_is_processed_without_recompute() {
        let (store, pipeline) = setup().await;
        let id = buffer(&store, "acme", "not//valid\n\n").await;

        let outcome = pipeline.process(id).await.unwrap();
        assert_eq!(outcome, ProcessingOutcome::Processed(IngestSummary::default()));

        let entry = store.get_webhook(id).await.unwrap().unwrap();
        assert_eq!(entry.status, WebhookStatus::Processed);
        assert_eq!(store.ledger_len(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_only_payload_skips_recompute() {
        let (store, pipeline) = setup().await;
        let first = buffer(&store, "paytech", "20250615,10#DUP").await;
        let second = buffer(&store, "paytech", "20250615,10#DUP").await;

        pipeline.process(first).await.unwrap();
        let outcome = pipeline.process(second).await.unwrap();

        assert_eq!(
            outcome,
            ProcessingOutcome::Processed(IngestSummary {
                parsed: 1,
                inserted: 0,
                duplicates: 1,
                balance: None,
            })
        );
        assert_eq!(store.ledger_len(), 1);
    }

    #[tokio::test]
    async fn test_provider_case_maps_to_same_key() {
        let (store, pipeline) = setup().await;
        let first = buffer(&store, "PayTech", "20250615,10#REF").await;
        let second = buffer(&store, "paytech", "20250615,10#REF").await;

        pipeline.process(first).await;
        pipeline.process(second).await;

        assert_eq!(store.ledger_len(), 1);
        let row = store.find_transaction("paytech", "REF").await.unwrap().unwrap();
        assert_eq!(row.provider, "paytech");
    }

    #[tokio::test]
    async fn test_terminal_entry_is_not_reprocessed() {
        let (store, pipeline) = setup().await;
        let id = buffer(&store, "acme", "20250615//5//A").await;

        assert!(pipeline.process(id).await.is_some());
        assert!(pipeline.process(id).await.is_none());
        assert!(pipeline.process(uuid::Uuid::new_v4()).await.is_none());
    }

    #[tokio::test]
    async fn test_unstorable_amount_fails_entry() {
        let (store, pipeline) = setup().await;
        let max = "79228162514264337593543950335";
        let id = buffer(&store, "acme", &format!("20250615//{max}//A\n20250615//{max}//B")).await;

        let outcome = pipeline.process(id).await.unwrap();
        let ProcessingOutcome::Failed(message) = outcome else {
            panic!("Expected Failed");
        };
        assert!(message.starts_with("Amount out of range"));

        let entry = store.get_webhook(id).await.unwrap().unwrap();
        assert_eq!(entry.status, WebhookStatus::Failed);
        assert_eq!(store.ledger_len(), 0);
    }

    #[tokio::test]
    async fn test_balance_overflow_fails_entry_after_commit() {
        let (store, pipeline) = setup().await;
        let id = buffer(
            &store,
            "paytech",
            "20250615,900000000000000#A\n20250615,900000000000000#B",
        )
        .await;

        let outcome = pipeline.process(id).await.unwrap();
        let ProcessingOutcome::Failed(message) = outcome else {
            panic!("Expected Failed");
        };
        assert!(message.starts_with("Amount out of range"));

        // Both rows were committed before the recompute failed
        assert_eq!(store.ledger_len(), 2);
        let wallet = store.get_wallet(1).await.unwrap().unwrap();
        assert!(wallet.balance.is_zero());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_processing_of_one_entry() {
        let (store, pipeline) = setup().await;
        let pipeline = Arc::new(pipeline);
        let id = buffer(&store, "paytech", "20250615,10#ONCE").await;

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pipeline = pipeline.clone();
                tokio::spawn(async move { pipeline.process(id).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.ledger_len(), 1);
        let entry = store.get_webhook(id).await.unwrap().unwrap();
        assert_eq!(entry.status, WebhookStatus::Processed);
        assert_eq!(store.get_wallet(1).await.unwrap().unwrap().balance.to_string(), "10.0000");
    }

    #[tokio::test]
    async fn test_missing_wallet_fails_entry() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = IngestionPipeline::new(store.clone(), 7, AmountPolicy::Coerce);
        let id = buffer(&store, "acme", "20250615//5//A").await;

        let outcome = pipeline.process(id).await.unwrap();
        assert_eq!(outcome, ProcessingOutcome::Failed("Wallet 7 not found".to_string()));
    }
}
