//! SQLite storage backend built on `sqlx`.
//!
//! The schema lives in `migrations/` and is applied on connect. Ledger
//! idempotency is enforced by the `unique_txn_provider` index: an append is a
//! single `INSERT ... ON CONFLICT DO NOTHING RETURNING` statement, and an empty
//! result is the duplicate signal. Amounts and balances are stored as integer
//! counts of 1/10000 units so that sums stay exact.

use super::{LedgerStore, WalletStore, WebhookBuffer};
use crate::decimal::Decimal4;
use crate::error::{IngestError, Result};
use crate::transaction::{
    AppendOutcome, LedgerTransaction, Metadata, NewLedgerTransaction, TxType, Wallet, WalletId,
};
use crate::webhook::{WebhookEntry, WebhookId, WebhookStatus};
use async_trait::async_trait;
use chrono::Utc;
use log::debug;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::Row;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

const LEDGER_COLUMNS: &str = "id, wallet_id, type, provider, reference, amount_units, \
                              settled_at, provider_date, metadata";

/// Durable storage backend on a SQLite database.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if needed) the database at `url` and applies migrations.
    ///
    /// `url` takes the usual `sqlite://path/to/file.db` form.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await?;

        debug!("Connected to {}", url);
        Self::from_pool(pool).await
    }

    /// A private in-memory database. Lives as long as the store.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;

        // Every connection to :memory: is a separate database, so keep exactly one.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
            .connect_with(options)
            .await?;

        Self::from_pool(pool).await
    }

    /// Wraps an existing pool and applies migrations.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(SqliteStore { pool })
    }

    /// Closes every pooled connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn db_wallet_id(id: WalletId) -> Result<i64> {
    i64::try_from(id)
        .map_err(|_| IngestError::Persistence(format!("wallet id {} exceeds SQLite range", id)))
}

fn db_units(amount: Decimal4) -> Result<i64> {
    amount
        .to_units()
        .ok_or_else(|| IngestError::AmountOutOfRange(amount.to_string()))
}

fn webhook_from_row(row: &SqliteRow) -> Result<WebhookEntry> {
    let id: String = row.try_get("id")?;
    let status: String = row.try_get("status")?;

    Ok(WebhookEntry {
        id: Uuid::parse_str(&id).map_err(|e| {
            IngestError::Persistence(format!("invalid webhook id '{}': {}", id, e))
        })?,
        provider: row.try_get("provider")?,
        raw_payload: row.try_get("raw_payload")?,
        status: status.parse::<WebhookStatus>().map_err(IngestError::Persistence)?,
        error_message: row.try_get("error_message")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn ledger_from_row(row: &SqliteRow) -> Result<LedgerTransaction> {
    let id: i64 = row.try_get("id")?;
    let wallet_id: i64 = row.try_get("wallet_id")?;
    let kind: String = row.try_get("type")?;
    let amount_units: i64 = row.try_get("amount_units")?;
    let metadata: String = row.try_get("metadata")?;

    Ok(LedgerTransaction {
        id: id as u64,
        wallet_id: wallet_id as WalletId,
        kind: kind.parse::<TxType>().map_err(IngestError::Persistence)?,
        provider: row.try_get("provider")?,
        reference: row.try_get("reference")?,
        amount: Decimal4::from_units(amount_units),
        settled_at: row.try_get("settled_at")?,
        provider_date: row.try_get("provider_date")?,
        metadata: serde_json::from_str::<Metadata>(&metadata)?,
    })
}

fn wallet_from_row(row: &SqliteRow) -> Result<Wallet> {
    let id: i64 = row.try_get("id")?;
    let balance_units: i64 = row.try_get("balance_units")?;

    Ok(Wallet {
        id: id as WalletId,
        balance: Decimal4::from_units(balance_units),
        currency: row.try_get("currency")?,
        updated_at: row.try_get("updated_at")?,
    })
}

impl SqliteStore {
    async fn finish_webhook(
        &self,
        id: WebhookId,
        status: WebhookStatus,
        error_message: Option<&str>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE webhook_entries
            SET status = ?1, error_message = ?2, updated_at = ?3
            WHERE id = ?4 AND status = 'pending'
            "#,
        )
        .bind(status.as_str())
        .bind(error_message)
        .bind(Utc::now())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }

        // Nothing updated: either already terminal or never buffered
        let existing = sqlx::query("SELECT 1 FROM webhook_entries WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        match existing {
            Some(_) => Ok(false),
            None => Err(IngestError::Persistence(format!(
                "webhook entry {} not found",
                id
            ))),
        }
    }
}

#[async_trait]
impl WebhookBuffer for SqliteStore {
    async fn insert_webhook(&self, entry: WebhookEntry) -> Result<WebhookId> {
        sqlx::query(
            r#"
            INSERT INTO webhook_entries (id, provider, raw_payload, status, error_message, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(entry.id.to_string())
        .bind(&entry.provider)
        .bind(&entry.raw_payload)
        .bind(entry.status.as_str())
        .bind(entry.error_message.as_deref())
        .bind(entry.created_at)
        .bind(entry.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(entry.id)
    }

    async fn get_webhook(&self, id: WebhookId) -> Result<Option<WebhookEntry>> {
        let row = sqlx::query("SELECT * FROM webhook_entries WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(webhook_from_row).transpose()
    }

    async fn mark_processed(&self, id: WebhookId) -> Result<bool> {
        self.finish_webhook(id, WebhookStatus::Processed, None).await
    }

    async fn mark_failed(&self, id: WebhookId, message: &str) -> Result<bool> {
        self.finish_webhook(id, WebhookStatus::Failed, Some(message))
            .await
    }

    async fn pending_webhooks(&self) -> Result<Vec<WebhookEntry>> {
        let rows = sqlx::query("SELECT * FROM webhook_entries WHERE status = 'pending' ORDER BY rowid")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(webhook_from_row).collect()
    }

    async fn list_webhooks(&self) -> Result<Vec<WebhookEntry>> {
        let rows = sqlx::query("SELECT * FROM webhook_entries ORDER BY rowid")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(webhook_from_row).collect()
    }
}

#[async_trait]
impl LedgerStore for SqliteStore {
    async fn append_if_absent(&self, tx: NewLedgerTransaction) -> Result<AppendOutcome> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO ledger_transactions
                (wallet_id, type, provider, reference, amount_units, settled_at, provider_date, metadata)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT (provider, reference) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(db_wallet_id(tx.wallet_id)?)
        .bind(tx.kind.as_str())
        .bind(&tx.provider)
        .bind(&tx.reference)
        .bind(db_units(tx.amount)?)
        .bind(tx.settled_at)
        .bind(&tx.provider_date)
        .bind(serde_json::to_string(&tx.metadata)?)
        .fetch_optional(&self.pool)
        .await?;

        match inserted {
            Some(row) => {
                let id: i64 = row.try_get("id")?;
                Ok(AppendOutcome {
                    inserted: true,
                    record: tx.into_record(id as u64),
                })
            }
            None => {
                let existing = self
                    .find_transaction(&tx.provider, &tx.reference)
                    .await?
                    .ok_or_else(|| {
                        IngestError::Persistence(format!(
                            "conflict on {}/{} but no stored row",
                            tx.provider, tx.reference
                        ))
                    })?;
                Ok(AppendOutcome {
                    inserted: false,
                    record: existing,
                })
            }
        }
    }

    async fn find_transaction(
        &self,
        provider: &str,
        reference: &str,
    ) -> Result<Option<LedgerTransaction>> {
        let sql = format!(
            "SELECT {} FROM ledger_transactions WHERE provider = ?1 AND reference = ?2",
            LEDGER_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(provider)
            .bind(reference)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(ledger_from_row).transpose()
    }

    async fn transactions_for_wallet(&self, wallet_id: WalletId) -> Result<Vec<LedgerTransaction>> {
        let sql = format!(
            "SELECT {} FROM ledger_transactions WHERE wallet_id = ?1 ORDER BY id",
            LEDGER_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(db_wallet_id(wallet_id)?)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(ledger_from_row).collect()
    }
}

#[async_trait]
impl WalletStore for SqliteStore {
    async fn ensure_wallet(&self, id: WalletId, currency: &str) -> Result<Wallet> {
        sqlx::query(
            r#"
            INSERT INTO wallets (id, balance_units, currency, updated_at)
            VALUES (?1, 0, ?2, ?3)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(db_wallet_id(id)?)
        .bind(currency)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        self.get_wallet(id)
            .await?
            .ok_or(IngestError::WalletNotFound(id))
    }

    async fn get_wallet(&self, id: WalletId) -> Result<Option<Wallet>> {
        let row = sqlx::query("SELECT id, balance_units, currency, updated_at FROM wallets WHERE id = ?1")
            .bind(db_wallet_id(id)?)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(wallet_from_row).transpose()
    }

    async fn recompute_balance(&self, id: WalletId) -> Result<Wallet> {
        // One statement: SQLite runs the sum and the write under a single write
        // lock, so a concurrent append from any connection is either counted or
        // triggers its own later recompute.
        let row = sqlx::query(
            r#"
            UPDATE wallets
            SET balance_units = (
                    SELECT COALESCE(SUM(CASE type WHEN 'credit' THEN amount_units ELSE -amount_units END), 0)
                    FROM ledger_transactions
                    WHERE wallet_id = ?1
                ),
                updated_at = ?2
            WHERE id = ?1
            RETURNING id, balance_units, currency, updated_at
            "#,
        )
        .bind(db_wallet_id(id)?)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.message().contains("integer overflow") => {
                IngestError::AmountOutOfRange(format!("balance of wallet {}", id))
            }
            other => IngestError::Database(other),
        })?;

        match row {
            Some(row) => wallet_from_row(&row),
            None => Err(IngestError::WalletNotFound(id)),
        }
    }
}
