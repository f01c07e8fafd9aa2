//! Runtime configuration, read from the environment.
//!
//! | Variable          | Default  | Meaning                                   |
//! |-------------------|----------|-------------------------------------------|
//! | `WALLET_ID`       | `1`      | Wallet credited by every ingested line    |
//! | `WALLET_CURRENCY` | `USD`    | Currency used when creating the wallet    |
//! | `INGEST_WORKERS`  | `4`      | Concurrent pipeline workers (at least 1)  |
//! | `AMOUNT_POLICY`   | `coerce` | `coerce` or `reject` non-numeric amounts  |
//! | `DATABASE_URL`    | unset    | SQLite URL; in-memory storage when unset  |

use crate::error::{IngestError, Result};
use crate::parser::AmountPolicy;
use crate::transaction::WalletId;

/// Settings supplied to the pipeline at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestConfig {
    pub wallet_id: WalletId,
    pub wallet_currency: String,
    pub workers: usize,
    pub amount_policy: AmountPolicy,
    pub database_url: Option<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        IngestConfig {
            wallet_id: 1,
            wallet_currency: "USD".to_string(),
            workers: 4,
            amount_policy: AmountPolicy::Coerce,
            database_url: None,
        }
    }
}

impl IngestConfig {
    /// Reads the configuration from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`. Unset or blank values fall
    /// back to the defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let defaults = IngestConfig::default();

        let wallet_id = match get("WALLET_ID") {
            Some(raw) => raw
                .trim()
                .parse::<WalletId>()
                .map_err(|e| IngestError::Config(format!("WALLET_ID '{}': {}", raw, e)))?,
            None => defaults.wallet_id,
        };

        let workers = match get("INGEST_WORKERS") {
            Some(raw) => {
                let workers = raw
                    .trim()
                    .parse::<usize>()
                    .map_err(|e| IngestError::Config(format!("INGEST_WORKERS '{}': {}", raw, e)))?;
                if workers == 0 {
                    return Err(IngestError::Config(
                        "INGEST_WORKERS must be at least 1".to_string(),
                    ));
                }
                workers
            }
            None => defaults.workers,
        };

        let amount_policy = match get("AMOUNT_POLICY") {
            Some(raw) => raw
                .parse::<AmountPolicy>()
                .map_err(|e| IngestError::Config(format!("AMOUNT_POLICY: {}", e)))?,
            None => defaults.amount_policy,
        };

        Ok(IngestConfig {
            wallet_id,
            wallet_currency: get("WALLET_CURRENCY")
                .map(|c| c.trim().to_uppercase())
                .unwrap_or(defaults.wallet_currency),
            workers,
            amount_policy,
            database_url: get("DATABASE_URL"),
        })
    }
}
