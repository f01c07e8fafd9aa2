//! Balance projection: a wallet's balance is always re-derived from its
//! ledger rows, never adjusted incrementally.

use crate::decimal::Decimal4;
use crate::error::{IngestError, Result};
use crate::store::{Storage, WalletStore};
use crate::transaction::{LedgerTransaction, TxType, WalletId};
use log::info;
use std::sync::Arc;

/// Sum of credits minus sum of debits.
///
/// # Errors
///
/// Returns [`IngestError::AmountOutOfRange`] if an intermediate sum overflows.
pub fn project_balance<'a, I>(rows: I) -> Result<Decimal4>
where
    I: IntoIterator<Item = &'a LedgerTransaction>,
{
    rows.into_iter().try_fold(Decimal4::ZERO, |balance, row| {
        let next = match row.kind {
            TxType::Credit => balance.checked_add(row.amount),
            TxType::Debit => balance.checked_sub(row.amount),
        };
        next.ok_or_else(|| {
            IngestError::AmountOutOfRange(format!(
                "balance overflow applying {} {} for {}/{}",
                row.kind, row.amount, row.provider, row.reference
            ))
        })
    })
}

/// Recomputes and persists wallet balances.
///
/// The storage backend performs the ledger read and the balance write as one
/// atomic step, so recomputes from any number of projectors, pipelines or
/// processes sharing the same storage never lose an update.
pub struct BalanceProjector {
    storage: Arc<dyn Storage>,
}

impl BalanceProjector {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        BalanceProjector { storage }
    }

    /// Derives the balance of `wallet_id` from the ledger, stores it on the
    /// wallet and returns it.
    ///
    /// Idempotent: without intervening ledger writes, repeated calls store and
    /// return the same value.
    pub async fn recompute(&self, wallet_id: WalletId) -> Result<Decimal4> {
        let wallet = self.storage.recompute_balance(wallet_id).await?;

        info!(
            "Wallet {}: balance {} {}",
            wallet_id, wallet.balance, wallet.currency
        );
        Ok(wallet.balance)
    }
}
