//! CSV rendering of ledger rows, wallet state and buffered entries.
//!
//! All monetary values are formatted with exactly 4 decimal places.

use crate::error::Result;
use crate::transaction::{LedgerTransaction, Wallet};
use crate::webhook::WebhookEntry;
use std::io::Write;

/// Writes ledger rows in the order given.
pub fn write_ledger<W: Write>(rows: &[LedgerTransaction], writer: W) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    csv_writer.write_record([
        "id",
        "wallet",
        "type",
        "provider",
        "reference",
        "amount",
        "date",
        "settled_at",
    ])?;

    for row in rows {
        csv_writer.write_record([
            row.id.to_string(),
            row.wallet_id.to_string(),
            row.kind.to_string(),
            row.provider.clone(),
            row.reference.clone(),
            row.amount.to_string(),
            row.provider_date.clone(),
            row.settled_at.to_rfc3339(),
        ])?;
    }

    csv_writer.flush()?;
    Ok(())
}

pub fn write_wallet<W: Write>(wallet: &Wallet, writer: W) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    csv_writer.write_record(["wallet", "balance", "currency"])?;
    csv_writer.write_record([
        wallet.id.to_string(),
        wallet.balance.to_string(),
        wallet.currency.clone(),
    ])?;

    csv_writer.flush()?;
    Ok(())
}

/// Writes buffered entries with their status; the error column is empty
/// unless the entry failed.
pub fn write_webhooks<W: Write>(entries: &[WebhookEntry], writer: W) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    csv_writer.write_record(["id", "provider", "status", "error"])?;

    for entry in entries {
        csv_writer.write_record([
            entry.id.to_string(),
            entry.provider.clone(),
            entry.status.to_string(),
            entry.error_message.clone().unwrap_or_default(),
        ])?;
    }

    csv_writer.flush()?;
    Ok(())
}
