//! Transaction models: the parser output and the settled ledger rows.

use crate::decimal::Decimal4;
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

/// Identifier of the wallet that receives ingested transactions.
pub type WalletId = u64;

/// Ordered key/value metadata attached to a transaction.
///
/// Values are strings, except the slash-triplet `extra` entry which is a list.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// One money movement as read from a provider payload.
///
/// Lives only for the duration of a single processing pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTransaction {
    /// Amount, normalized to 4 decimal places
    pub amount: Decimal4,

    /// Provider-scoped reference; half of the idempotency key
    pub reference: String,

    /// Provider-native date, kept verbatim
    pub date: String,

    /// Extra fields carried by the line, in payload order
    pub metadata: Metadata,
}

/// Direction of a ledger row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxType {
    /// Funds received by the wallet.
    Credit,

    /// Funds leaving the wallet.
    Debit,
}

impl TxType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxType::Credit => "credit",
            TxType::Debit => "debit",
        }
    }
}

impl fmt::Display for TxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TxType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "credit" => Ok(TxType::Credit),
            "debit" => Ok(TxType::Debit),
            other => Err(format!("unknown transaction type '{}'", other)),
        }
    }
}

/// A ledger row that has not been written yet.
#[derive(Debug, Clone)]
pub struct NewLedgerTransaction {
    pub wallet_id: WalletId,
    pub kind: TxType,
    pub provider: String,
    pub reference: String,
    pub amount: Decimal4,
    pub settled_at: DateTime<Utc>,
    pub provider_date: String,
    pub metadata: Metadata,
}

impl NewLedgerTransaction {
    /// Builds a credit for `wallet_id` from a parsed provider line.
    pub fn credit(
        wallet_id: WalletId,
        provider: &str,
        parsed: ParsedTransaction,
        settled_at: DateTime<Utc>,
    ) -> Self {
        NewLedgerTransaction {
            wallet_id,
            kind: TxType::Credit,
            provider: provider.to_string(),
            reference: parsed.reference,
            amount: parsed.amount,
            settled_at,
            provider_date: parsed.date,
            metadata: parsed.metadata,
        }
    }

    /// Attaches the storage-assigned id.
    pub fn into_record(self, id: u64) -> LedgerTransaction {
        LedgerTransaction {
            id,
            wallet_id: self.wallet_id,
            kind: self.kind,
            provider: self.provider,
            reference: self.reference,
            amount: self.amount,
            settled_at: self.settled_at,
            provider_date: self.provider_date,
            metadata: self.metadata,
        }
    }
}

/// A settled, persisted transaction. Never updated once written.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerTransaction {
    pub id: u64,
    pub wallet_id: WalletId,
    pub kind: TxType,
    pub provider: String,
    pub reference: String,
    pub amount: Decimal4,
    pub settled_at: DateTime<Utc>,
    pub provider_date: String,
    pub metadata: Metadata,
}

impl LedgerTransaction {
    /// Signed contribution of this row to its wallet balance.
    pub fn signed_amount(&self) -> Decimal4 {
        match self.kind {
            TxType::Credit => self.amount,
            TxType::Debit => Decimal4::ZERO - self.amount,
        }
    }
}

/// Result of [`LedgerStore::append_if_absent`](crate::store::LedgerStore::append_if_absent).
#[derive(Debug, Clone)]
pub struct AppendOutcome {
    /// `false` when a row with the same (provider, reference) already existed
    pub inserted: bool,

    /// The stored row: the new one, or the pre-existing one on a duplicate
    pub record: LedgerTransaction,
}

/// The single aggregate balance holder.
#[derive(Debug, Clone, PartialEq)]
pub struct Wallet {
    pub id: WalletId,
    pub balance: Decimal4,
    pub currency: String,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    /// Creates an empty wallet.
    pub fn new(id: WalletId, currency: &str) -> Self {
        Wallet {
            id,
            balance: Decimal4::ZERO,
            currency: currency.to_string(),
            updated_at: Utc::now(),
        }
    }
}
