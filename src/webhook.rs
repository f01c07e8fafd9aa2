//! Buffered webhook entries and their lifecycle.

use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identifier of a buffered webhook entry.
pub type WebhookId = Uuid;

/// Lifecycle status of a buffered entry.
///
/// `Pending` moves to exactly one of the terminal states and never leaves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WebhookStatus {
    Pending,
    Processed,
    Failed,
}

impl WebhookStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookStatus::Pending => "pending",
            WebhookStatus::Processed => "processed",
            WebhookStatus::Failed => "failed",
        }
    }

    /// Returns `true` for `Processed` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, WebhookStatus::Pending)
    }
}

impl fmt::Display for WebhookStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WebhookStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(WebhookStatus::Pending),
            "processed" => Ok(WebhookStatus::Processed),
            "failed" => Ok(WebhookStatus::Failed),
            other => Err(format!("unknown webhook status '{}'", other)),
        }
    }
}

/// One raw inbound notification, exactly as received.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookEntry {
    pub id: WebhookId,

    /// Provider identifier as supplied by the caller, not normalized
    pub provider: String,

    /// Raw payload bytes; only decoded when processed
    pub raw_payload: Vec<u8>,

    pub status: WebhookStatus,

    /// Set iff `status` is `Failed`
    pub error_message: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WebhookEntry {
    /// Creates a new `Pending` entry with a fresh id.
    pub fn pending(provider: &str, raw_payload: Vec<u8>) -> Self {
        let now = Utc::now();
        WebhookEntry {
            id: Uuid::new_v4(),
            provider: provider.to_string(),
            raw_payload,
            status: WebhookStatus::Pending,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Payload as text. Invalid UTF-8 sequences are replaced, never rejected.
    pub fn payload_text(&self) -> String {
        String::from_utf8_lossy(&self.raw_payload).into_owned()
    }
}
