//! Provider registry: maps a provider identifier to its payload parser.

use crate::error::{IngestError, Result};
use crate::parser::{self, AmountPolicy};
use crate::transaction::ParsedTransaction;
use std::fmt;

/// The closed set of supported bank providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    /// Hash/comma/slash format.
    PayTech,

    /// Slash-triplet format.
    Acme,
}

impl Provider {
    /// Every supported provider.
    pub const ALL: [Provider; 2] = [Provider::PayTech, Provider::Acme];

    /// Resolves a provider identifier, ignoring case.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::UnknownProvider`] for anything outside the
    /// supported set.
    pub fn resolve(provider_id: &str) -> Result<Provider> {
        match provider_id.to_lowercase().as_str() {
            "paytech" => Ok(Provider::PayTech),
            "acme" => Ok(Provider::Acme),
            _ => Err(IngestError::UnknownProvider(provider_id.to_string())),
        }
    }

    /// Canonical identifier, used as the provider half of the idempotency key.
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::PayTech => "paytech",
            Provider::Acme => "acme",
        }
    }

    /// Parses a raw payload in this provider's wire format.
    pub fn parse(&self, payload: &str, policy: AmountPolicy) -> Vec<ParsedTransaction> {
        match self {
            Provider::PayTech => parser::parse_hash_comma_slash(payload, policy),
            Provider::Acme => parser::parse_slash_triplet(payload, policy),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
