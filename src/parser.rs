//! Provider payload parsers.
//!
//! Each parser turns one raw payload into zero or more [`ParsedTransaction`]s.
//! Parsing never fails: a line that does not match the provider grammar is
//! logged at debug level and dropped, and the remaining lines still parse.
//!
//! Two wire formats are supported, both one transaction per line:
//!
//! - **Slash-triplet** (`date//amount//reference[//extra...]`), sent by Acme.
//! - **Hash/comma/slash** (`date,amount#reference[#key/value/key/value]`),
//!   sent by PayTech.

use crate::decimal::Decimal4;
use crate::transaction::{Metadata, ParsedTransaction};
use log::{debug, warn};
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;

/// How a non-numeric amount field is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AmountPolicy {
    /// Use the leading numeric prefix of the field, or zero if there is none.
    /// Every coercion is logged at warn level.
    #[default]
    Coerce,

    /// Drop the line unless the field is a clean, non-negative decimal.
    Reject,
}

impl FromStr for AmountPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "coerce" => Ok(AmountPolicy::Coerce),
            "reject" => Ok(AmountPolicy::Reject),
            other => Err(format!(
                "unknown amount policy '{}', expected 'coerce' or 'reject'",
                other
            )),
        }
    }
}

/// Parses a slash-triplet payload.
///
/// Fields are separated by `//`: date, amount, reference. Anything after the
/// reference is kept verbatim, in order, under the `extra` metadata key.
pub fn parse_slash_triplet(payload: &str, policy: AmountPolicy) -> Vec<ParsedTransaction> {
    parse_lines(payload, |line| {
        let fields: Vec<&str> = line.split("//").collect();
        if fields.len() < 3 {
            return None;
        }

        let amount = parse_amount(fields[1], policy)?;

        let mut metadata = Metadata::new();
        if fields.len() > 3 {
            let extra = fields[3..]
                .iter()
                .map(|field| Value::String((*field).to_string()))
                .collect();
            metadata.insert("extra".to_string(), Value::Array(extra));
        }

        Some(ParsedTransaction {
            amount,
            reference: fields[2].to_string(),
            date: fields[0].to_string(),
            metadata,
        })
    })
}

/// Parses a hash/comma/slash payload.
///
/// The line splits on `#` into `date,amount`, the reference, and an optional
/// `key/value/...` segment. Only the first comma separates date from amount.
/// An unpaired trailing metadata token is dropped.
pub fn parse_hash_comma_slash(payload: &str, policy: AmountPolicy) -> Vec<ParsedTransaction> {
    parse_lines(payload, |line| {
        let segments: Vec<&str> = line.split('#').collect();
        if segments.len() < 2 {
            return None;
        }

        let (date, raw_amount) = segments[0].split_once(',')?;
        let amount = parse_amount(raw_amount, policy)?;

        let metadata = segments
            .get(2)
            .map(|segment| parse_pairs(segment))
            .unwrap_or_default();

        Some(ParsedTransaction {
            amount,
            reference: segments[1].to_string(),
            date: date.to_string(),
            metadata,
        })
    })
}

/// Splits a payload into trimmed, non-blank lines and runs `parse_line` on each.
fn parse_lines<F>(payload: &str, mut parse_line: F) -> Vec<ParsedTransaction>
where
    F: FnMut(&str) -> Option<ParsedTransaction>,
{
    let mut transactions = Vec::new();

    for (idx, raw_line) in payload.split('\n').enumerate() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }

        match parse_line(line) {
            Some(tx) => transactions.push(tx),
            None => debug!("Line {}: malformed, skipping", idx + 1),
        }
    }

    transactions
}

/// `key/value/key/value` into ordered metadata. A repeated key keeps its first
/// position and takes the last value.
fn parse_pairs(segment: &str) -> Metadata {
    let tokens: Vec<&str> = segment.split('/').collect();
    let mut metadata = Metadata::new();

    for pair in tokens.chunks_exact(2) {
        metadata.insert(pair[0].to_string(), Value::String(pair[1].to_string()));
    }

    metadata
}

fn parse_amount(raw: &str, policy: AmountPolicy) -> Option<Decimal4> {
    let trimmed = raw.trim();

    match policy {
        AmountPolicy::Reject => Decimal4::from_str(trimmed)
            .ok()
            .filter(|amount| !amount.is_negative()),
        AmountPolicy::Coerce => {
            if let Ok(amount) = Decimal4::from_str(trimmed) {
                return Some(amount);
            }

            let coerced = numeric_prefix(trimmed)
                .and_then(|prefix| Decimal::from_str(&prefix).ok())
                .map(Decimal4::new)
                .unwrap_or(Decimal4::ZERO);
            warn!("Non-numeric amount '{}' coerced to {}", trimmed, coerced);
            Some(coerced)
        }
    }
}

/// Longest leading `[+-]?digits[.digits]` prefix, rewritten into a form
/// `Decimal::from_str` accepts (`-.5` becomes `-0.5`).
fn numeric_prefix(s: &str) -> Option<String> {
    let bytes = s.as_bytes();
    let mut pos = 0;

    let negative = match bytes.first() {
        Some(b'-') => {
            pos = 1;
            true
        }
        Some(b'+') => {
            pos = 1;
            false
        }
        _ => false,
    };

    let int_start = pos;
    while pos < bytes.len() && bytes[pos].is_ascii_digit() {
        pos += 1;
    }
    let int_part = &s[int_start..pos];

    let mut frac_part = "";
    if pos < bytes.len() && bytes[pos] == b'.' {
        let frac_start = pos + 1;
        let mut frac_end = frac_start;
        while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
            frac_end += 1;
        }
        frac_part = &s[frac_start..frac_end];
    }

    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }

    let mut normalized = String::with_capacity(int_part.len() + frac_part.len() + 3);
    if negative {
        normalized.push('-');
    }
    normalized.push_str(if int_part.is_empty() { "0" } else { int_part });
    if !frac_part.is_empty() {
        normalized.push('.');
        normalized.push_str(frac_part);
    }
    Some(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal4 {
        Decimal4::from_str(s).unwrap()
    }

    fn meta_str<'a>(tx: &'a ParsedTransaction, key: &str) -> Option<&'a str> {
        tx.metadata.get(key).and_then(|v| v.as_str())
    }

    // ==================== SLASH-TRIPLET ====================

    #[test]
    fn test_slash_triplet_basic_line() {
        let result = parse_slash_triplet("20250615//99.50//ACME-REF-001", AmountPolicy::Coerce);

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].date, "20250615");
        assert_eq!(result[0].amount, dec("99.50"));
        assert_eq!(result[0].reference, "ACME-REF-001");
        assert!(result[0].metadata.is_empty());
    }

    #[test]
    fn test_slash_triplet_multiple_lines() {
        let payload = "20250615//50.00//ACME-REF1\n20250615//75.00//ACME-REF2";
        let result = parse_slash_triplet(payload, AmountPolicy::Coerce);

        assert_eq!(result.len(), 2);
        assert_eq!(result[0].reference, "ACME-REF1");
        assert_eq!(result[0].amount.to_string(), "50.0000");
        assert_eq!(result[1].reference, "ACME-REF2");
        assert_eq!(result[1].amount.to_string(), "75.0000");
    }

    #[test]
    fn test_slash_triplet_extra_fields_kept_in_order() {
        let result = parse_slash_triplet(
            "20250615//50.00//ACME-REF1//extra//data",
            AmountPolicy::Coerce,
        );

        assert_eq!(result.len(), 1);
        let extra = result[0].metadata.get("extra").unwrap().as_array().unwrap();
        let extra: Vec<&str> = extra.iter().filter_map(|v| v.as_str()).collect();
        assert_eq!(extra, vec!["extra", "data"]);
        assert_eq!(result[0].metadata.len(), 1);
    }

    #[test]
    fn test_slash_triplet_drops_short_lines() {
        let payload = "20250615//10.00//GOOD\n20250615//20.00\njunk";
        let result = parse_slash_triplet(payload, AmountPolicy::Coerce);

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].reference, "GOOD");
    }

    #[test]
    fn test_slash_triplet_empty_and_blank_payloads() {
        assert!(parse_slash_triplet("", AmountPolicy::Coerce).is_empty());
        assert!(parse_slash_triplet("  \n\t\n  ", AmountPolicy::Coerce).is_empty());
    }

    #[test]
    fn test_slash_triplet_handles_crlf() {
        let payload = "20250615//1.00//A\r\n20250615//2.00//B\r\n";
        let result = parse_slash_triplet(payload, AmountPolicy::Coerce);

        assert_eq!(result.len(), 2);
        assert_eq!(result[0].reference, "A");
        assert_eq!(result[1].reference, "B");
    }

    // ==================== HASH/COMMA/SLASH ====================

    #[test]
    fn test_hash_line_with_metadata() {
        let result = parse_hash_comma_slash(
            "20250615156,50#202506159000001#note/debt payment/internal_reference/A462JE81",
            AmountPolicy::Coerce,
        );

        assert_eq!(result.len(), 1);
        let tx = &result[0];
        assert_eq!(tx.date, "20250615156");
        assert_eq!(tx.amount.to_string(), "50.0000");
        assert_eq!(tx.reference, "202506159000001");
        assert_eq!(meta_str(tx, "note"), Some("debt payment"));
        assert_eq!(meta_str(tx, "internal_reference"), Some("A462JE81"));

        let keys: Vec<&String> = tx.metadata.keys().collect();
        assert_eq!(keys, vec!["note", "internal_reference"]);
    }

    #[test]
    fn test_hash_line_without_metadata() {
        let result = parse_hash_comma_slash("20250615,100#REF1", AmountPolicy::Coerce);

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].amount.to_string(), "100.0000");
        assert_eq!(result[0].reference, "REF1");
        assert!(result[0].metadata.is_empty());
    }

    #[test]
    fn test_hash_line_splits_on_first_comma_only() {
        let result = parse_hash_comma_slash("20250615,12,5#REF", AmountPolicy::Coerce);

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].date, "20250615");
        // "12,5" is not a clean decimal; coercion keeps the numeric prefix
        assert_eq!(result[0].amount.to_string(), "12.0000");
    }

    #[test]
    fn test_hash_line_drops_unpaired_token() {
        let result = parse_hash_comma_slash("20250615,5#REF#a/1/b", AmountPolicy::Coerce);

        assert_eq!(result[0].metadata.len(), 1);
        assert_eq!(meta_str(&result[0], "a"), Some("1"));
        assert!(result[0].metadata.get("b").is_none());
    }

    #[test]
    fn test_hash_line_repeated_key_takes_last_value() {
        let result = parse_hash_comma_slash("20250615,5#REF#k/1/j/2/k/3", AmountPolicy::Coerce);

        let keys: Vec<&String> = result[0].metadata.keys().collect();
        assert_eq!(keys, vec!["k", "j"]);
        assert_eq!(meta_str(&result[0], "k"), Some("3"));
    }

    #[test]
    fn test_hash_malformed_lines_are_skipped() {
        let payload = "20250615,10#GOOD\n20250615,10\n2025061510#NOCOMMA\n\n20250615,20#ALSO-GOOD";
        let result = parse_hash_comma_slash(payload, AmountPolicy::Coerce);

        let refs: Vec<&str> = result.iter().map(|t| t.reference.as_str()).collect();
        assert_eq!(refs, vec!["GOOD", "ALSO-GOOD"]);
    }

    #[test]
    fn test_hash_same_reference_twice_keeps_both_lines() {
        let result = parse_hash_comma_slash(
            "20250615,100#REF1\n20250615,200#REF1",
            AmountPolicy::Coerce,
        );

        assert_eq!(result.len(), 2);
        assert_eq!(result[0].amount.to_string(), "100.0000");
        assert_eq!(result[1].amount.to_string(), "200.0000");
    }

    // ==================== AMOUNTS ====================

    #[test]
    fn test_coerce_non_numeric_amount_to_zero() {
        let result = parse_slash_triplet("20250615//abc//REF", AmountPolicy::Coerce);

        assert_eq!(result.len(), 1);
        assert!(result[0].amount.is_zero());
    }

    #[test]
    fn test_coerce_uses_numeric_prefix() {
        let result = parse_slash_triplet("20250615//12.5EUR//REF", AmountPolicy::Coerce);
        assert_eq!(result[0].amount.to_string(), "12.5000");

        let result = parse_slash_triplet("20250615//.75//REF", AmountPolicy::Coerce);
        assert_eq!(result[0].amount.to_string(), "0.7500");
    }

    #[test]
    fn test_reject_policy_drops_bad_amounts() {
        let payload = "20250615//abc//BAD\n20250615//-5//NEGATIVE\n20250615//5.25//GOOD";
        let result = parse_slash_triplet(payload, AmountPolicy::Reject);

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].reference, "GOOD");
        assert_eq!(result[0].amount.to_string(), "5.2500");
    }

    #[test]
    fn test_amount_rounds_to_four_places() {
        let result = parse_hash_comma_slash("20250615,1.123456#REF", AmountPolicy::Coerce);
        assert_eq!(result[0].amount.to_string(), "1.1235");
    }

    #[test]
    fn test_numeric_prefix() {
        assert_eq!(numeric_prefix("42abc").as_deref(), Some("42"));
        assert_eq!(numeric_prefix("-.5x").as_deref(), Some("-0.5"));
        assert_eq!(numeric_prefix("+7.").as_deref(), Some("7"));
        assert_eq!(numeric_prefix("abc"), None);
        assert_eq!(numeric_prefix("."), None);
        assert_eq!(numeric_prefix(""), None);
    }

    #[test]
    fn test_amount_policy_from_str() {
        assert_eq!("coerce".parse::<AmountPolicy>(), Ok(AmountPolicy::Coerce));
        assert_eq!(" REJECT ".parse::<AmountPolicy>(), Ok(AmountPolicy::Reject));
        assert!("strict".parse::<AmountPolicy>().is_err());
    }
}
