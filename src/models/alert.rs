//! Alert model & validator (C1).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::{AppError, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Buy,
    Sell,
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Market,
    Limit,
    Stop,
    StopLimit,
}

impl Default for OrderType {
    fn default() -> Self {
        OrderType::Market
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Future,
    Option,
    Stock,
    Crypto,
    Forex,
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AssetKind::Future => "future",
            AssetKind::Option => "option",
            AssetKind::Stock => "stock",
            AssetKind::Crypto => "crypto",
            AssetKind::Forex => "forex",
        };
        write!(f, "{s}")
    }
}

/// A validated instruction-to-trade received via webhook. Immutable once constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub alert_id: String,
    pub symbol: String,
    pub action: Action,
    pub quantity: u32,
    #[serde(default)]
    pub order_type: OrderType,
    pub price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub strategy_id: Option<String>,
    pub account_group: String,
    pub alert_name: Option<String>,
    pub comment: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// Unknown fields are preserved verbatim but never interpreted.
    #[serde(default)]
    pub extra: serde_json::Map<String, Value>,
}

/// Wire shape accepted from TradingView-style webhooks, before validation.
#[derive(Debug, Deserialize)]
pub struct RawAlert {
    pub symbol: String,
    pub action: String,
    pub quantity: i64,
    #[serde(default)]
    pub order_type: Option<String>,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub stop_price: Option<Decimal>,
    #[serde(default)]
    pub strategy_id: Option<String>,
    #[serde(default = "default_account_group")]
    pub account_group: String,
    #[serde(default)]
    pub alert_name: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub alert_id: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

fn default_account_group() -> String {
    "main".to_string()
}

const MAX_SYMBOL_LEN: usize = 16;
const MAX_NESTED_DEPTH: usize = 3;
const MIN_QUANTITY: i64 = 1;
const MAX_QUANTITY: i64 = 9_999;

const SQL_DENYLIST: &[&str] = &[
    "union", "drop", "insert", "delete", "update", "exec", "xp_", "--", "';",
];
const SHELL_META: &[char] = &[';', '|', '`', '&'];

/// True if `lower` (already-lowercased) contains `needle` as a whole word,
/// i.e. not immediately preceded/followed by an alphanumeric character. This
/// keeps symbol-punctuation needles like `"--"`/`"';"` as plain substring
/// checks, since "word boundary" is meaningless for them.
fn contains_word(lower: &str, needle: &str) -> bool {
    let is_alnum_boundary = needle.chars().next().is_some_and(|c| c.is_ascii_alphanumeric())
        && needle.chars().last().is_some_and(|c| c.is_ascii_alphanumeric());
    if !is_alnum_boundary {
        return lower.contains(needle);
    }
    let bytes = lower.as_bytes();
    let mut start = 0;
    while let Some(pos) = lower[start..].find(needle) {
        let idx = start + pos;
        let before_ok = idx == 0 || !(bytes[idx - 1] as char).is_ascii_alphanumeric();
        let after_idx = idx + needle.len();
        let after_ok = after_idx >= bytes.len() || !(bytes[after_idx] as char).is_ascii_alphanumeric();
        if before_ok && after_ok {
            return true;
        }
        start = idx + 1;
    }
    false
}

fn contains_forbidden_content(value: &str) -> bool {
    let lower = value.to_ascii_lowercase();
    for needle in SQL_DENYLIST {
        if contains_word(&lower, needle) {
            return true;
        }
    }
    if value.contains("$(") || value.contains("&&") {
        return true;
    }
    if value.chars().any(|c| SHELL_META.contains(&c)) {
        return true;
    }
    let lower_trimmed = lower.as_str();
    if lower_trimmed.contains("<script")
        || lower_trimmed.contains("javascript:")
        || lower_trimmed.contains("data:text/html")
    {
        return true;
    }
    if value.contains("../") {
        return true;
    }
    if value
        .chars()
        .any(|c| (c as u32) < 0x20 && c != '\t' && c != '\n' && c != '\r')
    {
        return true;
    }
    false
}

fn scan_value(value: &Value, depth: usize) -> Result<(), ValidationError> {
    if depth > MAX_NESTED_DEPTH {
        return Err(ValidationError::ForbiddenContent(
            "nested structure exceeds allowed depth".into(),
        ));
    }
    match value {
        Value::String(s) => {
            if contains_forbidden_content(s) {
                return Err(ValidationError::ForbiddenContent(format!(
                    "field value contains forbidden content: {s:.32}"
                )));
            }
        }
        Value::Array(items) => {
            for item in items {
                scan_value(item, depth + 1)?;
            }
        }
        Value::Object(map) => {
            for (k, v) in map {
                if contains_forbidden_content(k) {
                    return Err(ValidationError::ForbiddenContent(format!(
                        "field name contains forbidden content: {k}"
                    )));
                }
                scan_value(v, depth + 1)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Parse and validate a raw webhook body into an `Alert`.
///
/// Errors map 1:1 onto the four kinds in the alert-validator contract:
/// malformed encoding, missing field, out-of-range, forbidden content.
pub fn parse(raw_body: &[u8]) -> Result<Alert, AppError> {
    let raw: RawAlert = serde_json::from_slice(raw_body)
        .map_err(|e| ValidationError::MalformedEncoding(e.to_string()))?;

    for (k, v) in raw.extra.iter() {
        if contains_forbidden_content(k) {
            return Err(ValidationError::ForbiddenContent(format!("field name: {k}")).into());
        }
        scan_value(v, 1)?;
    }
    if let Some(name) = &raw.alert_name {
        if contains_forbidden_content(name) {
            return Err(ValidationError::ForbiddenContent("alert_name".into()).into());
        }
    }
    if let Some(comment) = &raw.comment {
        if contains_forbidden_content(comment) {
            return Err(ValidationError::ForbiddenContent("comment".into()).into());
        }
    }
    if contains_forbidden_content(&raw.symbol) {
        return Err(ValidationError::ForbiddenContent("symbol".into()).into());
    }

    let symbol = raw.symbol.trim().to_ascii_uppercase();
    if symbol.is_empty() || symbol.len() > MAX_SYMBOL_LEN {
        return Err(ValidationError::OutOfRange(format!(
            "symbol length must be in 1..={MAX_SYMBOL_LEN}"
        ))
        .into());
    }
    if !symbol
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '/'))
    {
        return Err(ValidationError::OutOfRange("symbol contains disallowed characters".into()).into());
    }

    let action = match raw.action.to_ascii_lowercase().as_str() {
        "buy" => Action::Buy,
        "sell" => Action::Sell,
        "close" => Action::Close,
        other => {
            return Err(ValidationError::OutOfRange(format!("unknown action: {other}")).into())
        }
    };

    if raw.quantity < MIN_QUANTITY || raw.quantity > MAX_QUANTITY {
        return Err(ValidationError::OutOfRange(format!(
            "quantity must be in {MIN_QUANTITY}..={MAX_QUANTITY}"
        ))
        .into());
    }
    let quantity = raw.quantity as u32;

    let order_type = match raw.order_type.as_deref().map(str::to_ascii_lowercase).as_deref() {
        None => OrderType::Market,
        Some("market") => OrderType::Market,
        Some("limit") => OrderType::Limit,
        Some("stop") => OrderType::Stop,
        Some("stop_limit") => OrderType::StopLimit,
        Some(other) => {
            return Err(ValidationError::OutOfRange(format!("unknown order_type: {other}")).into())
        }
    };

    if let Some(price) = raw.price {
        if price <= Decimal::ZERO || price > Decimal::new(10_000_000, 0) {
            return Err(ValidationError::OutOfRange("price out of range".into()).into());
        }
    }
    if matches!(order_type, OrderType::Limit | OrderType::StopLimit) && raw.price.is_none() {
        return Err(ValidationError::MissingRequiredField("price".into()).into());
    }
    if matches!(order_type, OrderType::Stop | OrderType::StopLimit) && raw.stop_price.is_none() {
        return Err(ValidationError::MissingRequiredField("stop_price".into()).into());
    }

    let alert_id = raw
        .alert_id
        .unwrap_or_else(|| format!("alert_{}_{}", Utc::now().timestamp(), &uuid::Uuid::new_v4().simple().to_string()[..8]));

    Ok(Alert {
        alert_id,
        symbol,
        action,
        quantity,
        order_type,
        price: raw.price,
        stop_price: raw.stop_price,
        strategy_id: raw.strategy_id,
        account_group: raw.account_group.trim().to_ascii_lowercase(),
        alert_name: raw.alert_name,
        comment: raw.comment,
        timestamp: raw.timestamp.unwrap_or_else(Utc::now),
        extra: raw.extra,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(json: &str) -> Vec<u8> {
        json.as_bytes().to_vec()
    }

    #[test]
    fn parses_minimal_alert() {
        let alert = parse(&body(r#"{"symbol":"es","action":"buy","quantity":1,"account_group":"paper_simulator"}"#)).unwrap();
        assert_eq!(alert.symbol, "ES");
        assert_eq!(alert.action, Action::Buy);
        assert_eq!(alert.quantity, 1);
        assert_eq!(alert.order_type, OrderType::Market);
    }

    #[test]
    fn rejects_injection_in_symbol() {
        let err = parse(&body(r#"{"symbol":"ES'; DROP TABLE x; --","action":"buy","quantity":1}"#))
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Validation(ValidationError::ForbiddenContent(_))
        ));
    }

    #[test]
    fn rejects_quantity_out_of_range() {
        let err = parse(&body(r#"{"symbol":"ES","action":"buy","quantity":0}"#)).unwrap_err();
        assert!(matches!(
            err,
            AppError::Validation(ValidationError::OutOfRange(_))
        ));
    }

    #[test]
    fn requires_price_for_limit_orders() {
        let err = parse(&body(
            r#"{"symbol":"ES","action":"buy","quantity":1,"order_type":"limit"}"#,
        ))
        .unwrap_err();
        assert!(matches!(
            err,
            AppError::Validation(ValidationError::MissingRequiredField(_))
        ));
    }

    #[test]
    fn round_trips() {
        let a = parse(&body(
            r#"{"symbol":"ES","action":"buy","quantity":2,"alert_id":"alert_1_abcdef12","timestamp":"2024-01-01T00:00:00Z"}"#,
        ))
        .unwrap();
        let serialized = serde_json::to_vec(&a).unwrap();
        let b = parse(&serialized).unwrap();
        assert_eq!(a.symbol, b.symbol);
        assert_eq!(a.alert_id, b.alert_id);
        assert_eq!(a.quantity, b.quantity);
    }
}
