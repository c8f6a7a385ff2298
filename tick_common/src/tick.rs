//! Raw tick data model and JSON decoding helpers.
//!
//! A `RawTick` is one price update for one instrument as sent by the feed. The
//! snapshot endpoint and the push event share the same shape: a JSON object keyed
//! by instrument id whose values carry `last_price`, `net_change` and `change`.
//! Decoding is lenient on purpose: a numeric field that is missing, `null` or not a
//! number decodes as `None` and is later rendered as zero.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use log::debug;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::SyncError;
use crate::result::Result;

/// Opaque instrument identifier (the feed's instrument token).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstrumentId(String);

impl InstrumentId {
    /// Create an identifier from any string-like token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Borrow the raw token.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for InstrumentId {
    fn from(token: &str) -> Self {
        Self::new(token)
    }
}

impl From<String> for InstrumentId {
    fn from(token: String) -> Self {
        Self(token)
    }
}

impl From<u64> for InstrumentId {
    fn from(token: u64) -> Self {
        Self(token.to_string())
    }
}

/// Market tick for a single instrument.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTick {
    /// Last traded price.
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub last_price: Option<Decimal>,
    /// Signed absolute change against the previous close.
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub net_change: Option<Decimal>,
    /// Signed percent change against the previous close.
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub change: Option<Decimal>,
}

impl RawTick {
    /// Build a tick from already-known values.
    pub fn new(last_price: Decimal, net_change: Decimal, change: Decimal) -> Self {
        Self {
            last_price: Some(last_price),
            net_change: Some(net_change),
            change: Some(change),
        }
    }
}

/// A batch of ticks keyed by instrument. Snapshot and push batches share this shape.
pub type TickBatch = BTreeMap<InstrumentId, RawTick>;

/// Decode a tick batch from a JSON document.
///
/// The document must be a JSON object. Entries whose value is not an object are
/// skipped; everything inside an entry is decoded leniently.
pub fn batch_from_value(value: Value) -> Result<TickBatch> {
    let entries = match value {
        Value::Object(entries) => entries,
        other => {
            return Err(SyncError::Protocol(format!(
                "expected a JSON object of ticks, got {}",
                json_kind(&other)
            )));
        }
    };

    let mut batch = TickBatch::new();
    for (token, raw) in entries {
        if !raw.is_object() {
            debug!("Skipping tick for {} with non-object payload", token);
            continue;
        }
        match serde_json::from_value::<RawTick>(raw) {
            Ok(tick) => {
                batch.insert(InstrumentId::from(token), tick);
            }
            Err(e) => debug!("Skipping undecodable tick for {}: {}", token, e),
        }
    }
    Ok(batch)
}

/// Decode a tick batch from raw JSON bytes.
pub fn batch_from_slice(bytes: &[u8]) -> Result<TickBatch> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| SyncError::Protocol(format!("tick payload is not JSON: {}", e)))?;
    batch_from_value(value)
}

/// Interpret a JSON value as a decimal, if it holds one.
pub fn decimal_from_value(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => parse_decimal(&n.to_string()),
        Value::String(s) => parse_decimal(s.trim()),
        _ => None,
    }
}

fn parse_decimal(text: &str) -> Option<Decimal> {
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .ok()
}

fn lenient_decimal<'de, D>(deserializer: D) -> std::result::Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(decimal_from_value))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn decodes_feed_shape_and_ignores_extra_fields() {
        let batch = batch_from_value(json!({
            "256265": {
                "instrument_token": 256265,
                "last_price": 22450.55,
                "net_change": -12.4,
                "change": -0.055
            }
        }))
        .unwrap();

        let tick = &batch[&InstrumentId::from(256265u64)];
        assert_eq!(tick.last_price, Some(dec("22450.55")));
        assert_eq!(tick.net_change, Some(dec("-12.4")));
        assert_eq!(tick.change, Some(dec("-0.055")));
    }

    #[test]
    fn missing_null_and_garbage_fields_decode_as_none() {
        let batch = batch_from_value(json!({
            "1": {},
            "2": { "last_price": null, "net_change": "abc", "change": true },
            "3": { "last_price": "101.5", "change": 1e-7 }
        }))
        .unwrap();

        assert_eq!(batch[&InstrumentId::from("1")], RawTick::default());
        assert_eq!(batch[&InstrumentId::from("2")], RawTick::default());
        let third = &batch[&InstrumentId::from("3")];
        assert_eq!(third.last_price, Some(dec("101.5")));
        assert_eq!(third.change, Some(dec("0.0000001")));
    }

    #[test]
    fn non_object_entries_are_skipped() {
        let batch = batch_from_value(json!({ "1": null, "2": 5, "3": { "change": 1 } })).unwrap();
        assert_eq!(batch.len(), 1);
        assert!(batch.contains_key(&InstrumentId::from("3")));
    }

    #[test]
    fn non_object_payload_is_a_protocol_error() {
        let err = batch_from_value(json!([1, 2, 3])).unwrap_err();
        assert!(matches!(err, SyncError::Protocol(_)));
        assert!(matches!(batch_from_slice(b"not json"), Err(SyncError::Protocol(_))));
    }
}
