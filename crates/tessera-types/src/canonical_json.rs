//! Deterministic JSON encoding used everywhere a value is hashed.
//!
//! Two logically equal values must hash identically regardless of field
//! declaration order or platform, so the canonical form sorts object keys
//! lexicographically, drops null members, emits no whitespace, and encodes
//! floats with no fractional part as integers. Array order is significant
//! and preserved as-is.

use crate::digest::Digest;
use crate::error::{Result, TesseraError};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Serialize a value to its canonical JSON string.
pub fn to_canonical_json<T: Serialize>(value: &T) -> Result<String> {
    let raw = serde_json::to_value(value)
        .map_err(|e| TesseraError::Internal(format!("canonical serialization: {}", e)))?;
    serde_json::to_string(&canonicalize(raw))
        .map_err(|e| TesseraError::Internal(format!("canonical encoding: {}", e)))
}

/// BLAKE3 digest of the canonical JSON representation.
pub fn canonical_hash<T: Serialize>(value: &T) -> Result<Digest> {
    let encoded = to_canonical_json(value)?;
    Ok(Digest::from_bytes(
        *blake3::hash(encoded.as_bytes()).as_bytes(),
    ))
}

fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(members) => {
            // BTreeMap gives lexicographic key order; null members vanish.
            let ordered: BTreeMap<String, Value> = members
                .into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, canonicalize(v)))
                .collect();
            Value::Object(ordered.into_iter().collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        Value::Number(n) => {
            // 7.0 and 7 must encode identically.
            match n.as_f64() {
                Some(f) if f.fract() == 0.0 && f.abs() < (1u64 << 53) as f64 => {
                    Value::Number(serde_json::Number::from(f as i64))
                }
                _ => Value::Number(n),
            }
        }
        other => other,
    }
}
