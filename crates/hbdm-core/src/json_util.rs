//! Shared JSON field helpers for REST bodies and WebSocket frames.
//!
//! The exchange encodes numbers inconsistently (`"30000.5"` vs `30000.5`,
//! `"1"` vs `1`), so every numeric read goes through these helpers.

use serde_json::Value;

use crate::types::{DEPTH_LEVELS, PriceLevel};

/// Parse a JSON value (string or number) as `f64`.
#[inline]
pub fn parse_str_f64(v: Option<&Value>) -> Option<f64> {
    let v = v?;
    if let Some(s) = v.as_str() { fast_float2::parse(s).ok() } else { v.as_f64() }
}

/// Parse a JSON value (string or number) as `i64`.
#[inline]
pub fn parse_str_i64(v: Option<&Value>) -> Option<i64> {
    let v = v?;
    if let Some(s) = v.as_str() {
        s.parse().ok()
    } else {
        v.as_i64().or_else(|| v.as_f64().map(|f| f as i64))
    }
}

/// Named field as `f64`, `0.0` when absent or malformed.
#[inline]
pub fn f64_field(v: &Value, key: &str) -> f64 {
    parse_str_f64(v.get(key)).unwrap_or(0.0)
}

/// Named field as `i64`.
#[inline]
pub fn i64_field(v: &Value, key: &str) -> Option<i64> {
    parse_str_i64(v.get(key))
}

/// Named field as an owned string, stringifying numbers.
pub fn string_field(v: &Value, key: &str) -> Option<String> {
    match v.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Named field as `&str`, `""` when absent.
#[inline]
pub fn str_field<'a>(v: &'a Value, key: &str) -> &'a str {
    v.get(key).and_then(Value::as_str).unwrap_or("")
}

/// Named field as an array slice, empty when absent.
#[inline]
pub fn array_field<'a>(v: &'a Value, key: &str) -> &'a [Value] {
    v.get(key).and_then(Value::as_array).map(Vec::as_slice).unwrap_or(&[])
}

/// Overwrite the leading book levels from `[[price, vol], ...]` arrays.
///
/// Only the positions present in `levels` are written; deeper slots keep
/// their previous values.
pub fn fill_levels(side: &mut [PriceLevel; DEPTH_LEVELS], levels: &[Value]) {
    for (slot, level) in side.iter_mut().zip(levels.iter()) {
        if let Some(arr) = level.as_array() {
            slot.price = parse_str_f64(arr.first()).unwrap_or(0.0);
            slot.volume = parse_str_f64(arr.get(1)).unwrap_or(0.0);
        }
    }
}
