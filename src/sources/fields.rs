//! Optional-field readers for upstream JSON.
//!
//! Upstreams omit fields and mix numbers with numeric strings. Every reader
//! first yields an `Option`, then substitutes a default:
//!
//! | field kind      | missing or malformed becomes                          |
//! |-----------------|-------------------------------------------------------|
//! | numeric         | `0`                                                   |
//! | flag            | `false`                                               |
//! | identity string | `""` (record is unusable and skipped by the aggregator) |
//! | price           | `None`                                                |
//! | list            | empty                                                 |

use serde_json::Value;

pub fn opt_f64(v: &Value, key: &str) -> Option<f64> {
    let raw = v.get(key)?;
    let parsed = match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.filter(|n: &f64| n.is_finite())
}

pub fn opt_u128(v: &Value, key: &str) -> Option<u128> {
    match v.get(key)? {
        Value::Number(n) => n
            .as_u64()
            .map(u128::from)
            .or_else(|| n.as_f64().filter(|f| f.is_finite() && *f >= 0.0).map(|f| f as u128)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn opt_i64(v: &Value, key: &str) -> Option<i64> {
    match v.get(key)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn opt_bool(v: &Value, key: &str) -> Option<bool> {
    match v.get(key)? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

pub fn opt_str<'a>(v: &'a Value, key: &str) -> Option<&'a str> {
    v.get(key)?.as_str().map(str::trim).filter(|s| !s.is_empty())
}

pub fn num(v: &Value, key: &str) -> f64 {
    opt_f64(v, key).unwrap_or(0.0)
}

pub fn int(v: &Value, key: &str) -> u128 {
    opt_u128(v, key).unwrap_or(0)
}

/// Counters and balances that fit a `u64`; larger values saturate.
pub fn uint(v: &Value, key: &str) -> u64 {
    u64::try_from(int(v, key)).unwrap_or(u64::MAX)
}

pub fn small_int(v: &Value, key: &str) -> u32 {
    opt_u128(v, key).and_then(|n| u32::try_from(n).ok()).unwrap_or(0)
}

pub fn flag(v: &Value, key: &str) -> bool {
    opt_bool(v, key).unwrap_or(false)
}

pub fn text(v: &Value, key: &str) -> String {
    opt_str(v, key).unwrap_or_default().to_string()
}

/// Id fields arrive as strings or bare numbers.
pub fn id(v: &Value, key: &str) -> String {
    match v.get(key) {
        Some(Value::Number(n)) => n.to_string(),
        _ => text(v, key),
    }
}

/// Positive, finite price or nothing.
pub fn price(v: &Value, key: &str) -> Option<f64> {
    opt_f64(v, key).filter(|p| *p > 0.0)
}

pub fn array<'a>(v: &'a Value, key: &str) -> &'a [Value] {
    v.get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// The payload itself when it is a list, otherwise the list under `key`.
pub fn list<'a>(v: &'a Value, key: &str) -> &'a [Value] {
    match v.as_array() {
        Some(items) => items.as_slice(),
        None => array(v, key),
    }
}
