//! View key collation.
//!
//! Keys sort by type first (null, false, true, numbers, strings, arrays,
//! objects), then by value. Arrays and objects compare element-wise and
//! then by length. Strings compare by code point.

use std::cmp::Ordering;

use serde_json::Value;

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(false) => 1,
        Value::Bool(true) => 2,
        Value::Number(_) => 3,
        Value::String(_) => 4,
        Value::Array(_) => 5,
        Value::Object(_) => 6,
    }
}

/// Compares two view keys.
pub fn collate(a: &Value, b: &Value) -> Ordering {
    let by_rank = type_rank(a).cmp(&type_rank(b));
    if by_rank != Ordering::Equal {
        return by_rank;
    }

    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(xs), Value::Array(ys)) => xs
            .iter()
            .zip(ys)
            .map(|(x, y)| collate(x, y))
            .find(|ord| *ord != Ordering::Equal)
            .unwrap_or_else(|| xs.len().cmp(&ys.len())),
        (Value::Object(xs), Value::Object(ys)) => xs
            .iter()
            .zip(ys)
            .map(|((kx, vx), (ky, vy))| kx.cmp(ky).then_with(|| collate(vx, vy)))
            .find(|ord| *ord != Ordering::Equal)
            .unwrap_or_else(|| xs.len().cmp(&ys.len())),
        _ => Ordering::Equal,
    }
}
