//! Numeric coercion for loosely-typed feed values.

use serde_json::Value;

/// Convert an arbitrary feed value to a float.
///
/// Numbers pass through; numeric strings are parsed. Anything else
/// (null, bools, arrays, objects, junk strings) is `None`, as are
/// non-finite results. Never returns `0.0` in place of a missing value.
pub fn number_or_none(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}
