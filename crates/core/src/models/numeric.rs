use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Parse an upstream decimal string into an `f64`.
///
/// Unparsable, empty and non-finite inputs become `0.0`. Values are never
/// rejected: the upstream source is the authority on what it sends, and a
/// single bad field must not sink a whole snapshot.
pub fn parse_decimal(raw: &str) -> f64 {
    match raw.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => v,
        _ => 0.0,
    }
}

/// Same as [`parse_decimal`] for optional fields.
pub fn parse_optional(raw: Option<&str>) -> f64 {
    raw.map(parse_decimal).unwrap_or(0.0)
}

/// Serde helper: accept a JSON string, number, bool or null and normalise it
/// to a string. Anything structured becomes the empty string.
///
/// The upstream API is inconsistent about quoting numeric fields, and
/// timestamps show up both as `"1700000000"` and `1700000000`.
pub fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    })
}

/// Optional variant of [`lenient_string`]: null and structured values map to `None`.
pub fn lenient_opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}
