//! Decoders for the loosely-typed upstream payloads.

use serde_json::Value;

use crate::upstream::UpstreamError;

/// Keys the upstream has used, across endpoints and API versions, to report a scalar count.
const COUNT_KEYS: [&str; 5] = ["result", "count", "total", "quantity", "amount"];

/// Reads a count that may arrive as a bare number or as an object carrying one of
/// [`COUNT_KEYS`].
pub fn parse_count(body: &str) -> Result<i64, UpstreamError> {
    let trimmed = body.trim();
    if !trimmed.is_empty() && trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return trimmed
            .parse::<i64>()
            .map_err(|_| UpstreamError::Shape(format!("count out of range: {trimmed}")));
    }

    let data: Value = serde_json::from_str(body)
        .map_err(|err| UpstreamError::Decode(format!("non-JSON return: {err}")))?;

    if let Some(object) = data.as_object() {
        let found = COUNT_KEYS
            .iter()
            .filter_map(|key| object.get(*key))
            .find_map(numeric);
        if let Some(count) = found {
            return Ok(count);
        }
    }

    Err(UpstreamError::Shape(format!(
        "could not identify total: {data}"
    )))
}

pub fn parse_users(body: &str) -> Result<Vec<Value>, UpstreamError> {
    let data: Value = serde_json::from_str(body)
        .map_err(|err| UpstreamError::Decode(format!("failed to decode users JSON: {err}")))?;

    match data {
        Value::Array(users) => Ok(users),
        Value::Object(mut object) => match object.remove("data") {
            Some(Value::Array(users)) => Ok(users),
            other => {
                if let Some(value) = other {
                    object.insert("data".to_string(), value);
                }
                Err(UpstreamError::Shape(format!(
                    "unexpected structure: {}",
                    Value::Object(object)
                )))
            }
        },
        other => Err(UpstreamError::Shape(format!(
            "unexpected structure: {other}"
        ))),
    }
}

fn numeric(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_u64().and_then(|n| i64::try_from(n).ok()))
        .or_else(|| value.as_f64().map(|f| f.trunc() as i64))
}

/// Upstream ids show up both as strings and as numbers.
pub fn id_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}
