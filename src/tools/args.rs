//! Typed access to tool arguments.
//!
//! Schema validation has already run when these are called, so most failures here are
//! "required for this action" checks that a flat JSON schema cannot express.

use anyhow::{anyhow, bail, Result};
use serde_json::{Map, Value};

pub fn required_string(args: &Map<String, Value>, key: &str) -> Result<String> {
    match args.get(key) {
        Some(Value::String(v)) if !v.trim().is_empty() => Ok(v.clone()),
        Some(Value::String(_)) => bail!("'{}' must not be empty", key),
        None | Some(Value::Null) => bail!("Missing required field '{}'", key),
        Some(_) => bail!("'{}' must be a string", key),
    }
}

/// Like [`required_string`] but names the action that needs the field.
pub fn required_string_for(args: &Map<String, Value>, key: &str, action: &str) -> Result<String> {
    optional_string(args, key)?.ok_or_else(|| anyhow!("{} requires '{}'", action, key))
}

pub fn optional_string(args: &Map<String, Value>, key: &str) -> Result<Option<String>> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(v)) if v.trim().is_empty() => Ok(None),
        Some(Value::String(v)) => Ok(Some(v.clone())),
        Some(_) => bail!("'{}' must be a string", key),
    }
}

pub fn optional_i64(args: &Map<String, Value>, key: &str) -> Result<Option<i64>> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().and_then(whole_i64))
            .map(Some)
            .ok_or_else(|| anyhow!("'{}' must be an integer", key)),
        Some(_) => bail!("'{}' must be an integer", key),
    }
}

/// A whole float inside the `i64` range; `i64::MAX as f64` is 2^63 and already out of range.
fn whole_i64(f: f64) -> Option<i64> {
    (f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64).then_some(f as i64)
}

pub fn required_i64_for(args: &Map<String, Value>, key: &str, action: &str) -> Result<i64> {
    optional_i64(args, key)?.ok_or_else(|| anyhow!("{} requires '{}'", action, key))
}

pub fn i64_or(args: &Map<String, Value>, key: &str, default: i64) -> Result<i64> {
    Ok(optional_i64(args, key)?.unwrap_or(default))
}

pub fn optional_bool(args: &Map<String, Value>, key: &str) -> Result<Option<bool>> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(v)) => Ok(Some(*v)),
        Some(_) => bail!("'{}' must be a boolean", key),
    }
}

pub fn optional_string_array(args: &Map<String, Value>, key: &str) -> Result<Option<Vec<String>>> {
    let Some(value) = args.get(key) else {
        return Ok(None);
    };
    if value.is_null() {
        return Ok(None);
    }
    let items = value
        .as_array()
        .ok_or_else(|| anyhow!("'{}' must be an array of strings", key))?;
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| anyhow!("'{}' must be an array of strings", key))
        })
        .collect::<Result<Vec<_>>>()
        .map(Some)
}

/// Non-empty string array required by `action`.
pub fn required_string_array_for(
    args: &Map<String, Value>,
    key: &str,
    action: &str,
) -> Result<Vec<String>> {
    match optional_string_array(args, key)? {
        Some(items) if !items.is_empty() => Ok(items),
        _ => bail!("{} requires '{}'", action, key),
    }
}

pub fn optional_object<'a>(
    args: &'a Map<String, Value>,
    key: &str,
) -> Result<Option<&'a Map<String, Value>>> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(_) => bail!("'{}' must be an object", key),
    }
}

pub fn optional_array<'a>(args: &'a Map<String, Value>, key: &str) -> Result<Option<&'a Vec<Value>>> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) => Ok(Some(items)),
        Some(_) => bail!("'{}' must be an array", key),
    }
}

/// The `action` field every multi-action tool requires.
pub fn action(args: &Map<String, Value>) -> Result<String> {
    required_string(args, "action")
}

/// String field of a nested JSON object, empty string when absent.
pub fn str_field<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or("")
}

/// Integer field of a nested JSON object, zero when absent.
pub fn int_field(value: &Value, key: &str) -> i64 {
    value.get(key).and_then(Value::as_i64).unwrap_or(0)
}

/// ID field that WeChat returns as either a string or a number, `-` when absent.
pub fn id_field(value: &Value, key: &str) -> String {
    match value.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => "-".to_string(),
    }
}

/// Placeholder for empty display values.
pub fn or_dash(value: &str) -> &str {
    if value.is_empty() {
        "-"
    } else {
        value
    }
}

/// Formats a Unix timestamp (seconds) returned by WeChat.
pub fn format_unix(seconds: i64) -> String {
    chrono::DateTime::from_timestamp(seconds, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| seconds.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn required_string_cases() {
        let a = args(json!({"name": "vip", "blank": "  ", "num": 3}));
        assert_eq!(required_string(&a, "name").unwrap(), "vip");
        assert!(required_string(&a, "blank").unwrap_err().to_string().contains("must not be empty"));
        assert!(required_string(&a, "missing").unwrap_err().to_string().contains("Missing"));
        assert!(required_string(&a, "num").unwrap_err().to_string().contains("must be a string"));
    }

    #[test]
    fn action_specific_requirement_message() {
        let a = args(json!({}));
        let err = required_string_for(&a, "openId", "get_user_info").unwrap_err();
        assert_eq!(err.to_string(), "get_user_info requires 'openId'");
    }

    #[test]
    fn integers_accept_whole_floats() {
        let a = args(json!({"a": 5, "b": 5.0, "c": 5.5, "d": "5"}));
        assert_eq!(optional_i64(&a, "a").unwrap(), Some(5));
        assert_eq!(optional_i64(&a, "b").unwrap(), Some(5));
        assert!(optional_i64(&a, "c").is_err());
        assert!(optional_i64(&a, "d").is_err());
        assert_eq!(i64_or(&a, "missing", 20).unwrap(), 20);
    }

    #[test]
    fn out_of_range_floats_are_rejected() {
        let a = args(json!({"huge": 1e300, "negative": -1e300, "edge": 9.3e18, "big": 9.0e15}));
        assert!(optional_i64(&a, "huge").is_err());
        assert!(optional_i64(&a, "negative").is_err());
        assert!(optional_i64(&a, "edge").is_err());
        assert_eq!(optional_i64(&a, "big").unwrap(), Some(9_000_000_000_000_000));
    }

    #[test]
    fn string_arrays() {
        let a = args(json!({"ids": ["a", "b"], "empty": [], "mixed": ["a", 1]}));
        assert_eq!(
            required_string_array_for(&a, "ids", "batch").unwrap(),
            vec!["a".to_string(), "b".to_string()]
        );
        assert!(required_string_array_for(&a, "empty", "batch").is_err());
        assert!(optional_string_array(&a, "mixed").is_err());
        assert_eq!(optional_string_array(&a, "missing").unwrap(), None);
    }

    #[test]
    fn numeric_ids_are_rendered() {
        assert_eq!(id_field(&json!({"msg_id": 2247483}), "msg_id"), "2247483");
        assert_eq!(id_field(&json!({"msg_id": "abc"}), "msg_id"), "abc");
        assert_eq!(id_field(&json!({}), "msg_id"), "-");
        assert_eq!(or_dash(""), "-");
    }

    #[test]
    fn unix_formatting() {
        assert_eq!(format_unix(0), "1970-01-01 00:00:00 UTC");
    }
}
