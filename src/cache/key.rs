//! Cache Key Module
//!
//! Validates keys and derives the identities adapters store them under.

use serde_json::Value;

use crate::error::{CacheError, Result};

// == Validate ==
/// Checks that a key is a non-empty string or a non-empty structured value.
///
/// Arrays and objects are both accepted as the structured form.
pub fn validate(key: &Value) -> Result<()> {
    match key {
        Value::String(s) if s.is_empty() => Err(CacheError::InvalidKey(
            "key may not be an empty string".to_string(),
        )),
        Value::String(_) => Ok(()),
        Value::Array(items) if items.is_empty() => Err(CacheError::InvalidKey(
            "key may not be an empty array".to_string(),
        )),
        Value::Object(map) if map.is_empty() => Err(CacheError::InvalidKey(
            "key may not be an empty object".to_string(),
        )),
        Value::Array(_) | Value::Object(_) => Ok(()),
        other => Err(CacheError::InvalidKey(format!(
            "key must be of the type string or array, \"{}\" given",
            type_name(other)
        ))),
    }
}

// == Identity ==
/// Returns the text a backend stores the key under.
///
/// String keys are used as-is, structured keys as their canonical JSON.
pub fn identity(key: &Value) -> Result<String> {
    validate(key)?;
    match key {
        Value::String(s) => Ok(s.clone()),
        other => Ok(serde_json::to_string(other)?),
    }
}

// == Digest ==
/// Returns the hex MD5 of the key's JSON serialization.
///
/// The string `"a"` and the array `["a"]` hash differently.
pub fn digest(key: &Value) -> Result<String> {
    validate(key)?;
    let serialized = serde_json::to_string(key)?;
    Ok(format!("{:x}", md5::compute(serialized)))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validate_accepts_string_and_structured() {
        assert!(validate(&json!("key")).is_ok());
        assert!(validate(&json!(["a", 1])).is_ok());
        assert!(validate(&json!({"user": 42})).is_ok());
    }

    #[test]
    fn test_validate_rejects_empty() {
        assert!(matches!(validate(&json!("")), Err(CacheError::InvalidKey(_))));
        assert!(matches!(validate(&json!([])), Err(CacheError::InvalidKey(_))));
        assert!(matches!(validate(&json!({})), Err(CacheError::InvalidKey(_))));
    }

    #[test]
    fn test_validate_rejects_scalars() {
        for key in [json!(null), json!(true), json!(12), json!(1.5)] {
            let err = validate(&key).unwrap_err();
            assert!(matches!(err, CacheError::InvalidKey(_)), "{key} accepted");
        }
    }

    #[test]
    fn test_identity() {
        assert_eq!(identity(&json!("plain")).unwrap(), "plain");
        assert_eq!(identity(&json!(["a", 1])).unwrap(), r#"["a",1]"#);
        assert!(identity(&json!("")).is_err());
    }

    #[test]
    fn test_digest_is_stable_and_distinct() {
        let first = digest(&json!("a")).unwrap();
        assert_eq!(first, digest(&json!("a")).unwrap());
        assert_eq!(first.len(), 32);
        assert_ne!(first, digest(&json!(["a"])).unwrap());
    }
}
