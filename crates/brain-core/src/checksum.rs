//! Canonical-JSON checksums
//!
//! Snapshot and manifest integrity relies on a stable serialization: JSON
//! with object keys sorted at every level. Arrays keep their order. The
//! checksum is the hex SHA-256 of that canonical string.

use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Recursively rewrite a JSON value so every object's keys are in sorted
/// order. Array order is preserved.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::with_capacity(map.len());
            for key in keys {
                // Key came from the map above
                if let Some(v) = map.get(key) {
                    sorted.insert(key.clone(), canonicalize(v));
                }
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Hex-encoded SHA-256 of raw bytes
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Checksum of any serializable value over its canonical JSON form
pub fn config_checksum<T: Serialize>(value: &T) -> Result<String> {
    let json = serde_json::to_value(value).map_err(|e| Error::Parse(e.to_string()))?;
    let canonical = canonicalize(&json);
    let serialized =
        serde_json::to_string(&canonical).map_err(|e| Error::Parse(e.to_string()))?;
    Ok(sha256_hex(serialized.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_order_does_not_affect_checksum() {
        let a: Value = serde_json::from_str(r#"{"b": 1, "a": {"y": 2, "x": 3}}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"a": {"x": 3, "y": 2}, "b": 1}"#).unwrap();
        assert_eq!(
            config_checksum(&a).unwrap(),
            config_checksum(&b).unwrap()
        );
    }

    #[test]
    fn array_order_is_significant() {
        let a = json!({"items": [1, 2, 3]});
        let b = json!({"items": [3, 2, 1]});
        assert_ne!(
            config_checksum(&a).unwrap(),
            config_checksum(&b).unwrap()
        );
    }

    #[test]
    fn canonicalize_sorts_nested_objects() {
        let value: Value =
            serde_json::from_str(r#"{"z": {"b": 1, "a": 2}, "a": 0}"#).unwrap();
        let canonical = canonicalize(&value);
        let text = serde_json::to_string(&canonical).unwrap();
        assert_eq!(text, r#"{"a":0,"z":{"a":2,"b":1}}"#);
    }

    #[test]
    fn sha256_hex_matches_known_vector() {
        // SHA-256 of the empty string
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn checksum_is_deterministic_for_configs() {
        let config = crate::config::UserConfig::default();
        let first = config_checksum(&config).unwrap();
        let second = config_checksum(&config).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
    }
}
