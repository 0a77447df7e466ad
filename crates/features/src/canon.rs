//! Canonical JSON serialization for deterministic hashing
//!
//! Provides canonical JSON serialization with:
//! - Sorted map keys for determinism
//! - No whitespace or pretty-printing
//! - Blake3 hashing for artifact verification

use serde::Serialize;
use serde_json::{Map, Value};

/// Serialize a value to canonical JSON (sorted keys, no whitespace)
pub fn to_canonical_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let canonical = canonicalize(serde_json::to_value(value)?);
    serde_json::to_string(&canonical)
}

/// Recursively sort JSON object keys
fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));

            let mut sorted = Map::with_capacity(entries.len());
            for (key, val) in entries {
                sorted.insert(key, canonicalize(val));
            }
            Value::Object(sorted)
        }
        Value::Array(elements) => Value::Array(elements.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

/// Blake3 digest of a canonical JSON string, hex encoded
pub fn digest_hex(canonical_json: &str) -> String {
    hex::encode(blake3::hash(canonical_json.as_bytes()).as_bytes())
}

/// Compute Blake3 hash of the canonical JSON representation as hex
pub fn hash_canonical_hex<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    Ok(digest_hex(&to_canonical_json(value)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;
    use std::collections::HashMap;

    #[derive(Serialize)]
    struct TestStruct {
        b_field: i64,
        a_field: f64,
        z_field: String,
    }

    fn sample() -> TestStruct {
        TestStruct {
            b_field: 2,
            a_field: 0.1,
            z_field: "test".to_string(),
        }
    }

    #[test]
    fn test_canonical_json_sorts_keys() {
        let json = to_canonical_json(&sample()).unwrap();
        assert_eq!(json, r#"{"a_field":0.1,"b_field":2,"z_field":"test"}"#);
    }

    #[test]
    fn test_hash_independent_of_map_order() {
        let mut first = HashMap::new();
        let mut second = HashMap::new();
        for i in 0..32 {
            first.insert(format!("k{}", i), i);
        }
        for i in (0..32).rev() {
            second.insert(format!("k{}", i), i);
        }

        assert_eq!(
            hash_canonical_hex(&first).unwrap(),
            hash_canonical_hex(&second).unwrap()
        );
    }

    #[test]
    fn test_hash_changes_with_data() {
        let mut other = sample();
        other.b_field = 3;

        let hash1 = hash_canonical_hex(&sample()).unwrap();
        let hash2 = hash_canonical_hex(&other).unwrap();

        assert_ne!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }
}
