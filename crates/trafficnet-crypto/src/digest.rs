// CONTENT DIGESTS
// Deterministic hashing of structured records
//
// SAFETY INVARIANTS:
// 1. Object keys are emitted in lexicographic order at every nesting level
// 2. Identical logical content always produces an identical digest
// 3. Any change to any serialized field changes the digest

use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::signature::{CryptoError, CryptoResult};

/// Hex-encoded SHA-256 of raw bytes.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Serialize `value` to JSON with keys sorted recursively.
///
/// Sorting is done explicitly so the encoding does not depend on whether
/// `serde_json` was built with `preserve_order`.
pub fn canonical_json<T: Serialize>(value: &T) -> CryptoResult<Vec<u8>> {
    let value = serde_json::to_value(value)
        .map_err(|e| CryptoError::Serialization(e.to_string()))?;
    serde_json::to_vec(&sort_keys(value)).map_err(|e| CryptoError::Serialization(e.to_string()))
}

/// SHA-256 over the canonical JSON encoding of `value`.
pub fn content_digest<T: Serialize>(value: &T) -> CryptoResult<String> {
    Ok(sha256_hex(&canonical_json(value)?))
}

fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::new();
            for (key, inner) in entries {
                sorted.insert(key, sort_keys(inner));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize)]
    struct Sample {
        zeta: u32,
        alpha: &'static str,
        nested: Nested,
    }

    #[derive(Serialize)]
    struct Nested {
        b: f64,
        a: bool,
    }

    #[test]
    fn test_canonical_json_sorts_nested_keys() {
        let sample = Sample {
            zeta: 1,
            alpha: "x",
            nested: Nested { b: 2.5, a: true },
        };
        let encoded = String::from_utf8(canonical_json(&sample).unwrap()).unwrap();
        assert_eq!(encoded, r#"{"alpha":"x","nested":{"a":true,"b":2.5},"zeta":1}"#);
    }

    #[test]
    fn test_sha256_hex_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_content_digest_changes_with_field() {
        let a = Nested { b: 1.0, a: true };
        let b = Nested { b: 1.0, a: false };
        assert_ne!(content_digest(&a).unwrap(), content_digest(&b).unwrap());
    }
}
