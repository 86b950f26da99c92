use serde::Serialize;
use tessera_types::canonical_json;
use tessera_types::{Digest, Result};

/// BLAKE3 digest of raw bytes. Equal bytes yield equal digests regardless of
/// process, platform or time.
pub fn hash_bytes(data: &[u8]) -> Digest {
    Digest::from_bytes(*blake3::hash(data).as_bytes())
}

/// BLAKE3 digest of a value's canonical JSON encoding, so logically equal
/// values always hash identically.
pub fn hash_value<T: Serialize>(value: &T) -> Result<Digest> {
    canonical_json::canonical_hash(value)
}

/// Digest of the concatenation `a || b`.
pub fn hash_concat(a: &Digest, b: &Digest) -> Digest {
    let mut hasher = blake3::Hasher::new();
    hasher.update(a.as_bytes());
    hasher.update(b.as_bytes());
    Digest::from_bytes(*hasher.finalize().as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_hash_bytes_deterministic() {
        assert_eq!(hash_bytes(b"payload"), hash_bytes(b"payload"));
        assert_ne!(hash_bytes(b"payload"), hash_bytes(b"payloaD"));
    }

    #[test]
    fn test_hash_value_ignores_key_order() {
        let a = json!({"x": 1, "y": 2});
        let b = json!({"y": 2, "x": 1});
        assert_eq!(hash_value(&a).unwrap(), hash_value(&b).unwrap());
    }

    #[test]
    fn test_hash_concat_is_ordered() {
        let a = hash_bytes(b"a");
        let b = hash_bytes(b"b");
        assert_ne!(hash_concat(&a, &b), hash_concat(&b, &a));
    }
}
