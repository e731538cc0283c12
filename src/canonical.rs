//! Deterministic serialization and digesting.
//!
//! Everything downstream that needs a stable identity for a JSON-shaped
//! value — scoring fingerprints, idempotency keys, brief signatures — goes
//! through [`canonicalize`] first. The byte string produced here is the
//! canonical form referenced everywhere else in this crate.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::cmp::Ordering;

use crate::error::CanonicalizeError;

/// Keys dropped unconditionally: ephemeral bookkeeping fields that must not
/// affect a claim's identity.
const EPHEMERAL_KEYS: &[&str] = &["createdAt", "updatedAt", "requestId", "sessionId", "timestamp"];

/// Round a float to 10 fractional digits and fold `-0` to `0`, per the
/// canonicalizer's number rule.
fn round_number(n: f64) -> Result<f64, CanonicalizeError> {
    if !n.is_finite() {
        return Err(CanonicalizeError::Unrepresentable(format!("non-finite number: {n}")));
    }
    let scale = 1e10_f64;
    let rounded = (n * scale).round() / scale;
    Ok(if rounded == 0.0 { 0.0 } else { rounded })
}

fn is_ephemeral_key(key: &str) -> bool {
    key.starts_with('_') || EPHEMERAL_KEYS.contains(&key)
}

/// Recursively normalize a `serde_json::Value` into its canonical form:
/// ephemeral/null-valued map keys dropped, map keys sorted by codepoint,
/// sequences deep-sorted by total order (unless `sort_sequences` is false,
/// for domains where element order is meaningful), numbers rounded.
pub fn canonicalize(value: &Value, sort_sequences: bool) -> Result<Value, CanonicalizeError> {
    match value {
        Value::Null => Ok(Value::Null),
        Value::Bool(b) => Ok(Value::Bool(*b)),
        Value::Number(n) => {
            let f = n.as_f64().ok_or_else(|| CanonicalizeError::Unrepresentable("non-f64 number".to_string()))?;
            let rounded = round_number(f)?;
            Ok(serde_json::json!(rounded))
        }
        Value::String(s) => Ok(Value::String(s.clone())),
        Value::Array(items) => {
            let mut canon: Vec<Value> = items
                .iter()
                .map(|v| canonicalize(v, sort_sequences))
                .collect::<Result<_, _>>()?;
            if sort_sequences {
                canon.sort_by(compare_canonical);
            }
            Ok(Value::Array(canon))
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map
                .keys()
                .filter(|k| !is_ephemeral_key(k) && !map[*k].is_null())
                .collect();
            keys.sort();
            let mut out = serde_json::Map::new();
            for k in keys {
                out.insert(k.clone(), canonicalize(&map[k], sort_sequences)?);
            }
            Ok(Value::Object(out))
        }
    }
}

/// Deep total order over canonical values: null/unset < bool < number <
/// string < sequence < mapping.
fn rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

fn compare_canonical(a: &Value, b: &Value) -> Ordering {
    let (ra, rb) = (rank(a), rank(b));
    if ra != rb {
        return ra.cmp(&rb);
    }
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .unwrap_or(0.0)
            .partial_cmp(&y.as_f64().unwrap_or(0.0))
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (xi, yi) in x.iter().zip(y.iter()) {
                let c = compare_canonical(xi, yi);
                if c != Ordering::Equal {
                    return c;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(x), Value::Object(y)) => {
            let xs = serde_json::to_string(x).unwrap_or_default();
            let ys = serde_json::to_string(y).unwrap_or_default();
            xs.cmp(&ys)
        }
        _ => Ordering::Equal,
    }
}

/// Serialize a canonical value to its final byte form: compact JSON with
/// sorted keys, which `canonicalize` has already arranged.
pub fn canonical_bytes(value: &Value, sort_sequences: bool) -> Result<Vec<u8>, CanonicalizeError> {
    let canon = canonicalize(value, sort_sequences)?;
    serde_json::to_vec(&canon).map_err(|e| CanonicalizeError::Unrepresentable(e.to_string()))
}

/// SHA-256 of the canonical bytes, hex-encoded.
pub fn digest(value: &Value) -> Result<String, CanonicalizeError> {
    let bytes = canonical_bytes(value, true)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

/// First 8 hex chars of a digest, used as a short human-facing id.
pub fn short_id(digest: &str) -> String {
    digest.chars().take(8).collect()
}

/// Signature over `evidenceDigest | templateVersion | preparedOnIso`.
pub fn signature(evidence_digest: &str, template_version: u32, prepared_on_iso: &str) -> String {
    let joined = format!("{evidence_digest}|{template_version}|{prepared_on_iso}");
    let mut hasher = Sha256::new();
    hasher.update(joined.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn map_key_order_does_not_affect_digest() {
        let a = json!({"b": 1, "a": 2});
        let b = json!({"a": 2, "b": 1});
        assert_eq!(digest(&a).unwrap(), digest(&b).unwrap());
    }

    #[test]
    fn ephemeral_keys_are_dropped() {
        let a = json!({"sku": "X", "createdAt": "2024-01-01", "_internal": true});
        let b = json!({"sku": "X"});
        assert_eq!(digest(&a).unwrap(), digest(&b).unwrap());
    }

    #[test]
    fn null_valued_keys_are_dropped() {
        let a = json!({"sku": "X", "note": null});
        let b = json!({"sku": "X"});
        assert_eq!(digest(&a).unwrap(), digest(&b).unwrap());
    }

    #[test]
    fn sequence_reordering_does_not_affect_digest_when_sorting_enabled() {
        let a = json!({"items": [3, 1, 2]});
        let b = json!({"items": [1, 2, 3]});
        assert_eq!(digest(&a).unwrap(), digest(&b).unwrap());
    }

    #[test]
    fn sequence_order_preserved_when_sorting_disabled() {
        let a = canonical_bytes(&json!([3, 1, 2]), false).unwrap();
        let b = canonical_bytes(&json!([1, 2, 3]), false).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn negative_zero_folds_to_zero() {
        let a = json!({"v": -0.0});
        let b = json!({"v": 0.0});
        assert_eq!(digest(&a).unwrap(), digest(&b).unwrap());
    }

    #[test]
    fn numbers_round_to_ten_fractional_digits() {
        let a = json!({"v": 1.00000000001});
        let b = json!({"v": 1.0});
        assert_eq!(digest(&a).unwrap(), digest(&b).unwrap());
    }

    #[test]
    fn canonicalize_is_idempotent() {
        let v = json!({"b": [3, 1, 2], "a": {"y": 1, "x": 2}});
        let once = canonicalize(&v, true).unwrap();
        let twice = canonicalize(&once, true).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn non_finite_numbers_are_rejected() {
        // serde_json cannot represent NaN/Infinity directly; simulate via
        // a hand-built Number would panic, so this exercises the f64 path
        // through round_number instead.
        assert!(round_number(f64::NAN).is_err());
        assert!(round_number(f64::INFINITY).is_err());
    }

    #[test]
    fn short_id_is_eight_chars() {
        let d = digest(&json!({"a": 1})).unwrap();
        assert_eq!(short_id(&d).len(), 8);
    }

    #[test]
    fn signature_is_deterministic() {
        let s1 = signature("abc123", 1, "2024-06-01");
        let s2 = signature("abc123", 1, "2024-06-01");
        assert_eq!(s1, s2);
        let s3 = signature("abc123", 2, "2024-06-01");
        assert_ne!(s1, s3);
    }
}
