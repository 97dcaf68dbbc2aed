//! Audit record kinds, redaction and the integrity hash chain.
//!
//! This module lives in `core` (zero internal deps) so the Postgres audit
//! sink and the in-process emitter agree on action names and hashing.

use crate::hashing;

// ---------------------------------------------------------------------------
// Action kinds
// ---------------------------------------------------------------------------

/// Kinds of audit record emitted by the bus.
pub mod action_kinds {
    pub const PUBLISH: &str = "publish";
    pub const SUBSCRIBE: &str = "subscribe";
    pub const UNSUBSCRIBE: &str = "unsubscribe";
    pub const DELIVERY_FAILED: &str = "delivery_failed";
}

// ---------------------------------------------------------------------------
// Integrity hash computation
// ---------------------------------------------------------------------------

/// Known seed value for the first entry in the hash chain.
const CHAIN_SEED: &str = "ARCHIBUS_AUDIT_CHAIN_SEED_V1";

/// Compute the SHA-256 integrity hash for an audit entry.
///
/// `prev_hash` is the hash of the previous entry, or `None` for the first
/// entry in the chain. `entry_data` is the canonical serialization of the
/// entry, see [`canonical_entry`].
pub fn compute_integrity_hash(prev_hash: Option<&str>, entry_data: &str) -> String {
    let prev = prev_hash.unwrap_or(CHAIN_SEED);
    let combined = format!("{prev}|{entry_data}");
    hashing::sha256_hex(combined.as_bytes())
}

/// Canonical string form of an audit entry used as hash input.
///
/// `serde_json` keeps object keys sorted (no `preserve_order`), so the same
/// details always serialize to the same bytes.
pub fn canonical_entry(
    action: &str,
    actor_service: Option<&str>,
    details: &serde_json::Value,
) -> String {
    format!("{action}|{}|{details}", actor_service.unwrap_or("-"))
}

// ---------------------------------------------------------------------------
// Sensitive field redaction
// ---------------------------------------------------------------------------

/// Keys whose values are redacted from audit details before storage.
pub const SENSITIVE_FIELDS: &[&str] = &[
    "password",
    "token",
    "secret",
    "api_key",
    "private_key",
    "authorization",
    "credential",
];

/// Redact sensitive fields from a JSON value, recursing into objects and arrays.
pub fn redact_sensitive_fields(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut redacted = serde_json::Map::new();
            for (key, val) in map {
                let lower_key = key.to_lowercase();
                if SENSITIVE_FIELDS.iter().any(|f| lower_key.contains(f)) {
                    redacted.insert(
                        key.clone(),
                        serde_json::Value::String("[REDACTED]".to_string()),
                    );
                } else {
                    redacted.insert(key.clone(), redact_sensitive_fields(val));
                }
            }
            serde_json::Value::Object(redacted)
        }
        serde_json::Value::Array(arr) => {
            serde_json::Value::Array(arr.iter().map(redact_sensitive_fields).collect())
        }
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn first_entry_uses_seed() {
        let hash = compute_integrity_hash(None, "test_data");
        assert_eq!(hash.len(), 64);
        assert_ne!(hash, compute_integrity_hash(Some("other"), "test_data"));
    }

    #[test]
    fn chained_entry_depends_on_previous_hash() {
        let first = compute_integrity_hash(None, "entry_1");
        let second = compute_integrity_hash(Some(&first), "entry_2");
        let forged = compute_integrity_hash(None, "entry_2");
        assert_ne!(second, forged);
    }

    #[test]
    fn canonical_entry_is_stable_across_key_order() {
        let a = canonical_entry("publish", Some("goals"), &json!({"b": 1, "a": 2}));
        let b = canonical_entry("publish", Some("goals"), &json!({"a": 2, "b": 1}));
        assert_eq!(a, b);
        assert!(a.starts_with("publish|goals|"));
    }

    #[test]
    fn canonical_entry_marks_missing_actor() {
        let entry = canonical_entry("delivery_failed", None, &json!({}));
        assert_eq!(entry, "delivery_failed|-|{}");
    }

    #[test]
    fn secrets_are_redacted_recursively() {
        let details = json!({
            "subscription_id": "s1",
            "secret": "hunter2",
            "nested": {"AuthToken": "abc", "keep": true},
            "list": [{"password": "x"}]
        });
        let redacted = redact_sensitive_fields(&details);
        assert_eq!(redacted["subscription_id"], "s1");
        assert_eq!(redacted["secret"], "[REDACTED]");
        assert_eq!(redacted["nested"]["AuthToken"], "[REDACTED]");
        assert_eq!(redacted["nested"]["keep"], true);
        assert_eq!(redacted["list"][0]["password"], "[REDACTED]");
    }
}
