//! Canonical JSON serialization and the content-addressed request hash:
//! `SHA-256(canonicalJSON({service, payload}))`, lower-case hex.
//!
//! Hashing keys on `(service, payload)` only, never `streamId`/`traceId`/
//! timestamps — those vary every run and would defeat replay.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// The `{service, payload}` pair a request hashes on.
#[derive(Serialize)]
struct HashSubject<'a> {
    service: &'a str,
    payload: &'a Value,
}

/// Computes the replay key for a command: lower-case hex SHA-256 of the
/// canonical JSON of `{service, payload}`.
pub fn request_hash(service: &str, payload: &Value) -> String {
    let subject = HashSubject { service, payload };
    let canonical = canonical_json(&serde_json::to_value(&subject).expect("Value is always serializable"));
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

/// Re-keys every object in `value` into a `BTreeMap` so that serializing it
/// back to a string sorts object keys at every nesting level. `serde_json`'s
/// default number formatting already produces the shortest unambiguous form
/// for the JSON this system carries (HTTP/LLM bodies), so no further number
/// normalization is needed.
pub fn canonical_json(value: &Value) -> String {
    serde_json::to_string(&sort_keys(value)).expect("canonicalized Value is always serializable")
}

fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> =
                map.iter().map(|(k, v)| (k.clone(), sort_keys(v))).collect();
            serde_json::to_value(sorted).expect("BTreeMap<String, Value> is always serializable")
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}
