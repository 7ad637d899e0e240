//! Hashing primitive and the leaf/root engine.
//!
//! Everything hashed here is SHA-256, hex-encoded lowercase. Two derivations
//! of a revision's verification hash exist:
//!
//! ```text
//! scalar: "0x" + sha256(canonical_json(fields))
//! tree:   merkle_root([sha256("<field>:<value>") for field in sorted(fields)])
//! ```
//!
//! `fields` is every own field of the revision except `leaves`. Field order
//! is the byte-wise sorted order of the names; insertion order never matters.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::types::VerificationHash;

/// SHA-256 of `data`, lowercase hex.
pub fn sha256_hex(data: impl AsRef<[u8]>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data.as_ref());
    hex::encode(hasher.finalize())
}

/// Coerce a JSON value to text the way JavaScript's `String(value)` does.
///
/// Leaves are `sha256("<field>:<value>")` over this text, so the coercion is
/// part of the wire contract.
pub fn js_string(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                n.to_string()
            } else {
                match n.as_f64() {
                    Some(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e21 => {
                        format!("{:.0}", f)
                    }
                    Some(f) => f.to_string(),
                    None => n.to_string(),
                }
            }
        }
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Null => String::new(),
                other => js_string(other),
            })
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => "[object Object]".to_string(),
    }
}

/// Leaf hash of one field.
pub fn leaf_hash(field: &str, value: &Value) -> String {
    sha256_hex(format!("{}:{}", field, js_string(value)))
}

/// Leaf hashes of `fields` in byte-wise sorted name order.
///
/// A `BTreeMap<String, _>` iterates in exactly that order.
pub fn derive_leaves(fields: &BTreeMap<String, Value>) -> Vec<String> {
    fields
        .iter()
        .map(|(name, value)| leaf_hash(name, value))
        .collect()
}

/// Hash an adjacent pair of tree nodes: `sha256(left_hex + right_hex)`.
pub fn hash_pair(left: &str, right: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    hex::encode(hasher.finalize())
}

/// Bottom-up Merkle root over hex leaves.
///
/// An unpaired final node at any level is promoted unchanged to the next
/// level; it is never duplicated. Returns `None` for an empty leaf set.
pub fn merkle_root(leaves: &[String]) -> Option<String> {
    if leaves.is_empty() {
        return None;
    }
    let mut level: Vec<String> = leaves.to_vec();
    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        for pair in level.chunks(2) {
            match pair {
                [left, right] => next.push(hash_pair(left, right)),
                [single] => next.push(single.clone()),
                _ => unreachable!("chunks(2) yields one or two items"),
            }
        }
        level = next;
    }
    level.pop()
}

/// Rebuild `value` with object keys inserted in sorted order at every depth.
fn sorted_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, &Value> = map.iter().collect();
            let mut out = Map::new();
            for (k, v) in sorted {
                out.insert(k.clone(), sorted_value(v));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted_value).collect()),
        other => other.clone(),
    }
}

/// Compact JSON of `fields` with keys sorted at every nesting level.
pub fn canonical_json(fields: &BTreeMap<String, Value>) -> String {
    let mut out = Map::new();
    for (k, v) in fields {
        out.insert(k.clone(), sorted_value(v));
    }
    Value::Object(out).to_string()
}

/// Scalar-mode verification hash of `fields`.
pub fn scalar_hash(fields: &BTreeMap<String, Value>) -> VerificationHash {
    VerificationHash::new(format!("0x{}", sha256_hex(canonical_json(fields))))
}
