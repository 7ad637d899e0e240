//! Form flattening and field redaction.
//!
//! A form revision stores its structured source as flat `forms_<key>`
//! fields. Nested objects flatten to dotted keys (`forms_address.city`),
//! arrays to indexed keys (`forms_tags[0]`).
//!
//! Hiding renames `forms_x` to `forms_x.deleted` with a `null` value. The
//! revision keeps its map key and its stored leaves, so its verification
//! hash survives the redaction.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::error::AquaError;
use crate::hashing;
use crate::types::VerificationHash;

pub const FORM_PREFIX: &str = "forms_";
pub const REDACTED_SUFFIX: &str = ".deleted";

/// Normalize `x` or `forms_x` to `forms_x`.
pub fn form_key(key: &str) -> String {
    if key.starts_with(FORM_PREFIX) {
        key.to_string()
    } else {
        format!("{}{}", FORM_PREFIX, key)
    }
}

pub fn is_form_field(key: &str) -> bool {
    key.starts_with(FORM_PREFIX)
}

pub fn is_redacted(key: &str) -> bool {
    key.starts_with(FORM_PREFIX) && key.ends_with(REDACTED_SUFFIX)
}

pub fn redacted_key(key: &str) -> String {
    format!("{}{}", form_key(key), REDACTED_SUFFIX)
}

/// Parse form source bytes (a JSON object) into `forms_*` fields.
pub fn parse_form(bytes: &[u8]) -> Result<BTreeMap<String, Value>, AquaError> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| AquaError::InvalidForm(format!("content is not JSON: {}", e)))?;
    flatten_form(&value)
}

/// Flatten a JSON object into `forms_*` fields.
pub fn flatten_form(value: &Value) -> Result<BTreeMap<String, Value>, AquaError> {
    let object = value
        .as_object()
        .ok_or_else(|| AquaError::InvalidForm("form root must be a JSON object".into()))?;
    if object.is_empty() {
        return Err(AquaError::InvalidForm("form has no fields".into()));
    }
    let mut out = BTreeMap::new();
    for (key, value) in object {
        flatten_into(&mut out, &form_key(key), value);
    }
    Ok(out)
}

fn flatten_into(out: &mut BTreeMap<String, Value>, key: &str, value: &Value) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (k, v) in map {
                flatten_into(out, &format!("{}.{}", key, k), v);
            }
        }
        Value::Array(items) if !items.is_empty() => {
            for (i, v) in items.iter().enumerate() {
                flatten_into(out, &format!("{}[{}]", key, i), v);
            }
        }
        other => {
            out.insert(key.to_string(), other.clone());
        }
    }
}

/// Hide `key` in `fields`. Returns the value that was hidden.
pub fn hide_field(
    hash: &VerificationHash,
    fields: &mut BTreeMap<String, Value>,
    key: &str,
) -> Result<Value, AquaError> {
    let key = form_key(key);
    if is_redacted(&key) {
        return Err(AquaError::Redaction {
            hash: hash.clone(),
            reason: format!("`{}` is already a redacted key", key),
        });
    }
    let value = fields.remove(&key).ok_or_else(|| AquaError::Redaction {
        hash: hash.clone(),
        reason: format!("form field `{}` not found", key),
    })?;
    fields.insert(format!("{}{}", key, REDACTED_SUFFIX), Value::Null);
    Ok(value)
}

/// Restore a hidden field. `value` must reproduce one of the stored leaves.
pub fn unhide_field(
    hash: &VerificationHash,
    fields: &mut BTreeMap<String, Value>,
    leaves: &[String],
    key: &str,
    value: Value,
) -> Result<(), AquaError> {
    let key = form_key(key.strip_suffix(REDACTED_SUFFIX).unwrap_or(key));
    let hidden = format!("{}{}", key, REDACTED_SUFFIX);
    if !fields.contains_key(&hidden) {
        return Err(AquaError::Redaction {
            hash: hash.clone(),
            reason: format!("form field `{}` is not redacted", key),
        });
    }
    let leaf = hashing::leaf_hash(&key, &value);
    if !leaves.contains(&leaf) {
        return Err(AquaError::Redaction {
            hash: hash.clone(),
            reason: format!("value supplied for `{}` does not match any stored leaf", key),
        });
    }
    fields.remove(&hidden);
    fields.insert(key, value);
    Ok(())
}

/// Rebuild a nested JSON object from flattened fields, skipping redacted
/// ones. Indexed keys come back as object members named `tags[0]` etc.
pub fn visible_fields(fields: &BTreeMap<String, Value>) -> Map<String, Value> {
    fields
        .iter()
        .filter(|(k, _)| is_form_field(k) && !is_redacted(k))
        .map(|(k, v)| (k[FORM_PREFIX.len()..].to_string(), v.clone()))
        .collect()
}
