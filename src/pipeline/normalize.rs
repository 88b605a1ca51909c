//! Result normalizer — defensive coercion of loosely-structured AI output
//! into the canonical shapes the orchestrator consumes.
//!
//! Backends regularly violate the response contracts: arrays come back
//! wrapped in objects, single objects stand in for one-element arrays, and
//! payloads arrive fenced in markdown code blocks or double-encoded as
//! JSON strings. Both entry points here are pure and total — they never
//! fail on malformed input, and the worst case is an empty collection,
//! which callers must treat as a recovery failure.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::models::FieldDef;

/// Well-known non-field keys never surfaced as form data.
const EXCLUDED_KEYS: &[&str] = &["analysis", "error", "success", "message", "details"];

/// Envelope keys unwrapped while digging for the actual payload.
const ENVELOPE_KEYS: &[&str] = &["mergedText", "merged_text", "text"];

/// Unwrap ceiling for nested envelope/string payloads.
const MAX_UNWRAP_DEPTH: usize = 8;

/// Recover a field-definition array from a raw detection/merge payload.
///
/// Tried in order, first match wins:
/// 1. the value is already an array
/// 2. the value is an object with exactly one array-valued property
/// 3. the value is a single object that itself looks like one field
///    definition (has both `name` and `fieldType`)
/// 4. otherwise: empty, and the caller must treat this as a detection
///    failure
pub fn recover_field_array(raw: &str) -> Vec<FieldDef> {
    let Ok(value) = serde_json::from_str::<Value>(strip_code_fence(raw)) else {
        return Vec::new();
    };

    let items: Vec<Value> = match value {
        Value::Array(items) => items,
        Value::Object(map) => {
            let mut array_props: Vec<Vec<Value>> = map
                .values()
                .filter_map(|v| v.as_array().cloned())
                .collect();
            if array_props.len() == 1 {
                array_props.remove(0)
            } else if map.contains_key("name") && map.contains_key("fieldType") {
                vec![Value::Object(map)]
            } else {
                return Vec::new();
            }
        }
        _ => return Vec::new(),
    };

    items
        .into_iter()
        .filter_map(|v| serde_json::from_value::<FieldDef>(v).ok())
        .collect()
}

/// Recover a flat field-name → value map from a reconciled extraction
/// payload.
///
/// Unwraps `mergedText`/`text` envelopes (re-parsing payloads that are
/// themselves JSON-encoded strings), takes the first element of an array,
/// drops any property whose value is a non-array object (nested objects
/// are never valid leaf field values and are discarded, not flattened),
/// and excludes the well-known non-field keys.
pub fn recover_field_map(raw: &str) -> BTreeMap<String, Value> {
    let Ok(mut value) = serde_json::from_str::<Value>(strip_code_fence(raw)) else {
        return BTreeMap::new();
    };

    for _ in 0..MAX_UNWRAP_DEPTH {
        match value {
            Value::Object(ref map) => {
                let Some(inner) = ENVELOPE_KEYS.iter().find_map(|k| map.get(*k)) else {
                    break;
                };
                value = inner.clone();
            }
            Value::String(ref s) => match serde_json::from_str::<Value>(strip_code_fence(s)) {
                Ok(parsed) => value = parsed,
                // Plain prose cannot yield a field map
                Err(_) => return BTreeMap::new(),
            },
            _ => break,
        }
    }

    if let Value::Array(items) = value {
        value = items.into_iter().next().unwrap_or(Value::Null);
    }

    let Value::Object(map) = value else {
        return BTreeMap::new();
    };

    map.into_iter()
        .filter(|(key, _)| !EXCLUDED_KEYS.contains(&key.as_str()))
        .filter(|(_, val)| !val.is_object())
        .collect()
}

/// Strip a surrounding markdown code fence, if any.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}
