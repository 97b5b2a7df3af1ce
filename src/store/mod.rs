// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Per-project object store with hybrid pass-by-value / pass-by-reference
//! transport.
//!
//! Small structural values travel between vertices inline. Anything larger
//! than the inline limit is parked here under a fresh reference id and a
//! compact *reference envelope* travels instead:
//!
//! ```json
//! {"type": "reference", "ref": "p_1718000000000", "preview": "list with 5000 items (first: 0)", "data_type": "list", "size": 20480}
//! ```
//!
//! Consumers unwrap envelopes depth-first back into the stored value; a
//! missing reference degrades to the envelope's preview string and is never
//! fatal. Entries live until the project's store is explicitly cleared, so
//! values survive across runs of the same project.

use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::collections::HashMap;

use crate::observability::messages::store::ReferenceStored;
use crate::observability::messages::StructuredLog;

/// Values whose serialized form reaches this many bytes go by reference.
const INLINE_LIMIT_BYTES: usize = 10_000;

/// Preview strings are clipped to roughly this many characters.
const PREVIEW_LIMIT: usize = 100;

/// Diagnostic snapshot of one project's store.
#[derive(Debug, Clone, serde::Serialize)]
pub struct StoreInfo {
    pub exists: bool,
    pub count: usize,
    pub refs: Vec<RefInfo>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct RefInfo {
    #[serde(rename = "ref")]
    pub ref_id: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub size: Option<usize>,
}

/// Shared object store, one keyed arena per project.
#[derive(Debug, Default)]
pub struct ObjectStore {
    stores: Mutex<HashMap<String, HashMap<String, Value>>>,
}

impl ObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a value is a reference envelope.
    pub fn is_reference(value: &Value) -> bool {
        matches!(value, Value::Object(map)
            if map.get("type").and_then(Value::as_str) == Some("reference")
                && map.contains_key("ref"))
    }

    /// The reference id carried by an envelope, if `value` is one.
    pub fn reference_id(value: &Value) -> Option<&str> {
        if Self::is_reference(value) {
            value.get("ref").and_then(Value::as_str)
        } else {
            None
        }
    }

    /// Apply the wrap policy to a vertex output.
    ///
    /// Scalars and null pass through. Aggregates pass through while their
    /// serialized form stays under the inline limit; beyond that the value is
    /// parked in the project's arena and a reference envelope is returned.
    pub fn wrap_output(&self, project_id: &str, node_id: &str, value: Value) -> Value {
        match &value {
            Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => return value,
            _ => {}
        }

        match serde_json::to_string(&value) {
            Ok(serialized) if serialized.len() < INLINE_LIMIT_BYTES => value,
            Ok(serialized) => {
                self.store_as_reference(project_id, node_id, value, Some(serialized.len()))
            }
            Err(_) => self.store_as_reference(project_id, node_id, value, None),
        }
    }

    /// Park a value and return its reference envelope.
    pub fn store_as_reference(
        &self,
        project_id: &str,
        node_id: &str,
        value: Value,
        size: Option<usize>,
    ) -> Value {
        let preview = generate_preview(&value);
        let data_type = data_type_name(&value);

        let mut stores = self.stores.lock();
        let project = stores.entry(project_id.to_string()).or_default();

        // Reference ids are `{node_id}_{ms}`; bump on same-millisecond reuse
        // so ids stay unique for the lifetime of the store.
        let mut millis = chrono::Utc::now().timestamp_millis();
        let mut ref_id = format!("{node_id}_{millis}");
        while project.contains_key(&ref_id) {
            millis += 1;
            ref_id = format!("{node_id}_{millis}");
        }
        project.insert(ref_id.clone(), value);

        ReferenceStored {
            project_id,
            ref_id: &ref_id,
            data_type: &data_type,
            size,
        }
        .log();

        json!({
            "type": "reference",
            "ref": ref_id,
            "preview": preview,
            "data_type": data_type,
            "size": size,
        })
    }

    /// Depth-first replacement of reference envelopes by their stored values.
    ///
    /// A missing reference degrades to the envelope's preview string; a
    /// missing project store degrades to null. Never fails.
    pub fn unwrap(&self, project_id: &str, value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                if Self::is_reference(value) {
                    let ref_id = map.get("ref").and_then(Value::as_str).unwrap_or_default();
                    let stores = self.stores.lock();
                    match stores.get(project_id) {
                        Some(project) => match project.get(ref_id) {
                            Some(stored) => stored.clone(),
                            None => map.get("preview").cloned().unwrap_or(Value::Null),
                        },
                        None => Value::Null,
                    }
                } else {
                    let unwrapped: Map<String, Value> = map
                        .iter()
                        .map(|(k, v)| (k.clone(), self.unwrap(project_id, v)))
                        .collect();
                    Value::Object(unwrapped)
                }
            }
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.unwrap(project_id, item))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    /// Remove a project's entire arena.
    pub fn clear_project(&self, project_id: &str) {
        self.stores.lock().remove(project_id);
    }

    /// Diagnostic snapshot of a project's arena.
    pub fn store_info(&self, project_id: &str) -> StoreInfo {
        let stores = self.stores.lock();
        match stores.get(project_id) {
            None => StoreInfo {
                exists: false,
                count: 0,
                refs: Vec::new(),
            },
            Some(project) => StoreInfo {
                exists: true,
                count: project.len(),
                refs: project
                    .iter()
                    .map(|(ref_id, value)| RefInfo {
                        ref_id: ref_id.clone(),
                        data_type: data_type_name(value),
                        size: serde_json::to_string(value).ok().map(|s| s.len()),
                    })
                    .collect(),
            },
        }
    }
}

/// Guest-style type name for a structural value.
fn data_type_name(value: &Value) -> String {
    match value {
        Value::Null => "NoneType",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
    .to_string()
}

/// Short human-readable summary of a value for reference envelopes.
fn generate_preview(value: &Value) -> String {
    match value {
        Value::Array(items) => {
            if let Some(cols) = tabular_width(items) {
                return format!("Table: {} rows × {} cols", items.len(), cols);
            }
            let mut preview = format!("list with {} items", items.len());
            if let Some(first) = items.first() {
                preview.push_str(&format!(" (first: {})", clip(&render(first), 50)));
            }
            preview
        }
        Value::Object(map) => {
            let mut preview = format!("Dict with {} keys", map.len());
            if !map.is_empty() {
                let keys: Vec<&str> = map.keys().take(3).map(String::as_str).collect();
                preview.push_str(&format!(
                    " ({}{})",
                    keys.join(", "),
                    if map.len() > 3 { "..." } else { "" }
                ));
            }
            preview
        }
        Value::String(s) => clip(s, PREVIEW_LIMIT),
        other => clip(&render(other), PREVIEW_LIMIT),
    }
}

/// An array of uniformly-keyed objects reads as a table; returns its width.
fn tabular_width(items: &[Value]) -> Option<usize> {
    let first = items.first()?.as_object()?;
    let width = first.len();
    if width == 0 {
        return None;
    }
    for item in items {
        let row = item.as_object()?;
        if row.len() != width || !first.keys().all(|k| row.contains_key(k)) {
            return None;
        }
    }
    Some(width)
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn clip(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        text.to_string()
    } else {
        let head: String = text.chars().take(limit).collect();
        format!("{head}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalars_pass_through() {
        let store = ObjectStore::new();
        assert_eq!(store.wrap_output("p", "n", json!(null)), json!(null));
        assert_eq!(store.wrap_output("p", "n", json!(42)), json!(42));
        assert_eq!(store.wrap_output("p", "n", json!("hi")), json!("hi"));
        assert!(!store.store_info("p").exists);
    }

    #[test]
    fn test_small_aggregates_pass_through() {
        let store = ObjectStore::new();
        let value = json!({"y": [1, 2, 3]});
        assert_eq!(store.wrap_output("p", "n", value.clone()), value);
        assert!(!store.store_info("p").exists);
    }

    #[test]
    fn test_large_values_become_references() {
        let store = ObjectStore::new();
        let big: Vec<u32> = (0..5000).collect();
        let wrapped = store.wrap_output("p", "n", json!(big));
        assert!(ObjectStore::is_reference(&wrapped));
        assert_eq!(wrapped["data_type"], "list");
        assert!(wrapped["size"].as_u64().unwrap() >= INLINE_LIMIT_BYTES as u64);
        assert_eq!(store.store_info("p").count, 1);
    }

    #[test]
    fn test_reference_round_trip() {
        let store = ObjectStore::new();
        let big: Vec<u32> = (0..5000).collect();
        let original = json!(big);
        let wrapped = store.wrap_output("p", "n", original.clone());
        assert_eq!(store.unwrap("p", &wrapped), original);
    }

    #[test]
    fn test_unwrap_recurses_into_aggregates() {
        let store = ObjectStore::new();
        let big: Vec<u32> = (0..5000).collect();
        let envelope = store.wrap_output("p", "n", json!(big.clone()));
        let nested = json!({"payload": envelope, "other": [1, {"inner": 2}]});
        let unwrapped = store.unwrap("p", &nested);
        assert_eq!(unwrapped["payload"], json!(big));
        assert_eq!(unwrapped["other"], json!([1, {"inner": 2}]));
    }

    #[test]
    fn test_missing_reference_degrades_to_preview() {
        let store = ObjectStore::new();
        // Seed the project store so lookup fails at the ref, not the project.
        store.store_as_reference("p", "other", json!([1]), Some(3));
        let ghost = json!({
            "type": "reference",
            "ref": "gone_0",
            "preview": "list with 3 items",
            "data_type": "list",
        });
        assert_eq!(store.unwrap("p", &ghost), json!("list with 3 items"));
    }

    #[test]
    fn test_reference_ids_stay_unique_per_store_lifetime() {
        let store = ObjectStore::new();
        let a = store.store_as_reference("p", "n", json!([1]), None);
        let b = store.store_as_reference("p", "n", json!([2]), None);
        assert_ne!(a["ref"], b["ref"]);
        assert_eq!(store.store_info("p").count, 2);
    }

    #[test]
    fn test_clear_project_empties_the_arena() {
        let store = ObjectStore::new();
        let wrapped = store.store_as_reference("p", "n", json!([1, 2]), None);
        store.clear_project("p");
        assert!(!store.store_info("p").exists);
        // The envelope now degrades to null (project store is gone).
        assert_eq!(store.unwrap("p", &wrapped), Value::Null);
    }

    #[test]
    fn test_preview_heuristics() {
        assert_eq!(
            generate_preview(&json!([{"a": 1, "b": 2}, {"a": 3, "b": 4}])),
            "Table: 2 rows × 2 cols"
        );
        assert_eq!(
            generate_preview(&json!([10, 20, 30])),
            "list with 3 items (first: 10)"
        );
        // serde_json maps iterate in sorted key order.
        assert_eq!(
            generate_preview(&json!({"x": 1, "y": 2, "z": 3, "w": 4})),
            "Dict with 4 keys (w, x, y...)"
        );
        let long = "a".repeat(150);
        let preview = generate_preview(&json!(long));
        assert_eq!(preview.chars().count(), PREVIEW_LIMIT + 3);
        assert!(preview.ends_with("..."));
    }
}
