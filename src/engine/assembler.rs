// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Input assembly: turns a vertex's in-edges plus upstream outputs into the
//! callee's argument shape.
//!
//! Only in-edges whose source already has a stored output participate. With
//! one in-edge the value flows bare (or wrapped under the edge's
//! `targetHandle`); with several, values collect into a mapping keyed by
//! each edge's `targetHandle` (or `"input_{source}"` when absent), later
//! edges winning key collisions. `sourceHandle` projects a named output out
//! of a mapping-shaped upstream value.

use serde_json::{json, Map, Value};
use std::collections::HashMap;

use crate::graph::Edge;
use crate::store::ObjectStore;

/// The assembled input for one vertex.
#[derive(Debug, Clone, Default)]
pub struct AssembledInput {
    pub input: Option<Value>,
    /// Map of source vertex id to the `targetHandle` its edge carried; used
    /// by the restructuring guard at evaluation time.
    pub target_handles: HashMap<String, String>,
}

/// Assemble the input for `node_id` from its in-edges.
#[allow(clippy::too_many_arguments)]
pub fn assemble_input(
    node_id: &str,
    start_id: &str,
    params: Option<&Value>,
    edges: &[Edge],
    node_outputs: &HashMap<String, Value>,
    store: &ObjectStore,
    project_id: &str,
) -> AssembledInput {
    let incoming: Vec<&Edge> = edges
        .iter()
        .filter(|e| e.target == node_id && node_outputs.contains_key(&e.source))
        .collect();

    let mut assembled = AssembledInput::default();

    match incoming.len() {
        0 => {
            // Start vertex special case: initial params stand in for the
            // missing in-edges.
            if node_id == start_id {
                assembled.input = params.cloned();
            }
        }
        1 => {
            let edge = incoming[0];
            let source_output = &node_outputs[&edge.source];

            // A top-level reference unwraps before handle projection so the
            // named output can be reached.
            let unwrapped = if ObjectStore::is_reference(source_output) {
                store.unwrap(project_id, source_output)
            } else {
                source_output.clone()
            };
            let value = project_source_handle(unwrapped, edge);

            match handle_of(&edge.target_handle) {
                Some(handle) => {
                    assembled
                        .target_handles
                        .insert(edge.source.clone(), handle.to_string());
                    assembled.input = Some(json!({ handle: value }));
                }
                None => assembled.input = Some(value),
            }
        }
        _ => {
            let mut map = Map::new();
            for edge in incoming {
                let source_output = node_outputs[&edge.source].clone();
                let value = project_source_handle(source_output, edge);

                match handle_of(&edge.target_handle) {
                    Some(handle) => {
                        assembled
                            .target_handles
                            .insert(edge.source.clone(), handle.to_string());
                        // Overlapping handles: the last edge in edge order wins.
                        map.insert(handle.to_string(), value);
                    }
                    None => {
                        map.insert(format!("input_{}", edge.source), value);
                    }
                }
            }
            assembled.input = Some(Value::Object(map));
        }
    }

    assembled
}

/// Restructure an input mapping through the source→handle map.
///
/// Skipped iff the mapping's key set is already exactly the handle set (the
/// value was pre-structured upstream); otherwise source-id keys remap to
/// their handles and unknown keys pass through. A non-mapping input with a
/// single known handle wraps under it.
pub fn restructure_for_handles(input: Value, target_handles: &HashMap<String, String>) -> Value {
    if target_handles.is_empty() {
        return input;
    }

    let map = match input {
        Value::Object(map) => map,
        other => {
            if target_handles.len() == 1 {
                let handle = target_handles.values().next().cloned().unwrap_or_default();
                if !handle.is_empty() {
                    return json!({ handle: other });
                }
            }
            return other;
        }
    };

    let handle_set: std::collections::HashSet<&str> =
        target_handles.values().map(String::as_str).collect();
    let key_set: std::collections::HashSet<&str> = map.keys().map(String::as_str).collect();
    if key_set == handle_set {
        return Value::Object(map);
    }

    let mut restructured = Map::new();
    for (key, value) in map {
        match target_handles.get(&key) {
            Some(handle) => restructured.insert(handle.clone(), value),
            None => restructured.insert(key, value),
        };
    }
    Value::Object(restructured)
}

fn project_source_handle(value: Value, edge: &Edge) -> Value {
    if let (Value::Object(map), Some(handle)) = (&value, handle_of(&edge.source_handle)) {
        if let Some(projected) = map.get(handle) {
            return projected.clone();
        }
    }
    value
}

fn handle_of(handle: &Option<String>) -> Option<&str> {
    handle.as_deref().filter(|h| !h.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(source: &str, target: &str, source_handle: Option<&str>, target_handle: Option<&str>) -> Edge {
        serde_json::from_value(json!({
            "source": source,
            "target": target,
            "sourceHandle": source_handle,
            "targetHandle": target_handle,
        }))
        .unwrap()
    }

    fn outputs(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_single_edge_without_handles_flows_bare() {
        let store = ObjectStore::new();
        let edges = vec![edge("a", "b", None, None)];
        let node_outputs = outputs(&[("a", json!(42))]);
        let assembled = assemble_input("b", "s", None, &edges, &node_outputs, &store, "p");
        assert_eq!(assembled.input, Some(json!(42)));
        assert!(assembled.target_handles.is_empty());
    }

    #[test]
    fn test_single_edge_wraps_under_target_handle() {
        let store = ObjectStore::new();
        let edges = vec![edge("a", "b", None, Some("msg"))];
        let node_outputs = outputs(&[("a", json!("hello"))]);
        let assembled = assemble_input("b", "s", None, &edges, &node_outputs, &store, "p");
        assert_eq!(assembled.input, Some(json!({"msg": "hello"})));
        assert_eq!(assembled.target_handles.get("a").map(String::as_str), Some("msg"));
    }

    #[test]
    fn test_source_handle_projects_named_output() {
        let store = ObjectStore::new();
        let edges = vec![edge("a", "b", Some("y"), None)];
        let node_outputs = outputs(&[("a", json!({"y": 6, "z": 7}))]);
        let assembled = assemble_input("b", "s", None, &edges, &node_outputs, &store, "p");
        assert_eq!(assembled.input, Some(json!(6)));
    }

    #[test]
    fn test_missing_source_handle_passes_whole_value() {
        let store = ObjectStore::new();
        let edges = vec![edge("a", "b", Some("absent"), None)];
        let node_outputs = outputs(&[("a", json!({"y": 6}))]);
        let assembled = assemble_input("b", "s", None, &edges, &node_outputs, &store, "p");
        assert_eq!(assembled.input, Some(json!({"y": 6})));
    }

    #[test]
    fn test_single_edge_unwraps_reference_before_projection() {
        let store = ObjectStore::new();
        let big: Vec<u32> = (0..5000).collect();
        let envelope = store.wrap_output("p", "a", json!({"seq": big.clone(), "len": 5000}));
        let edges = vec![edge("a", "b", Some("len"), None)];
        let node_outputs = outputs(&[("a", envelope)]);
        let assembled = assemble_input("b", "s", None, &edges, &node_outputs, &store, "p");
        assert_eq!(assembled.input, Some(json!(5000)));
    }

    #[test]
    fn test_fan_in_keys_by_target_handle() {
        let store = ObjectStore::new();
        let edges = vec![
            edge("t", "c", None, Some("msg")),
            edge("n", "c", Some("count"), Some("n")),
        ];
        let node_outputs = outputs(&[("t", json!("hello")), ("n", json!({"count": 3}))]);
        let assembled = assemble_input("c", "s", None, &edges, &node_outputs, &store, "p");
        assert_eq!(assembled.input, Some(json!({"msg": "hello", "n": 3})));
        assert_eq!(assembled.target_handles.len(), 2);
    }

    #[test]
    fn test_fan_in_falls_back_to_input_source_keys() {
        let store = ObjectStore::new();
        let edges = vec![edge("a", "c", None, None), edge("b", "c", None, None)];
        let node_outputs = outputs(&[("a", json!(1)), ("b", json!(2))]);
        let assembled = assemble_input("c", "s", None, &edges, &node_outputs, &store, "p");
        assert_eq!(assembled.input, Some(json!({"input_a": 1, "input_b": 2})));
    }

    #[test]
    fn test_overlapping_handles_last_edge_wins() {
        let store = ObjectStore::new();
        let edges = vec![
            edge("a", "c", None, Some("x")),
            edge("b", "c", None, Some("x")),
        ];
        let node_outputs = outputs(&[("a", json!(1)), ("b", json!(2))]);
        let assembled = assemble_input("c", "s", None, &edges, &node_outputs, &store, "p");
        assert_eq!(assembled.input, Some(json!({"x": 2})));
    }

    #[test]
    fn test_edges_from_unexecuted_sources_are_ignored() {
        let store = ObjectStore::new();
        let edges = vec![edge("a", "c", None, None), edge("ghost", "c", None, None)];
        let node_outputs = outputs(&[("a", json!(1))]);
        let assembled = assemble_input("c", "s", None, &edges, &node_outputs, &store, "p");
        // Only one live in-edge, so the value flows bare.
        assert_eq!(assembled.input, Some(json!(1)));
    }

    #[test]
    fn test_start_vertex_receives_initial_params() {
        let store = ObjectStore::new();
        let params = json!({"x": 3});
        let assembled = assemble_input("s", "s", Some(&params), &[], &HashMap::new(), &store, "p");
        assert_eq!(assembled.input, Some(json!({"x": 3})));
    }

    #[test]
    fn test_non_start_vertex_without_edges_gets_nothing() {
        let store = ObjectStore::new();
        let params = json!({"x": 3});
        let assembled = assemble_input("b", "s", Some(&params), &[], &HashMap::new(), &store, "p");
        assert_eq!(assembled.input, None);
    }

    #[test]
    fn test_restructure_skips_when_keys_match_handles_exactly() {
        let handles: HashMap<String, String> = [("a".to_string(), "msg".to_string())].into();
        let input = json!({"msg": "hello"});
        assert_eq!(restructure_for_handles(input.clone(), &handles), input);
    }

    #[test]
    fn test_restructure_remaps_source_id_keys() {
        let handles: HashMap<String, String> =
            [("a".to_string(), "msg".to_string()), ("b".to_string(), "n".to_string())].into();
        let input = json!({"a": "hello", "b": 3});
        assert_eq!(
            restructure_for_handles(input, &handles),
            json!({"msg": "hello", "n": 3})
        );
    }

    #[test]
    fn test_restructure_applies_on_partial_handle_overlap() {
        // Keys {msg, b} vs handles {msg, n}: not exactly equal, so the
        // source-id key remaps and the pre-structured key passes through.
        let handles: HashMap<String, String> =
            [("a".to_string(), "msg".to_string()), ("b".to_string(), "n".to_string())].into();
        let input = json!({"msg": "hello", "b": 3});
        assert_eq!(
            restructure_for_handles(input, &handles),
            json!({"msg": "hello", "n": 3})
        );
    }

    #[test]
    fn test_restructure_wraps_scalar_under_single_handle() {
        let handles: HashMap<String, String> = [("a".to_string(), "msg".to_string())].into();
        assert_eq!(
            restructure_for_handles(json!("bare"), &handles),
            json!({"msg": "bare"})
        );
    }

    #[test]
    fn test_restructure_without_handles_is_identity() {
        let input = json!({"anything": 1});
        assert_eq!(restructure_for_handles(input.clone(), &HashMap::new()), input);
    }
}
