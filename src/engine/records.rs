// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Per-vertex execution records, terminal-vertex handling, and the run
//! summary.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

use crate::graph::{FlowGraph, NodeKind};
use crate::store::ObjectStore;

/// Human display renderings are capped at this many characters.
pub const DISPLAY_TRUNCATION_LIMIT: usize = 1500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Success,
    Error,
    Skipped,
}

/// Display block attached to output-class result vertices.
///
/// `display` is the truncated human rendering; `raw_value` the pass-through
/// datum; `full_ref` points at the full value in the object store when the
/// incoming value was a reference envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayMetadata {
    pub display: Value,
    pub full_ref: Option<String>,
    pub is_truncated: bool,
    pub raw_value: Value,
}

/// What happened to one vertex during a run.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionRecord {
    pub status: NodeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub execution_time_ms: u64,
    pub logs: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_metadata: Option<DisplayMetadata>,
}

impl ExecutionRecord {
    pub fn success(output: Value, execution_time_ms: u64, logs: impl Into<String>) -> Self {
        Self {
            status: NodeStatus::Success,
            output: Some(output),
            error: None,
            execution_time_ms,
            logs: logs.into(),
            display_metadata: None,
        }
    }

    pub fn error(error: impl Into<String>, logs: impl Into<String>) -> Self {
        Self {
            status: NodeStatus::Error,
            output: None,
            error: Some(error.into()),
            execution_time_ms: 0,
            logs: logs.into(),
            display_metadata: None,
        }
    }

    /// Record for a vertex skipped because `upstream` failed.
    pub fn skipped(upstream: &str) -> Self {
        Self {
            status: NodeStatus::Skipped,
            output: None,
            error: Some(format!("Skipped due to error in dependency {upstream}")),
            execution_time_ms: 0,
            logs: String::new(),
            display_metadata: None,
        }
    }
}

/// Aggregate record returned by a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct FlowRunSummary {
    pub success: bool,
    pub run_id: String,
    pub execution_results: HashMap<String, ExecutionRecord>,
    pub result_nodes: HashMap<String, Value>,
    pub execution_order: Vec<String>,
    pub total_execution_time_ms: u64,
}

/// Record for a start vertex: a no-op that anchors the run.
pub fn start_node_record() -> ExecutionRecord {
    ExecutionRecord::success(Value::Null, 0, "Start node - flow initiated")
}

/// Record for a text-input vertex.
///
/// Uses the terminal-seed value verbatim, unwrapping the editor's
/// convenience envelopes (`{value}` / `{raw_value}` / `{display}`); absent
/// or empty seeds yield the empty string. Text inputs never receive edge
/// input.
pub fn text_input_record(seed: Option<&Value>) -> ExecutionRecord {
    let mut value = seed.cloned().unwrap_or(Value::Null);
    if let Value::Object(map) = &value {
        for key in ["value", "raw_value", "display"] {
            if let Some(inner) = map.get(key) {
                value = inner.clone();
                break;
            }
        }
    }

    let empty = matches!(&value, Value::Null) || matches!(&value, Value::String(s) if s.is_empty());
    if empty {
        ExecutionRecord::success(Value::String(String::new()), 0, "Text Input node - no stored value")
    } else {
        ExecutionRecord::success(value, 0, "Text Input node - using stored value")
    }
}

/// Record for a result (terminal) vertex.
///
/// Output-class result vertices (`input` present) pass the unwrapped raw
/// value through as their own output and attach a truncated display block;
/// input-class vertices (no in-edge delivered a value) preserve their
/// seeded value as a user-editable constant.
pub fn result_node_record(
    store: &ObjectStore,
    project_id: &str,
    input: Option<Value>,
    seed: Option<&Value>,
) -> ExecutionRecord {
    let input_data = match (input, seed) {
        (Some(value), _) => value,
        (None, Some(stored)) => stored.clone(),
        (None, None) => Value::String(String::new()),
    };

    let mut full_ref = None;
    let actual_output;
    let display;
    let is_truncated;

    if ObjectStore::is_reference(&input_data) {
        full_ref = ObjectStore::reference_id(&input_data).map(|s| s.to_string());
        let unwrapped = store.unwrap(project_id, &input_data);
        let (d, t) = render_display(&unwrapped);
        display = d;
        is_truncated = t;
        actual_output = unwrapped;
    } else {
        let (d, t) = render_display(&input_data);
        display = d;
        is_truncated = t;
        actual_output = input_data;
    }

    let mut record = ExecutionRecord::success(
        actual_output.clone(),
        0,
        "Result node - passing through data",
    );
    record.display_metadata = Some(DisplayMetadata {
        display,
        full_ref,
        is_truncated,
        raw_value: actual_output,
    });
    record
}

/// Truncated human rendering of a value.
///
/// Strings are clipped directly; aggregates render as pretty JSON before
/// clipping; other scalars display as themselves.
fn render_display(value: &Value) -> (Value, bool) {
    match value {
        Value::String(s) => clip_display(s),
        Value::Object(_) | Value::Array(_) => match serde_json::to_string_pretty(value) {
            Ok(rendered) => clip_display(&rendered),
            Err(_) => clip_display(&value.to_string()),
        },
        other => (other.clone(), false),
    }
}

fn clip_display(text: &str) -> (Value, bool) {
    if text.chars().count() > DISPLAY_TRUNCATION_LIMIT {
        let head: String = text.chars().take(DISPLAY_TRUNCATION_LIMIT).collect();
        (Value::String(format!("{head}...")), true)
    } else {
        (Value::String(text.to_string()), false)
    }
}

/// Split the reachable result vertices into input-class and output-class.
///
/// A result vertex with at least one in-edge from the reachable subgraph is
/// an output terminal; one with none is a user-editable input whose seeded
/// value must be preserved. Order follows the structure file.
pub fn classify_result_nodes(
    graph: &FlowGraph,
    reachable: &HashSet<String>,
) -> (Vec<String>, Vec<String>) {
    let mut input_result_nodes = Vec::new();
    let mut output_result_nodes = Vec::new();

    for id in graph.node_order() {
        if !reachable.contains(id) {
            continue;
        }
        let Some(node) = graph.node(id) else { continue };
        if node.kind != NodeKind::Result {
            continue;
        }
        let has_incoming = graph
            .edges()
            .iter()
            .any(|e| e.target == *id && reachable.contains(&e.source));
        if has_incoming {
            output_result_nodes.push(id.clone());
        } else {
            input_result_nodes.push(id.clone());
        }
    }

    (input_result_nodes, output_result_nodes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_input_unwraps_convenience_envelopes() {
        let record = text_input_record(Some(&json!({"value": "hello"})));
        assert_eq!(record.output, Some(json!("hello")));
        let record = text_input_record(Some(&json!({"raw_value": 7})));
        assert_eq!(record.output, Some(json!(7)));
        let record = text_input_record(Some(&json!({"display": "shown"})));
        assert_eq!(record.output, Some(json!("shown")));
    }

    #[test]
    fn test_text_input_defaults_to_empty_string() {
        assert_eq!(text_input_record(None).output, Some(json!("")));
        assert_eq!(text_input_record(Some(&json!(""))).output, Some(json!("")));
    }

    #[test]
    fn test_text_input_plain_seed_passes_verbatim() {
        let record = text_input_record(Some(&json!("hello")));
        assert_eq!(record.output, Some(json!("hello")));
        assert!(record.logs.contains("using stored value"));
    }

    #[test]
    fn test_result_passes_value_through_with_display() {
        let store = ObjectStore::new();
        let record = result_node_record(&store, "p", Some(json!(6)), None);
        assert_eq!(record.status, NodeStatus::Success);
        assert_eq!(record.output, Some(json!(6)));
        let meta = record.display_metadata.unwrap();
        assert_eq!(meta.display, json!(6));
        assert_eq!(meta.raw_value, json!(6));
        assert!(!meta.is_truncated);
        assert_eq!(meta.full_ref, None);
    }

    #[test]
    fn test_result_preserves_seed_when_no_input() {
        let store = ObjectStore::new();
        let record = result_node_record(&store, "p", None, Some(&json!("cfg")));
        assert_eq!(record.output, Some(json!("cfg")));
    }

    #[test]
    fn test_result_truncates_long_strings() {
        let store = ObjectStore::new();
        let long = "x".repeat(2000);
        let record = result_node_record(&store, "p", Some(json!(long)), None);
        let meta = record.display_metadata.unwrap();
        assert!(meta.is_truncated);
        let display = meta.display.as_str().unwrap();
        assert_eq!(display.chars().count(), DISPLAY_TRUNCATION_LIMIT + 3);
        assert!(display.ends_with("..."));
        // The pass-through output is never truncated.
        assert_eq!(record.output.unwrap().as_str().unwrap().len(), 2000);
    }

    #[test]
    fn test_result_unwraps_references_and_records_full_ref() {
        let store = ObjectStore::new();
        let big: Vec<u32> = (0..5000).collect();
        let envelope = store.wrap_output("p", "producer", json!(big.clone()));
        let ref_id = ObjectStore::reference_id(&envelope).unwrap().to_string();

        let record = result_node_record(&store, "p", Some(envelope), None);
        assert_eq!(record.output, Some(json!(big)));
        let meta = record.display_metadata.unwrap();
        assert_eq!(meta.full_ref, Some(ref_id));
        assert!(meta.is_truncated);
    }

    #[test]
    fn test_aggregates_render_as_pretty_json() {
        let store = ObjectStore::new();
        let record = result_node_record(&store, "p", Some(json!({"a": 1})), None);
        let meta = record.display_metadata.unwrap();
        let display = meta.display.as_str().unwrap();
        assert!(display.contains("\"a\": 1"));
        assert!(display.contains('\n'));
    }

    #[test]
    fn test_skipped_record_cites_upstream() {
        let record = ExecutionRecord::skipped("a");
        assert_eq!(record.status, NodeStatus::Skipped);
        assert_eq!(
            record.error.as_deref(),
            Some("Skipped due to error in dependency a")
        );
        assert_eq!(record.execution_time_ms, 0);
    }
}
