// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Streaming progress events.
//!
//! A streaming run yields a lazy, finite, non-restartable sequence: one
//! `start`, zero or more `node_complete`, one `complete`. Progress counts
//! (`total_nodes`, `node_index`) cover only main computational vertices;
//! result-vertex completions still fire so consumers can render outputs in
//! real time, carrying the progress count as it stands.

use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

use crate::engine::records::ExecutionRecord;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlowEvent {
    Start {
        /// Count of main vertices only; auxiliaries do not advance progress.
        total_nodes: usize,
        execution_order: Vec<String>,
        affected_nodes: Vec<String>,
        input_result_nodes: Vec<String>,
        output_result_nodes: Vec<String>,
        timestamp: f64,
    },
    NodeComplete {
        node_id: String,
        node_title: String,
        /// 1-based index among main vertices; for result vertices, the
        /// progress count at emission time.
        node_index: usize,
        total_nodes: usize,
        result: ExecutionRecord,
        timestamp: f64,
    },
    Complete {
        execution_results: HashMap<String, ExecutionRecord>,
        result_nodes: HashMap<String, Value>,
        execution_order: Vec<String>,
        total_execution_time_ms: u64,
        timestamp: f64,
    },
}

impl FlowEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            FlowEvent::Start { .. } => "start",
            FlowEvent::NodeComplete { .. } => "node_complete",
            FlowEvent::Complete { .. } => "complete",
        }
    }
}

/// Event timestamps are fractional seconds since the Unix epoch.
pub(crate) fn unix_timestamp() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_tag_with_snake_case_type() {
        let event = FlowEvent::Start {
            total_nodes: 1,
            execution_order: vec!["s".into()],
            affected_nodes: vec!["s".into()],
            input_result_nodes: vec![],
            output_result_nodes: vec![],
            timestamp: 0.0,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "start");
        assert_eq!(json["total_nodes"], 1);

        let event = FlowEvent::NodeComplete {
            node_id: "a".into(),
            node_title: "Doubler".into(),
            node_index: 1,
            total_nodes: 1,
            result: ExecutionRecord::success(serde_json::json!({"y": 2}), 3, ""),
            timestamp: 0.0,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "node_complete");
        assert_eq!(json["result"]["status"], "success");
    }
}
