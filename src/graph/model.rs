// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// The kind of a graph vertex.
///
/// Unknown kind strings normalize to `Custom` so newer frontends can add
/// vertex kinds without breaking older engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum NodeKind {
    #[serde(rename = "start")]
    Start,
    #[serde(rename = "result")]
    Result,
    #[serde(rename = "textInput")]
    TextInput,
    #[serde(rename = "custom")]
    #[serde(other)]
    #[default]
    Custom,
}

/// Vertex payload as persisted by the editor.
///
/// `file` names the source artifact holding the node's code; when absent the
/// name derives from the id and title (see [`Node::artifact_name`]). Any
/// additional editor-side fields ride along in `extra` untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeData {
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(
        rename = "componentType",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub component_type: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A graph vertex carrying user code plus metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: NodeKind,
    #[serde(default)]
    pub data: NodeData,
}

impl Node {
    /// Name of the source artifact holding this node's code.
    ///
    /// Uses `data.file` when present, otherwise derives
    /// `"{id}_{sanitized(title)}.py"` with every non-alphanumeric,
    /// non-underscore character mapped to `_`.
    pub fn artifact_name(&self) -> String {
        if let Some(file) = &self.data.file {
            return file.clone();
        }
        let title = if self.data.title.is_empty() {
            format!("Node_{}", self.id)
        } else {
            self.data.title.clone()
        };
        let sanitized: String = title
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
            .collect();
        format!("{}_{}.py", self.id, sanitized)
    }

    /// Whether this vertex is a text-input vertex.
    ///
    /// The `type` field is authoritative, but editors also mark text inputs
    /// via `componentType` or (for custom vertices) a `"Text Input"` title.
    pub fn is_text_input(&self) -> bool {
        if self.kind == NodeKind::TextInput {
            return true;
        }
        if self.data.component_type.as_deref() == Some("TextInput") {
            return true;
        }
        self.kind == NodeKind::Custom && self.data.title.starts_with("Text Input")
    }

    /// Whether this vertex is a main computational vertex.
    ///
    /// Only main vertices advance the streaming progress counter; start,
    /// result, and text-input vertices are auxiliary. The title filter is a
    /// substring match, wider than [`Node::is_text_input`]'s prefix match: a
    /// vertex titled e.g. "Clean Text Input" executes as a real node but
    /// never counts toward progress.
    pub fn is_main_component(&self) -> bool {
        if matches!(self.kind, NodeKind::Start | NodeKind::Result) || self.is_text_input() {
            return false;
        }
        !self.data.title.contains("Text Input")
            && !self.data.title.contains("Start Node")
            && !self.data.title.contains("Result Node")
    }
}

/// Edge-level metadata persisted by the editor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EdgeData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub param: Option<String>,
}

/// A directed edge between two vertices.
///
/// Handles identify named ports: `sourceHandle` a named output of the source
/// vertex, `targetHandle` a named input of the target vertex.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
    #[serde(
        rename = "sourceHandle",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub source_handle: Option<String>,
    #[serde(
        rename = "targetHandle",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub target_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<EdgeData>,
}

/// A loaded project graph.
///
/// Nodes are keyed by id with the structure file's insertion order retained;
/// edges keep their file order. Edges whose endpoints do not both refer to
/// existing nodes are dropped at construction.
#[derive(Debug, Clone, Default)]
pub struct FlowGraph {
    nodes: HashMap<String, Node>,
    order: Vec<String>,
    edges: Vec<Edge>,
}

impl FlowGraph {
    pub fn from_parts(nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        let mut map = HashMap::with_capacity(nodes.len());
        let mut order = Vec::with_capacity(nodes.len());
        for node in nodes {
            if !map.contains_key(&node.id) {
                order.push(node.id.clone());
            }
            map.insert(node.id.clone(), node);
        }
        let edges = edges
            .into_iter()
            .filter(|e| map.contains_key(&e.source) && map.contains_key(&e.target))
            .collect();
        Self {
            nodes: map,
            order,
            edges,
        }
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Node ids in structure-file order.
    pub fn node_order(&self) -> &[String] {
        &self.order
    }

    /// Edges in structure-file order.
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// First start vertex in file order, if any.
    pub fn find_start_node(&self) -> Option<&str> {
        self.order
            .iter()
            .find(|id| {
                self.nodes
                    .get(id.as_str())
                    .map(|n| n.kind == NodeKind::Start)
                    .unwrap_or(false)
            })
            .map(|s| s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(id: &str, kind: &str, title: &str) -> Node {
        serde_json::from_value(json!({
            "id": id,
            "type": kind,
            "data": {"title": title}
        }))
        .unwrap()
    }

    #[test]
    fn test_unknown_kind_normalizes_to_custom() {
        let n: Node = serde_json::from_value(json!({
            "id": "7",
            "type": "annotation",
            "data": {"title": "Note"}
        }))
        .unwrap();
        assert_eq!(n.kind, NodeKind::Custom);
    }

    #[test]
    fn test_artifact_name_prefers_declared_file() {
        let n: Node = serde_json::from_value(json!({
            "id": "15",
            "type": "custom",
            "data": {"title": "Tokenizer", "file": "15_Tokenizer.py"}
        }))
        .unwrap();
        assert_eq!(n.artifact_name(), "15_Tokenizer.py");
    }

    #[test]
    fn test_artifact_name_derives_and_sanitizes() {
        let n = node("18", "custom", "Custom Node (v2)");
        assert_eq!(n.artifact_name(), "18_Custom_Node__v2_.py");
    }

    #[test]
    fn test_artifact_name_falls_back_to_node_id_title() {
        let n: Node = serde_json::from_value(json!({"id": "3", "type": "custom"})).unwrap();
        assert_eq!(n.artifact_name(), "3_Node_3.py");
    }

    #[test]
    fn test_text_input_detection() {
        assert!(node("1", "textInput", "anything").is_text_input());
        assert!(node("2", "custom", "Text Input 3").is_text_input());
        let by_component: Node = serde_json::from_value(json!({
            "id": "4",
            "type": "custom",
            "data": {"title": "Seed", "componentType": "TextInput"}
        }))
        .unwrap();
        assert!(by_component.is_text_input());
        assert!(!node("5", "custom", "Doubler").is_text_input());
    }

    #[test]
    fn test_main_component_excludes_auxiliaries() {
        assert!(!node("1", "start", "Start Node").is_main_component());
        assert!(!node("2", "result", "Result Node").is_main_component());
        assert!(!node("3", "textInput", "Text Input").is_main_component());
        assert!(node("4", "custom", "Doubler").is_main_component());
    }

    #[test]
    fn test_main_component_excludes_text_input_titles_by_substring() {
        // Not a text input (the no-op detection matches by prefix), so it
        // runs as a real vertex, but it never advances the progress counter.
        let n = node("6", "custom", "Clean Text Input");
        assert!(!n.is_text_input());
        assert!(!n.is_main_component());
    }

    #[test]
    fn test_edges_with_unknown_endpoints_are_dropped() {
        let nodes = vec![node("a", "custom", "A"), node("b", "custom", "B")];
        let edges: Vec<Edge> = serde_json::from_value(json!([
            {"source": "a", "target": "b"},
            {"source": "a", "target": "ghost"},
            {"source": "ghost", "target": "b"}
        ]))
        .unwrap();
        let graph = FlowGraph::from_parts(nodes, edges);
        assert_eq!(graph.edges().len(), 1);
    }

    #[test]
    fn test_find_start_node_uses_file_order() {
        let nodes = vec![
            node("r", "result", "Result Node"),
            node("s1", "start", "Start Node"),
            node("s2", "start", "Start Node"),
        ];
        let graph = FlowGraph::from_parts(nodes, vec![]);
        assert_eq!(graph.find_start_node(), Some("s1"));
    }
}
