// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::errors::FlowError;
use crate::graph::{Edge, FlowGraph, Node};

#[derive(Debug, Default, Deserialize)]
struct StructureFile {
    #[serde(default)]
    nodes: Vec<Node>,
    #[serde(default)]
    edges: Vec<Edge>,
}

/// Load the persisted graph for a project.
///
/// Reads `{projects_root}/{project_id}/structure.json`. An absent file means
/// an empty graph; a present but unparseable file is a load error surfaced
/// synchronously to the caller.
pub fn load_structure(projects_root: &Path, project_id: &str) -> Result<FlowGraph, FlowError> {
    let path = projects_root.join(project_id).join("structure.json");

    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(project_id, path = %path.display(), "No structure file; empty graph");
            return Ok(FlowGraph::default());
        }
        Err(err) => {
            return Err(FlowError::StructureIo {
                project_id: project_id.to_string(),
                source: err,
            })
        }
    };

    let structure: StructureFile =
        serde_json::from_str(&raw).map_err(|err| FlowError::InvalidStructure {
            project_id: project_id.to_string(),
            message: err.to_string(),
        })?;

    Ok(FlowGraph::from_parts(structure.nodes, structure.edges))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_project(structure: &str) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().join("demo");
        fs::create_dir_all(&project).unwrap();
        fs::write(project.join("structure.json"), structure).unwrap();
        dir
    }

    #[test]
    fn test_missing_structure_yields_empty_graph() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("demo")).unwrap();
        let graph = load_structure(dir.path(), "demo").unwrap();
        assert!(graph.is_empty());
    }

    #[test]
    fn test_loads_nodes_and_edges() {
        let dir = write_project(
            r#"{
                "nodes": [
                    {"id": "s", "type": "start", "data": {"title": "Start Node"}},
                    {"id": "a", "type": "custom", "data": {"title": "Doubler", "file": "a_Doubler.py"}}
                ],
                "edges": [
                    {"source": "s", "target": "a"}
                ]
            }"#,
        );
        let graph = load_structure(dir.path(), "demo").unwrap();
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.edges().len(), 1);
        assert_eq!(graph.find_start_node(), Some("s"));
    }

    #[test]
    fn test_invalid_structure_is_an_error() {
        let dir = write_project("{not json");
        let err = load_structure(dir.path(), "demo").unwrap_err();
        assert!(matches!(err, FlowError::InvalidStructure { .. }));
    }
}
