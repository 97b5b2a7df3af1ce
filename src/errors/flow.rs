// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use thiserror::Error;

/// Errors surfaced synchronously by the scheduler before any vertex runs.
///
/// Vertex-local failures (missing node file, evaluation errors, timeouts,
/// dependency skips) never appear here; they are captured in the vertex's
/// `ExecutionRecord` and the run continues.
#[derive(Debug, Error)]
pub enum FlowError {
    /// The project directory does not exist under the projects root.
    #[error("Project '{project_id}' not found")]
    ProjectNotFound { project_id: String },

    /// No start vertex was given and the graph contains none.
    #[error("No start node found in project '{project_id}'")]
    NoStartNode { project_id: String },

    /// The requested start vertex is not present in the graph.
    #[error("Start node '{node_id}' not found")]
    StartNodeNotFound { node_id: String },

    /// The reachable subgraph contains a dependency cycle; the run aborts
    /// with no progress.
    #[error(
        "Dependency cycle detected in reachable subgraph: {unresolved} of {total} nodes could not be ordered"
    )]
    CycleDetected { unresolved: usize, total: usize },

    /// `structure.json` exists but could not be parsed.
    #[error("Failed to parse graph structure for project '{project_id}': {message}")]
    InvalidStructure { project_id: String, message: String },

    /// Reading the structure file failed for a reason other than absence.
    #[error("Failed to read graph structure for project '{project_id}'")]
    StructureIo {
        project_id: String,
        #[source]
        source: std::io::Error,
    },
}
