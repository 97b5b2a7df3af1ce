// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for flow scheduler lifecycle events.

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// A flow run started.
///
/// # Log Level
/// `info!` - Important operational event
///
/// # Example
/// ```
/// use flowrunner::observability::messages::engine::FlowStarted;
///
/// let msg = FlowStarted {
///     project_id: "example_project",
///     node_count: 6,
///     main_count: 3,
///     max_workers: 4,
/// };
///
/// tracing::info!("{}", msg);
/// ```
pub struct FlowStarted<'a> {
    pub project_id: &'a str,
    pub node_count: usize,
    pub main_count: usize,
    pub max_workers: usize,
}

impl Display for FlowStarted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Starting flow for project '{}': {} nodes ({} main), max_workers={}",
            self.project_id, self.node_count, self.main_count, self.max_workers
        )
    }
}

impl StructuredLog for FlowStarted<'_> {
    fn log(&self) {
        tracing::info!(
            project_id = self.project_id,
            node_count = self.node_count,
            main_count = self.main_count,
            max_workers = self.max_workers,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "flow_execution",
            span_name = name,
            project_id = self.project_id,
            node_count = self.node_count,
            main_count = self.main_count,
            max_workers = self.max_workers,
        )
    }
}

/// A flow run completed.
///
/// # Log Level
/// `info!` - Important operational event
pub struct FlowCompleted<'a> {
    pub project_id: &'a str,
    pub node_count: usize,
    pub duration: std::time::Duration,
}

impl Display for FlowCompleted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Flow for project '{}' completed: {} nodes in {:?}",
            self.project_id, self.node_count, self.duration
        )
    }
}

impl StructuredLog for FlowCompleted<'_> {
    fn log(&self) {
        tracing::info!(
            project_id = self.project_id,
            node_count = self.node_count,
            duration_ms = self.duration.as_millis() as u64,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "flow_completed",
            span_name = name,
            project_id = self.project_id,
            node_count = self.node_count,
            duration = ?self.duration,
        )
    }
}

/// A vertex finished with an error status.
///
/// # Log Level
/// `warn!` - Vertex-local failure; the run may continue
pub struct NodeFailed<'a> {
    pub node_id: &'a str,
    pub error: &'a str,
}

impl Display for NodeFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Node '{}' failed: {}", self.node_id, self.error)
    }
}

impl StructuredLog for NodeFailed<'_> {
    fn log(&self) {
        tracing::warn!(
            node_id = self.node_id,
            error = self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "node_failed",
            span_name = name,
            node_id = self.node_id,
            error = self.error,
        )
    }
}
