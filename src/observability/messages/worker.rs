// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for worker process lifecycle and RPC events.

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// A per-project worker process was spawned.
///
/// # Log Level
/// `info!` - Important operational event
pub struct WorkerSpawned<'a> {
    pub project_id: &'a str,
    pub pid: Option<u32>,
}

impl Display for WorkerSpawned<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self.pid {
            Some(pid) => write!(f, "Spawned worker for project '{}' (pid {})", self.project_id, pid),
            None => write!(f, "Spawned worker for project '{}'", self.project_id),
        }
    }
}

impl StructuredLog for WorkerSpawned<'_> {
    fn log(&self) {
        tracing::info!(
            project_id = self.project_id,
            pid = self.pid,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "worker_spawned",
            span_name = name,
            project_id = self.project_id,
            pid = self.pid,
        )
    }
}

/// A worker was shut down and removed, typically after a timeout or a broken
/// pipe; the next request will respawn it.
///
/// # Log Level
/// `warn!` - Recoverable operational event
pub struct WorkerRestarted<'a> {
    pub project_id: &'a str,
    pub reason: &'a str,
}

impl Display for WorkerRestarted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Worker for project '{}' torn down ({})",
            self.project_id, self.reason
        )
    }
}

impl StructuredLog for WorkerRestarted<'_> {
    fn log(&self) {
        tracing::warn!(
            project_id = self.project_id,
            reason = self.reason,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "worker_restarted",
            span_name = name,
            project_id = self.project_id,
            reason = self.reason,
        )
    }
}

/// A request is being retried against a freshly spawned worker.
///
/// # Log Level
/// `warn!` - Recoverable operational event
pub struct WorkerExecRetried<'a> {
    pub project_id: &'a str,
    pub file: &'a str,
}

impl Display for WorkerExecRetried<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Retrying '{}' on a fresh worker for project '{}'",
            self.file, self.project_id
        )
    }
}

impl StructuredLog for WorkerExecRetried<'_> {
    fn log(&self) {
        tracing::warn!(
            project_id = self.project_id,
            file = self.file,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "worker_exec_retried",
            span_name = name,
            project_id = self.project_id,
            file = self.file,
        )
    }
}
