// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Wire types for the worker JSON-lines protocol.
//!
//! One message per line, UTF-8. The runner answers unknown operations with
//! `{ok: false, error: "Unknown op: …"}` and unparseable lines with
//! `{id: null, ok: false, error: "Invalid message: …"}`; anything on the
//! channel that does not parse as a response (guest chatter) is skipped by
//! the reader.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const OP_EXEC_NODE: &str = "exec_node";

/// A request to the guest runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRequest {
    pub id: String,
    pub op: String,
    pub file: String,
    pub input: Value,
    pub project_root: String,
}

impl WorkerRequest {
    pub fn exec_node(id: String, file: String, input: Value, project_root: String) -> Self {
        Self {
            id,
            op: OP_EXEC_NODE.to_string(),
            file,
            input,
            project_root,
        }
    }

    /// Serialize to one protocol line (no trailing newline).
    pub fn to_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// A response from the guest runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerResponse {
    #[serde(default)]
    pub id: Option<String>,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traceback: Option<String>,
    /// Captured guest output; absent from older runners.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs: Option<String>,
}

impl WorkerResponse {
    /// Synthetic response used to unblock waiters when the worker dies.
    pub fn worker_exit() -> Self {
        Self {
            id: None,
            ok: false,
            output: None,
            time_ms: None,
            error: Some("worker-exit".to_string()),
            traceback: None,
            logs: None,
        }
    }

    /// Parse one line from the channel; `None` for guest chatter.
    pub fn parse_line(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        serde_json::from_str(line).ok()
    }
}
