// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;

/// Everything an evaluator needs to run one custom vertex.
///
/// The input has already been assembled, unwrapped, and restructured by the
/// scheduler; the output is raw and will be wrapped by the object store on
/// the way back.
#[derive(Debug, Clone)]
pub struct EvalRequest {
    pub project_id: String,
    pub project_root: PathBuf,
    pub node_id: String,
    /// Source artifact name relative to the project root.
    pub file_name: String,
    pub input: Value,
    pub timeout: Duration,
}

/// A successful vertex evaluation.
#[derive(Debug, Clone)]
pub struct EvalSuccess {
    pub output: Value,
    pub elapsed_ms: u64,
    /// Captured guest output (`print` and friends).
    pub logs: String,
}

/// A failed vertex evaluation.
///
/// Always vertex-local: the scheduler records it on the vertex and the run
/// continues (or skips descendants under the halt policy).
#[derive(Debug, Clone)]
pub struct EvalFailure {
    pub error: String,
    /// Captured guest traceback, or an engine-side diagnostic.
    pub traceback: String,
}

impl EvalFailure {
    pub fn new(error: impl Into<String>, traceback: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            traceback: traceback.into(),
        }
    }
}

impl std::fmt::Display for EvalFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.error)
    }
}

/// The seam between the scheduler and whatever runs node code.
///
/// Production implementations are the sandbox evaluator (ephemeral isolated
/// interpreter per call) and the worker-backed evaluator (long-lived
/// per-project worker process); tests use the stub backends.
#[async_trait]
pub trait NodeEvaluator: Send + Sync {
    async fn evaluate(&self, req: EvalRequest) -> Result<EvalSuccess, EvalFailure>;

    fn name(&self) -> &'static str;
}
