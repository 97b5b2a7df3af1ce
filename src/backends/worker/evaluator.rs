// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::backends::missing_artifact_failure;
use crate::backends::worker::WorkerManager;
use crate::traits::{EvalFailure, EvalRequest, EvalSuccess, NodeEvaluator};

/// Evaluator that routes vertex execution through the project's long-lived
/// worker process.
///
/// Heavier executions benefit from warm guest imports and the project's own
/// interpreter; the manager handles restart-and-retry on a hung or dead
/// worker, so a persistent failure arrives here as a single error.
pub struct WorkerEvaluator {
    manager: Arc<WorkerManager>,
}

impl WorkerEvaluator {
    pub fn new(manager: Arc<WorkerManager>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &Arc<WorkerManager> {
        &self.manager
    }
}

#[async_trait]
impl NodeEvaluator for WorkerEvaluator {
    async fn evaluate(&self, req: EvalRequest) -> Result<EvalSuccess, EvalFailure> {
        let file_path = req.project_root.join(&req.file_name);
        if !file_path.is_file() {
            return Err(missing_artifact_failure(&req.file_name, &file_path));
        }

        let response = self
            .manager
            .exec(&req.project_id, &req.file_name, req.input, req.timeout)
            .await
            .map_err(|err| EvalFailure::new(err.to_string(), format!("Worker failure: {err}")))?;

        if response.ok {
            Ok(EvalSuccess {
                output: response.output.unwrap_or(Value::Null),
                elapsed_ms: response.time_ms.unwrap_or(0),
                logs: response.logs.unwrap_or_default(),
            })
        } else {
            Err(EvalFailure::new(
                response
                    .error
                    .unwrap_or_else(|| "Node execution failed".to_string()),
                response.traceback.unwrap_or_default(),
            ))
        }
    }

    fn name(&self) -> &'static str {
        "worker"
    }
}
