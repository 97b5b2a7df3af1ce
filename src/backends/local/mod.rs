// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Sandbox evaluator: one ephemeral isolated interpreter per vertex.
//!
//! Each call spawns the project environment's interpreter in isolated mode
//! (`-u -I -s -S`) running the embedded guest runner, submits exactly one
//! `exec_node` request, and collects the single response. The runner builds
//! the restricted namespace (whitelisted builtins, the standard module set,
//! the bound `input_data` name), executes the node source, and dispatches
//! `RunScript` > `main` > first non-underscore callable with the
//! signature-aware call convention.
//!
//! Compared to the worker backend there is no process reuse: cold guest
//! startup per vertex, but also no shared state and nothing to reclaim.

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio_stream::StreamExt;
use tokio_util::codec::{FramedRead, LinesCodec};

use crate::backends::worker::protocol::{WorkerRequest, WorkerResponse};
use crate::backends::{missing_artifact_failure, timeout_failure};
use crate::project::ProjectEnvResolver;
use crate::signature::analyze_node_file;
use crate::traits::{EvalFailure, EvalRequest, EvalSuccess, NodeEvaluator};

/// Request id used on the one-shot channel; the response must echo it.
const ONESHOT_ID: &str = "1";

pub struct SandboxEvaluator {
    resolver: ProjectEnvResolver,
}

impl SandboxEvaluator {
    pub fn new(projects_root: impl Into<std::path::PathBuf>) -> Self {
        Self {
            resolver: ProjectEnvResolver::new(projects_root),
        }
    }
}

#[async_trait]
impl NodeEvaluator for SandboxEvaluator {
    async fn evaluate(&self, req: EvalRequest) -> Result<EvalSuccess, EvalFailure> {
        let file_path = req.project_root.join(&req.file_name);
        if !file_path.is_file() {
            return Err(missing_artifact_failure(&req.file_name, &file_path));
        }

        let analysis = analyze_node_file(&file_path);
        tracing::debug!(
            node_id = %req.node_id,
            mode = ?analysis.mode,
            function = analysis.function_name.as_deref().unwrap_or("<first callable>"),
            "Dispatch target for sandbox evaluation"
        );

        let env = self.resolver.resolve(&req.project_id).map_err(|e| {
            EvalFailure::new(e.to_string(), format!("Environment resolution failed: {e}"))
        })?;
        let runner = crate::backends::worker::installed_runner_path()
            .map_err(|e| EvalFailure::new(e.to_string(), format!("Runner install failed: {e}")))?;

        let mut child = Command::new(&env.interpreter)
            .args(["-u", "-I", "-s", "-S"])
            .arg(&runner)
            .current_dir(&env.working_dir)
            .env_clear()
            .envs(&env.env)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                EvalFailure::new(
                    format!("Failed to spawn sandbox interpreter: {e}"),
                    format!("spawn {}: {e}", env.interpreter.display()),
                )
            })?;

        let request = WorkerRequest::exec_node(
            ONESHOT_ID.to_string(),
            req.file_name.clone(),
            req.input,
            env.root.display().to_string(),
        );

        let exchange = tokio::time::timeout(req.timeout, async {
            let mut stdin = child.stdin.take().ok_or_else(|| {
                EvalFailure::new("Sandbox pipe unavailable", "stdin not captured")
            })?;
            let stdout = child.stdout.take().ok_or_else(|| {
                EvalFailure::new("Sandbox pipe unavailable", "stdout not captured")
            })?;

            let line = request.to_line().map_err(|e| {
                EvalFailure::new(format!("Request encoding failed: {e}"), e.to_string())
            })?;
            let mut payload = line.into_bytes();
            payload.push(b'\n');
            stdin
                .write_all(&payload)
                .await
                .map_err(|e| EvalFailure::new(format!("Sandbox pipe broken: {e}"), e.to_string()))?;
            // Closing stdin lets the runner exit on its own after answering.
            drop(stdin);

            let mut lines = FramedRead::new(stdout, LinesCodec::new());
            while let Some(item) = lines.next().await {
                let Ok(text) = item else { break };
                if let Some(response) = WorkerResponse::parse_line(&text) {
                    if response.id.as_deref() == Some(ONESHOT_ID) {
                        return Ok(response);
                    }
                }
            }
            Err(EvalFailure::new(
                "Sandbox evaluator produced no response",
                "guest runner exited without answering",
            ))
        })
        .await;

        let response = match exchange {
            Err(_elapsed) => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                return Err(timeout_failure(req.timeout));
            }
            Ok(result) => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                result?
            }
        };

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
        "sandbox"
    }
}
