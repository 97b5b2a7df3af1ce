// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use thiserror::Error;

/// Errors raised by the per-project worker process manager.
///
/// The manager retries a failed request exactly once against a freshly
/// spawned worker; only a persistent failure escapes as one of these.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// Spawning the worker process failed.
    #[error("Failed to spawn worker for project '{project_id}'")]
    SpawnFailed {
        project_id: String,
        #[source]
        source: std::io::Error,
    },

    /// Writing a request to the worker's stdin failed.
    #[error("Worker pipe broken for project '{project_id}'")]
    BrokenPipe { project_id: String },

    /// The worker did not answer within the request timeout, even after one
    /// retry against a fresh worker.
    #[error("Worker execution timed out after retry ({seconds}s per attempt)")]
    Timeout { seconds: u64 },

    /// The worker process exited while requests were pending.
    #[error("Worker for project '{project_id}' exited unexpectedly")]
    WorkerExited { project_id: String },

    /// Materializing the guest runner script on disk failed.
    #[error("Failed to install worker runner script")]
    RunnerInstall(#[source] std::io::Error),
}
