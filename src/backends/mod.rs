// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Node evaluation backends.
//!
//! Both production backends drive the same embedded guest runner over the
//! same JSON-lines protocol; they differ in process lifecycle:
//!
//! * `local` - sandbox evaluator, one ephemeral isolated interpreter per call
//! * `worker` - one long-lived worker process per project with RPC demux
//! * `stub` - scripted evaluators for executor tests

pub mod local;
pub mod stub;
pub mod worker;

use std::path::Path;
use std::time::Duration;

use crate::traits::EvalFailure;

/// Vertex failure for a missing node artifact; the path travels in the
/// captured traceback.
pub(crate) fn missing_artifact_failure(file_name: &str, path: &Path) -> EvalFailure {
    EvalFailure::new(
        format!("Node file '{file_name}' not found"),
        format!("FileNotFoundError: node file not found: {}", path.display()),
    )
}

/// Canonical vertex timeout failure.
pub(crate) fn timeout_failure(timeout: Duration) -> EvalFailure {
    let message = format!("Execution timed out after {}s", timeout.as_secs());
    EvalFailure::new(message.clone(), message)
}
