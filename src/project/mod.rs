// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Project environment resolution.
//!
//! Maps a project id to the concrete execution environment its node code
//! runs in: the interpreter (the project's own virtual environment when one
//! exists), a sanitized environment variable set, and the working
//! directory. Guest-side overrides (`PYTHONPATH`, `PYTHONHOME`) never make
//! it into the set; workers are spawned with a cleared environment so the
//! set here is exhaustive.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::errors::FlowError;

/// Variables forwarded from the engine's own environment when present.
const PASSTHROUGH_VARS: [&str; 4] = ["HOME", "USER", "TMPDIR", "FLOWRUNNER_AUX_PATH"];

/// A resolved project execution environment.
#[derive(Debug, Clone)]
pub struct ProjectEnv {
    pub project_id: String,
    pub root: PathBuf,
    pub interpreter: PathBuf,
    pub env: HashMap<String, String>,
    pub working_dir: PathBuf,
}

/// Resolves project ids against a projects root directory.
#[derive(Debug, Clone)]
pub struct ProjectEnvResolver {
    projects_root: PathBuf,
}

impl ProjectEnvResolver {
    pub fn new(projects_root: impl Into<PathBuf>) -> Self {
        Self {
            projects_root: projects_root.into(),
        }
    }

    pub fn projects_root(&self) -> &Path {
        &self.projects_root
    }

    pub fn project_path(&self, project_id: &str) -> PathBuf {
        self.projects_root.join(project_id)
    }

    /// Resolve a project's execution environment.
    ///
    /// Prefers the project-local virtual environment's interpreter, falling
    /// back to `python3` on the engine's `PATH`.
    pub fn resolve(&self, project_id: &str) -> Result<ProjectEnv, FlowError> {
        let root = self.project_path(project_id);
        if !root.is_dir() {
            return Err(FlowError::ProjectNotFound {
                project_id: project_id.to_string(),
            });
        }

        let venv = root.join(".venv");
        let venv_python = if cfg!(windows) {
            venv.join("Scripts").join("python.exe")
        } else {
            venv.join("bin").join("python")
        };

        let mut env = HashMap::new();
        let base_path = std::env::var("PATH").unwrap_or_default();
        let interpreter = if venv_python.is_file() {
            let bin_dir = venv_python.parent().unwrap_or(&venv).display().to_string();
            let separator = if cfg!(windows) { ';' } else { ':' };
            env.insert("PATH".to_string(), format!("{bin_dir}{separator}{base_path}"));
            env.insert("VIRTUAL_ENV".to_string(), venv.display().to_string());
            venv_python
        } else {
            env.insert("PATH".to_string(), base_path);
            PathBuf::from("python3")
        };

        // Keep user-site packages out of node environments.
        env.insert("PYTHONNOUSERSITE".to_string(), "1".to_string());
        env.insert(
            "WORKER_PROJECT_PATH".to_string(),
            root.display().to_string(),
        );
        for key in PASSTHROUGH_VARS {
            if let Ok(value) = std::env::var(key) {
                env.insert(key.to_string(), value);
            }
        }

        Ok(ProjectEnv {
            project_id: project_id.to_string(),
            working_dir: root.clone(),
            interpreter,
            env,
            root,
        })
    }
}
