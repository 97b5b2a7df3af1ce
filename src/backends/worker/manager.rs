// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use parking_lot::Mutex as PendingLock;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{oneshot, Mutex};
use tokio_stream::StreamExt;
use tokio_util::codec::{FramedRead, LinesCodec};

use crate::backends::worker::protocol::{WorkerRequest, WorkerResponse};
use crate::errors::WorkerError;
use crate::observability::messages::worker::{WorkerExecRetried, WorkerRestarted, WorkerSpawned};
use crate::observability::messages::StructuredLog;
use crate::project::ProjectEnvResolver;

/// The guest runner shipped with the engine and materialized on disk at
/// first spawn.
pub const RUNNER_SOURCE: &str = include_str!("runner.py");

/// How long a worker gets to exit after its stdin closes before it is
/// killed outright.
#[cfg(not(test))]
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);
#[cfg(test)]
const SHUTDOWN_GRACE: Duration = Duration::from_millis(200);

type PendingMap = Arc<PendingLock<HashMap<String, oneshot::Sender<WorkerResponse>>>>;

struct WorkerHandle {
    child: Child,
    stdin: Option<ChildStdin>,
    pending: PendingMap,
}

/// Supervises exactly one long-lived worker process per project.
///
/// Workers are spawned on demand with the project environment's interpreter
/// and working directory, live across requests (guest imports stay warm),
/// and are torn down on timeout or broken pipe. A request that loses its
/// worker is retried at most once against a fresh one.
pub struct WorkerManager {
    resolver: ProjectEnvResolver,
    workers: Mutex<HashMap<String, WorkerHandle>>,
}

impl WorkerManager {
    pub fn new(projects_root: impl Into<PathBuf>) -> Self {
        Self {
            resolver: ProjectEnvResolver::new(projects_root),
            workers: Mutex::new(HashMap::new()),
        }
    }

    /// Ensure a live worker exists for the project.
    pub async fn start(&self, project_id: &str) -> Result<(), WorkerError> {
        let mut workers = self.workers.lock().await;
        self.ensure(&mut workers, project_id).await.map(|_| ())
    }

    /// Execute one node on the project's worker.
    ///
    /// On timeout or a broken pipe the worker is torn down and the request
    /// retried once against a fresh worker. A worker that is alive but hung
    /// surfaces as [`WorkerError::Timeout`]; one that keeps dying underneath
    /// its requests as [`WorkerError::WorkerExited`].
    pub async fn exec(
        &self,
        project_id: &str,
        file_name: &str,
        input: Value,
        timeout: Duration,
    ) -> Result<WorkerResponse, WorkerError> {
        let project_root = self.resolver.project_path(project_id);
        let mut worker_exited = false;

        for attempt in 0..2 {
            if attempt > 0 {
                WorkerExecRetried {
                    project_id,
                    file: file_name,
                }
                .log();
            }

            let msg_id = uuid::Uuid::new_v4().to_string();
            let request = WorkerRequest::exec_node(
                msg_id.clone(),
                file_name.to_string(),
                input.clone(),
                project_root.display().to_string(),
            );

            let line = request.to_line().map_err(|e| WorkerError::BrokenPipe {
                project_id: format!("{project_id} (encode: {e})"),
            })?;

            // Register the completion slot and write the request while
            // holding the supervisor lock, then await without it.
            let (rx, pending) = {
                let mut workers = self.workers.lock().await;
                let handle = self.ensure(&mut workers, project_id).await?;

                let (tx, rx) = oneshot::channel();
                handle.pending.lock().insert(msg_id.clone(), tx);
                let pending = handle.pending.clone();

                let written = match handle.stdin.as_mut() {
                    Some(stdin) => {
                        let mut payload = line.into_bytes();
                        payload.push(b'\n');
                        stdin.write_all(&payload).await.and(stdin.flush().await)
                    }
                    None => Err(std::io::Error::from(std::io::ErrorKind::BrokenPipe)),
                };
                if written.is_err() {
                    pending.lock().remove(&msg_id);
                    drop(workers);
                    // A dead pipe means the process is gone, not hung.
                    worker_exited = true;
                    self.restart_with_reason(project_id, "broken pipe").await;
                    continue;
                }
                (rx, pending)
            };

            match tokio::time::timeout(timeout, rx).await {
                Ok(Ok(response)) => {
                    if response.error.as_deref() == Some("worker-exit") && response.id.is_none() {
                        worker_exited = true;
                        self.restart_with_reason(project_id, "worker exited").await;
                        continue;
                    }
                    return Ok(response);
                }
                Ok(Err(_closed)) => {
                    worker_exited = true;
                    self.restart_with_reason(project_id, "worker exited").await;
                    continue;
                }
                Err(_elapsed) => {
                    worker_exited = false;
                    pending.lock().remove(&msg_id);
                    self.restart_with_reason(project_id, "request timeout").await;
                    continue;
                }
            }
        }

        if worker_exited {
            return Err(WorkerError::WorkerExited {
                project_id: project_id.to_string(),
            });
        }
        Err(WorkerError::Timeout {
            seconds: timeout.as_secs(),
        })
    }

    /// Tear down the project's worker; the next request respawns it.
    pub async fn restart(&self, project_id: &str) {
        self.restart_with_reason(project_id, "explicit restart").await;
    }

    /// Tear down every live worker.
    pub async fn stop_all(&self) {
        let drained: Vec<(String, WorkerHandle)> =
            self.workers.lock().await.drain().collect();
        for (project_id, handle) in drained {
            Self::shutdown(handle, &project_id, "stop_all").await;
        }
    }

    async fn restart_with_reason(&self, project_id: &str, reason: &str) {
        let handle = self.workers.lock().await.remove(project_id);
        if let Some(handle) = handle {
            Self::shutdown(handle, project_id, reason).await;
        }
    }

    async fn ensure<'a>(
        &self,
        workers: &'a mut HashMap<String, WorkerHandle>,
        project_id: &str,
    ) -> Result<&'a mut WorkerHandle, WorkerError> {
        let alive = workers
            .get_mut(project_id)
            .map(|h| matches!(h.child.try_wait(), Ok(None)))
            .unwrap_or(false);

        if !alive {
            if let Some(stale) = workers.remove(project_id) {
                Self::shutdown(stale, project_id, "stale worker").await;
            }
            let handle = self.spawn(project_id)?;
            workers.insert(project_id.to_string(), handle);
        }

        Ok(workers
            .get_mut(project_id)
            .expect("worker inserted just above"))
    }

    fn spawn(&self, project_id: &str) -> Result<WorkerHandle, WorkerError> {
        let env = self
            .resolver
            .resolve(project_id)
            .map_err(|e| WorkerError::SpawnFailed {
                project_id: project_id.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, e.to_string()),
            })?;
        let runner = installed_runner_path()?;

        let mut child = Command::new(&env.interpreter)
            .args(["-u", "-I", "-s", "-S"])
            .arg(&runner)
            .current_dir(&env.working_dir)
            .env_clear()
            .envs(&env.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| WorkerError::SpawnFailed {
                project_id: project_id.to_string(),
                source,
            })?;

        WorkerSpawned {
            project_id,
            pid: child.id(),
        }
        .log();

        let stdin = child.stdin.take();
        let stdout = child.stdout.take().ok_or_else(|| WorkerError::SpawnFailed {
            project_id: project_id.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::BrokenPipe, "stdout not captured"),
        })?;

        let pending: PendingMap = Arc::new(PendingLock::new(HashMap::new()));
        let reader_pending = pending.clone();
        tokio::spawn(async move {
            let mut lines = FramedRead::new(stdout, LinesCodec::new());
            while let Some(item) = lines.next().await {
                let Ok(line) = item else { break };
                let Some(response) = WorkerResponse::parse_line(&line) else {
                    continue;
                };
                let Some(id) = response.id.clone() else { continue };
                let slot = reader_pending.lock().remove(&id);
                if let Some(tx) = slot {
                    let _ = tx.send(response);
                }
            }
            // Worker is gone: unblock every waiter.
            let drained: Vec<_> = reader_pending.lock().drain().collect();
            for (_, tx) in drained {
                let _ = tx.send(WorkerResponse::worker_exit());
            }
        });

        Ok(WorkerHandle {
            child,
            stdin,
            pending,
        })
    }

    async fn shutdown(mut handle: WorkerHandle, project_id: &str, reason: &str) {
        WorkerRestarted { project_id, reason }.log();

        // Closing stdin lets the runner's serve loop exit on its own; only
        // kill when the grace period runs out.
        drop(handle.stdin.take());
        if tokio::time::timeout(SHUTDOWN_GRACE, handle.child.wait())
            .await
            .is_err()
        {
            let _ = handle.child.start_kill();
            let _ = handle.child.wait().await;
        }

        let drained: Vec<_> = handle.pending.lock().drain().collect();
        for (_, tx) in drained {
            let _ = tx.send(WorkerResponse::worker_exit());
        }
    }
}

pub(crate) fn installed_runner_path() -> Result<PathBuf, WorkerError> {
    let path = std::env::temp_dir().join("flowrunner-runner.py");
    let current = std::fs::read_to_string(&path).ok();
    if current.as_deref() != Some(RUNNER_SOURCE) {
        std::fs::write(&path, RUNNER_SOURCE).map_err(WorkerError::RunnerInstall)?;
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use std::path::Path;

    /// Install a shell script as the project's "interpreter". The manager
    /// passes isolated-mode flags plus the runner path, which the script
    /// ignores; it just speaks the protocol on stdin/stdout.
    fn fake_interpreter(project: &Path, body: &str) {
        let bin = project.join(".venv").join("bin");
        fs::create_dir_all(&bin).unwrap();
        let path = bin.join("python");
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        }
    }

    fn project_fixture(body: &str) -> (tempfile::TempDir, String) {
        let root = tempfile::tempdir().unwrap();
        let project = root.path().join("demo");
        fs::create_dir_all(&project).unwrap();
        fake_interpreter(&project, body);
        (root, "demo".to_string())
    }

    /// Echoes a canned success for every request, extracting the id with
    /// POSIX parameter expansion (the id is the first field on the line).
    const ECHO_WORKER: &str = r#"
while read line; do
  id="${line#*\"id\":\"}"
  id="${id%%\"*}"
  printf '{"id":"%s","ok":true,"output":{"echoed":true},"time_ms":2,"logs":"hello from guest\\n"}\n' "$id"
done
"#;

    /// Records each spawn, then stalls without ever answering.
    const STALLING_WORKER: &str = r#"
echo spawned >> spawns.txt
while read line; do
  sleep 60
done
"#;

    /// Reads the request, then exits without answering.
    const DYING_WORKER: &str = r#"
read line
exit 0
"#;

    #[tokio::test]
    async fn test_exec_round_trip() {
        let (root, project_id) = project_fixture(ECHO_WORKER);
        let manager = WorkerManager::new(root.path());

        let response = manager
            .exec(
                &project_id,
                "1_Node.py",
                json!({"x": 1}),
                Duration::from_secs(5),
            )
            .await
            .unwrap();

        assert!(response.ok);
        assert_eq!(response.output, Some(json!({"echoed": true})));
        assert_eq!(response.logs.as_deref(), Some("hello from guest\n"));
        manager.stop_all().await;
    }

    #[tokio::test]
    async fn test_worker_survives_across_requests() {
        let (root, project_id) = project_fixture(ECHO_WORKER);
        let manager = WorkerManager::new(root.path());

        for _ in 0..3 {
            let response = manager
                .exec(&project_id, "n.py", json!(null), Duration::from_secs(5))
                .await
                .unwrap();
            assert!(response.ok);
        }
        manager.stop_all().await;
    }

    #[tokio::test]
    async fn test_timeout_restarts_and_retries_once() {
        let (root, project_id) = project_fixture(STALLING_WORKER);
        let manager = WorkerManager::new(root.path());

        let err = manager
            .exec(
                &project_id,
                "n.py",
                json!(null),
                Duration::from_millis(300),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::Timeout { .. }));

        manager.stop_all().await;
        // One spawn per attempt: the original plus exactly one retry.
        let spawns =
            fs::read_to_string(root.path().join("demo").join("spawns.txt")).unwrap_or_default();
        assert_eq!(spawns.lines().count(), 2);
    }

    #[tokio::test]
    async fn test_repeated_worker_exit_surfaces_as_worker_exited() {
        let (root, project_id) = project_fixture(DYING_WORKER);
        let manager = WorkerManager::new(root.path());

        let err = manager
            .exec(&project_id, "n.py", json!(null), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::WorkerExited { .. }));
    }

    #[tokio::test]
    async fn test_stop_all_reclaims_workers() {
        let (root, project_id) = project_fixture(ECHO_WORKER);
        let manager = WorkerManager::new(root.path());
        manager.start(&project_id).await.unwrap();
        manager.stop_all().await;
        assert!(manager.workers.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_spawn_failure_for_missing_project() {
        let root = tempfile::tempdir().unwrap();
        let manager = WorkerManager::new(root.path());
        let err = manager
            .exec("ghost", "n.py", json!(null), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::SpawnFailed { .. }));
    }
}
