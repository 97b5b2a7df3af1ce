// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The flow scheduler: reachability, ready-set dispatch, and streaming.
//!
//! A run proceeds in rounds: every vertex whose dependencies all carry an
//! execution record is dispatched (auxiliary vertices inline, custom
//! vertices as tasks bounded by a semaphore of `max_workers` permits), then
//! the scheduler awaits at least one completion and recomputes the ready
//! set. A vertex is therefore never dispatched before each of its
//! predecessors has completed and had its event emitted.

use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_stream::wrappers::ReceiverStream;

use crate::backends::local::SandboxEvaluator;
use crate::backends::timeout_failure;
use crate::backends::worker::{WorkerEvaluator, WorkerManager};
use crate::engine::assembler::{assemble_input, restructure_for_handles};
use crate::engine::events::{unix_timestamp, FlowEvent};
use crate::engine::records::{
    classify_result_nodes, result_node_record, start_node_record, text_input_record,
    ExecutionRecord, FlowRunSummary, NodeStatus,
};
use crate::errors::FlowError;
use crate::graph::{load_structure, FlowGraph, NodeKind};
use crate::observability::messages::engine::{FlowCompleted, FlowStarted, NodeFailed};
use crate::observability::messages::StructuredLog;
use crate::store::ObjectStore;
use crate::traits::{EvalRequest, NodeEvaluator};

/// Per-run options.
#[derive(Debug, Clone)]
pub struct FlowOptions {
    /// Start vertex; discovered from the graph when absent.
    pub start_node: Option<String>,
    /// Initial params bound to the start vertex when it has no in-edges.
    pub params: Option<Value>,
    /// Terminal seed values for text-input and input-class result vertices.
    pub seed_values: Option<HashMap<String, Value>>,
    pub max_workers: usize,
    pub timeout: Duration,
    pub halt_on_error: bool,
}

impl Default for FlowOptions {
    fn default() -> Self {
        Self {
            start_node: None,
            params: None,
            seed_values: None,
            max_workers: 4,
            timeout: Duration::from_secs(30),
            halt_on_error: true,
        }
    }
}

/// Everything derived from the graph before the first vertex runs.
struct RunPlan {
    project_id: String,
    project_root: PathBuf,
    start_id: String,
    graph: FlowGraph,
    execution_order: Vec<String>,
    dependencies: HashMap<String, HashSet<String>>,
    affected_nodes: Vec<String>,
    main_indices: HashMap<String, usize>,
    main_count: usize,
    input_result_nodes: Vec<String>,
    output_result_nodes: Vec<String>,
    params: Option<Value>,
    seeds: HashMap<String, Value>,
    max_workers: usize,
    timeout: Duration,
    halt_on_error: bool,
}

/// The flow executor: owns the object store and the evaluation backend.
#[derive(Clone)]
pub struct FlowExecutor {
    projects_root: PathBuf,
    store: Arc<ObjectStore>,
    evaluator: Arc<dyn NodeEvaluator>,
}

impl FlowExecutor {
    pub fn new(projects_root: impl Into<PathBuf>, evaluator: Arc<dyn NodeEvaluator>) -> Self {
        Self {
            projects_root: projects_root.into(),
            store: Arc::new(ObjectStore::new()),
            evaluator,
        }
    }

    pub fn with_store(
        projects_root: impl Into<PathBuf>,
        evaluator: Arc<dyn NodeEvaluator>,
        store: Arc<ObjectStore>,
    ) -> Self {
        Self {
            projects_root: projects_root.into(),
            store,
            evaluator,
        }
    }

    /// Executor backed by the sandbox evaluator (ephemeral interpreter per
    /// vertex).
    pub fn sandbox(projects_root: impl Into<PathBuf>) -> Self {
        let root = projects_root.into();
        let evaluator = Arc::new(SandboxEvaluator::new(root.clone()));
        Self::new(root, evaluator)
    }

    /// Executor routing custom vertices through per-project workers.
    pub fn worker_backed(projects_root: impl Into<PathBuf>) -> Self {
        let root = projects_root.into();
        let manager = Arc::new(WorkerManager::new(root.clone()));
        Self::new(root, Arc::new(WorkerEvaluator::new(manager)))
    }

    pub fn object_store(&self) -> &Arc<ObjectStore> {
        &self.store
    }

    /// Execute a flow to completion and return the aggregate record.
    ///
    /// Graph errors (no start, unknown start, cycle, unparseable structure)
    /// surface here; vertex-local failures land in the per-vertex records.
    pub async fn execute_flow(
        &self,
        project_id: &str,
        options: FlowOptions,
    ) -> Result<FlowRunSummary, FlowError> {
        let plan = self.prepare(project_id, &options)?;
        Ok(self.clone().run(plan, None).await)
    }

    /// Execute a flow, yielding progress events while the run is in flight.
    ///
    /// Graph errors surface synchronously from this call; the stream itself
    /// is infallible, finite, and non-restartable. Dropping the stream
    /// cancels further dispatch.
    pub fn execute_flow_streaming(
        &self,
        project_id: &str,
        options: FlowOptions,
    ) -> Result<ReceiverStream<FlowEvent>, FlowError> {
        let plan = self.prepare(project_id, &options)?;
        let (tx, rx) = mpsc::channel(64);
        let executor = self.clone();
        tokio::spawn(async move {
            executor.run(plan, Some(tx)).await;
        });
        Ok(ReceiverStream::new(rx))
    }

    fn prepare(&self, project_id: &str, options: &FlowOptions) -> Result<RunPlan, FlowError> {
        let graph = load_structure(&self.projects_root, project_id)?;

        let start_id = match &options.start_node {
            Some(id) => {
                if !graph.contains(id) {
                    return Err(FlowError::StartNodeNotFound {
                        node_id: id.clone(),
                    });
                }
                id.clone()
            }
            None => graph
                .find_start_node()
                .map(str::to_string)
                .ok_or_else(|| FlowError::NoStartNode {
                    project_id: project_id.to_string(),
                })?,
        };

        let reachable = graph.reachable_from(&start_id);
        let execution_order = graph.topological_order(&reachable)?;
        let dependencies = graph.dependency_map(&reachable);
        let (input_result_nodes, output_result_nodes) = classify_result_nodes(&graph, &reachable);

        let mut main_indices = HashMap::new();
        for id in &execution_order {
            if graph
                .node(id)
                .map(|n| n.is_main_component())
                .unwrap_or(false)
            {
                main_indices.insert(id.clone(), main_indices.len());
            }
        }
        let main_count = main_indices.len();

        let affected_nodes: Vec<String> = graph
            .node_order()
            .iter()
            .filter(|id| reachable.contains(*id))
            .cloned()
            .collect();

        Ok(RunPlan {
            project_id: project_id.to_string(),
            project_root: self.projects_root.join(project_id),
            start_id,
            graph,
            execution_order,
            dependencies,
            affected_nodes,
            main_indices,
            main_count,
            input_result_nodes,
            output_result_nodes,
            params: options.params.clone(),
            seeds: options.seed_values.clone().unwrap_or_default(),
            max_workers: options.max_workers.max(1),
            timeout: options.timeout,
            halt_on_error: options.halt_on_error,
        })
    }

    async fn run(self, plan: RunPlan, events: Option<mpsc::Sender<FlowEvent>>) -> FlowRunSummary {
        let started = Instant::now();

        FlowStarted {
            project_id: &plan.project_id,
            node_count: plan.execution_order.len(),
            main_count: plan.main_count,
            max_workers: plan.max_workers,
        }
        .log();

        let mut state = RunState {
            execution_results: HashMap::new(),
            node_outputs: HashMap::new(),
            result_nodes: HashMap::new(),
            skip_roots: HashMap::new(),
            done: HashSet::new(),
            completed_main: 0,
            events,
            cancelled: false,
        };

        if let Some(tx) = &state.events {
            let event = FlowEvent::Start {
                total_nodes: plan.main_count,
                execution_order: plan.execution_order.clone(),
                affected_nodes: plan.affected_nodes.clone(),
                input_result_nodes: plan.input_result_nodes.clone(),
                output_result_nodes: plan.output_result_nodes.clone(),
                timestamp: unix_timestamp(),
            };
            if tx.send(event).await.is_err() {
                state.cancelled = true;
            }
        }

        let semaphore = Arc::new(Semaphore::new(plan.max_workers));
        let mut in_flight: JoinSet<(String, ExecutionRecord)> = JoinSet::new();
        let mut running: HashSet<String> = HashSet::new();

        while !state.cancelled && state.done.len() < plan.execution_order.len() {
            let ready: Vec<String> = plan
                .execution_order
                .iter()
                .filter(|id| {
                    !state.done.contains(*id)
                        && !running.contains(*id)
                        && plan
                            .dependencies
                            .get(*id)
                            .map(|deps| deps.iter().all(|d| state.done.contains(d)))
                            .unwrap_or(true)
                })
                .cloned()
                .collect();

            if ready.is_empty() && in_flight.is_empty() {
                // The cycle check already rejected unorderable graphs, so
                // this is a scheduler invariant violation, not user error.
                tracing::warn!(
                    project_id = %plan.project_id,
                    done = state.done.len(),
                    total = plan.execution_order.len(),
                    "No ready vertices and none in flight; stopping early"
                );
                break;
            }

            for node_id in ready {
                if state.cancelled {
                    break;
                }

                if plan.halt_on_error {
                    let failed_root = plan.dependencies.get(&node_id).and_then(|deps| {
                        deps.iter().find_map(|dep| {
                            match state.execution_results.get(dep).map(|r| r.status) {
                                Some(NodeStatus::Error) => Some(dep.clone()),
                                Some(NodeStatus::Skipped) => state.skip_roots.get(dep).cloned(),
                                _ => None,
                            }
                        })
                    });
                    if let Some(root) = failed_root {
                        state.skip_roots.insert(node_id.clone(), root.clone());
                        let record = ExecutionRecord::skipped(&root);
                        state.finish_node(&plan, &node_id, record).await;
                        continue;
                    }
                }

                let Some(node) = plan.graph.node(&node_id).cloned() else {
                    let record =
                        ExecutionRecord::error(format!("Node '{node_id}' not found in graph"), "");
                    state.finish_node(&plan, &node_id, record).await;
                    continue;
                };

                if node.kind == NodeKind::Start {
                    state.finish_node(&plan, &node_id, start_node_record()).await;
                    continue;
                }

                if node.is_text_input() {
                    let record = text_input_record(plan.seeds.get(&node_id));
                    state.finish_node(&plan, &node_id, record).await;
                    continue;
                }

                let assembled = assemble_input(
                    &node_id,
                    &plan.start_id,
                    plan.params.as_ref(),
                    plan.graph.edges(),
                    &state.node_outputs,
                    &self.store,
                    &plan.project_id,
                );

                if node.kind == NodeKind::Result {
                    let record = result_node_record(
                        &self.store,
                        &plan.project_id,
                        assembled.input,
                        plan.seeds.get(&node_id),
                    );
                    state.finish_node(&plan, &node_id, record).await;
                    continue;
                }

                running.insert(node_id.clone());
                let evaluator = self.evaluator.clone();
                let store = self.store.clone();
                let semaphore = semaphore.clone();
                let project_id = plan.project_id.clone();
                let project_root = plan.project_root.clone();
                let file_name = node.artifact_name();
                let timeout = plan.timeout;
                in_flight.spawn(async move {
                    let _permit = match semaphore.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => {
                            return (
                                node_id,
                                ExecutionRecord::error("Scheduler shut down", ""),
                            )
                        }
                    };

                    let raw_input = assembled.input.unwrap_or(Value::Null);
                    let unwrapped = store.unwrap(&project_id, &raw_input);
                    let input = restructure_for_handles(unwrapped, &assembled.target_handles);

                    let request = EvalRequest {
                        project_id: project_id.clone(),
                        project_root,
                        node_id: node_id.clone(),
                        file_name,
                        input,
                        timeout,
                    };

                    let record = match tokio::time::timeout(timeout, evaluator.evaluate(request))
                        .await
                    {
                        Err(_elapsed) => {
                            let failure = timeout_failure(timeout);
                            ExecutionRecord::error(failure.error, failure.traceback)
                        }
                        Ok(Ok(success)) => {
                            let wrapped =
                                store.wrap_output(&project_id, &node_id, success.output);
                            ExecutionRecord::success(wrapped, success.elapsed_ms, success.logs)
                        }
                        Ok(Err(failure)) => ExecutionRecord::error(failure.error, failure.traceback),
                    };

                    (node_id, record)
                });
            }

            if state.cancelled || state.done.len() >= plan.execution_order.len() {
                break;
            }

            match in_flight.join_next().await {
                Some(Ok((node_id, record))) => {
                    running.remove(&node_id);
                    state.finish_node(&plan, &node_id, record).await;
                }
                Some(Err(join_error)) => {
                    tracing::error!(error = %join_error, "Vertex task failed to join");
                    break;
                }
                None => {}
            }
        }

        let total_success_ms: u64 = state
            .execution_results
            .values()
            .filter(|r| r.status == NodeStatus::Success)
            .map(|r| r.execution_time_ms)
            .sum();

        if let Some(tx) = &state.events {
            if !state.cancelled {
                let _ = tx
                    .send(FlowEvent::Complete {
                        execution_results: state.execution_results.clone(),
                        result_nodes: state.result_nodes.clone(),
                        execution_order: plan.execution_order.clone(),
                        total_execution_time_ms: started.elapsed().as_millis() as u64,
                        timestamp: unix_timestamp(),
                    })
                    .await;
            }
        }

        FlowCompleted {
            project_id: &plan.project_id,
            node_count: plan.execution_order.len(),
            duration: started.elapsed(),
        }
        .log();

        FlowRunSummary {
            success: true,
            run_id: format!(
                "{}-{}",
                chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ"),
                plan.project_id
            ),
            execution_results: state.execution_results,
            result_nodes: state.result_nodes,
            execution_order: plan.execution_order,
            total_execution_time_ms: total_success_ms,
        }
    }
}

/// Mutable state the scheduler owns for the duration of one run.
struct RunState {
    execution_results: HashMap<String, ExecutionRecord>,
    node_outputs: HashMap<String, Value>,
    result_nodes: HashMap<String, Value>,
    /// Vertex id -> root failed vertex id, propagated through skip chains.
    skip_roots: HashMap<String, String>,
    done: HashSet<String>,
    completed_main: usize,
    events: Option<mpsc::Sender<FlowEvent>>,
    cancelled: bool,
}

impl RunState {
    /// Record a vertex completion, store its output for downstream
    /// assembly, and emit its progress event.
    async fn finish_node(&mut self, plan: &RunPlan, node_id: &str, record: ExecutionRecord) {
        let node = plan.graph.node(node_id);
        let is_result = node.map(|n| n.kind == NodeKind::Result).unwrap_or(false);
        let main_index = plan.main_indices.get(node_id).copied();

        if record.status == NodeStatus::Error {
            NodeFailed {
                node_id,
                error: record.error.as_deref().unwrap_or("unknown"),
            }
            .log();
        }

        if record.status == NodeStatus::Success {
            let output = record.output.clone().unwrap_or(Value::Null);
            if is_result {
                self.result_nodes.insert(node_id.to_string(), output.clone());
            }
            self.node_outputs.insert(node_id.to_string(), output);
        }

        self.execution_results
            .insert(node_id.to_string(), record.clone());
        self.done.insert(node_id.to_string());

        if let Some(tx) = self.events.clone() {
            let node_title = node
                .map(|n| n.data.title.clone())
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| "Unknown".to_string());

            let event = if is_result {
                // Result vertices report without advancing progress.
                Some(FlowEvent::NodeComplete {
                    node_id: node_id.to_string(),
                    node_title,
                    node_index: self.completed_main,
                    total_nodes: plan.main_count,
                    result: record,
                    timestamp: unix_timestamp(),
                })
            } else {
                main_index.map(|index| FlowEvent::NodeComplete {
                    node_id: node_id.to_string(),
                    node_title,
                    node_index: index + 1,
                    total_nodes: plan.main_count,
                    result: record,
                    timestamp: unix_timestamp(),
                })
            };

            if let Some(event) = event {
                if tx.send(event).await.is_err() {
                    self.cancelled = true;
                    self.events = None;
                }
            }
        }

        if main_index.is_some() {
            self.completed_main += 1;
        }
    }
}
