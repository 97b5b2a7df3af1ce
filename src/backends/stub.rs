// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Stub evaluator implementations for testing the scheduler and streaming
//! runner without spawning guest processes.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

use crate::traits::{EvalFailure, EvalRequest, EvalSuccess, NodeEvaluator};

type StubFn = Box<dyn Fn(&Value) -> Result<Value, String> + Send + Sync>;

/// Scripted per-node evaluator.
///
/// Each node id maps to a closure receiving the assembled input and
/// returning either an output value or an error message. Unscripted nodes
/// echo their input. Inputs are recorded for assertion.
#[derive(Default)]
pub struct ScriptedEvaluator {
    handlers: HashMap<String, StubFn>,
    delays: HashMap<String, Duration>,
    seen_inputs: Mutex<Vec<(String, Value)>>,
}

impl ScriptedEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(mut self, node_id: &str, handler: F) -> Self
    where
        F: Fn(&Value) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.handlers.insert(node_id.to_string(), Box::new(handler));
        self
    }

    /// Make a node fail with a fixed message.
    pub fn failing(self, node_id: &str, message: &str) -> Self {
        let message = message.to_string();
        self.on(node_id, move |_| Err(message.clone()))
    }

    /// Delay a node's completion, for exercising concurrency and timeouts.
    pub fn with_delay(mut self, node_id: &str, delay: Duration) -> Self {
        self.delays.insert(node_id.to_string(), delay);
        self
    }

    /// Inputs seen so far, in completion order.
    pub fn seen_inputs(&self) -> Vec<(String, Value)> {
        self.seen_inputs.lock().clone()
    }

    /// The input a given node was evaluated with, if it ran.
    pub fn input_for(&self, node_id: &str) -> Option<Value> {
        self.seen_inputs
            .lock()
            .iter()
            .find(|(id, _)| id == node_id)
            .map(|(_, v)| v.clone())
    }
}

#[async_trait]
impl NodeEvaluator for ScriptedEvaluator {
    async fn evaluate(&self, req: EvalRequest) -> Result<EvalSuccess, EvalFailure> {
        if let Some(delay) = self.delays.get(&req.node_id) {
            tokio::time::sleep(*delay).await;
        }
        self.seen_inputs
            .lock()
            .push((req.node_id.clone(), req.input.clone()));
        let result = match self.handlers.get(&req.node_id) {
            Some(handler) => handler(&req.input),
            None => Ok(req.input.clone()),
        };
        match result {
            Ok(output) => Ok(EvalSuccess {
                output,
                elapsed_ms: 1,
                logs: String::new(),
            }),
            Err(error) => Err(EvalFailure::new(
                error.clone(),
                format!("Traceback (stub): {error}"),
            )),
        }
    }

    fn name(&self) -> &'static str {
        "scripted_stub"
    }
}

/// An evaluator that never completes, for timeout tests.
pub struct HangingEvaluator;

#[async_trait]
impl NodeEvaluator for HangingEvaluator {
    async fn evaluate(&self, _req: EvalRequest) -> Result<EvalSuccess, EvalFailure> {
        std::future::pending::<()>().await;
        unreachable!()
    }

    fn name(&self) -> &'static str {
        "hanging_stub"
    }
}
