// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Flow scheduler and streaming runner.
//!
//! The scheduler owns a run's state (`execution_results`, `node_outputs`,
//! `result_nodes`): it computes the reachable slice, dispatches ready
//! vertices with bounded concurrency, assembles inputs along handle edges,
//! and classifies terminal vertices. The streaming variant emits
//! `start` / `node_complete` / `complete` events while the run is in flight.

pub mod assembler;
pub mod events;
pub mod records;
pub mod scheduler;


pub use events::FlowEvent;
pub use records::{DisplayMetadata, ExecutionRecord, FlowRunSummary, NodeStatus};
pub use scheduler::{FlowExecutor, FlowOptions};
