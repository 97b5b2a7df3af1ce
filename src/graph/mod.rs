// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Persisted graph structure: node/edge wire types, loading, and traversal.
//!
//! A project's graph lives in `structure.json` at the project root as
//! `{nodes: [...], edges: [...]}`. Nodes are normalized into a map keyed by
//! id (insertion order retained for deterministic tie-breaking), edges stay
//! an ordered list because assembly semantics depend on edge order.

mod model;
mod store;
mod traversal;

pub use model::{Edge, EdgeData, FlowGraph, Node, NodeData, NodeKind};
pub use store::load_structure;
