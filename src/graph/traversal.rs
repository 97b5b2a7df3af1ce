// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Reachability and topological ordering over a loaded graph.
//!
//! The execution slice for a run is the *bidirectional* closure from the
//! start vertex: downstream descendants plus upstream ancestors whose
//! outputs feed any reachable vertex. The upstream half is intentional —
//! constant-bearing input vertices (text inputs, seeded result vertices)
//! must execute even when the start vertex does not dominate them.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::errors::FlowError;
use crate::graph::FlowGraph;

impl FlowGraph {
    /// Compute the reachable subgraph from `start_id`.
    ///
    /// Breadth-first over the undirected edge graph: following an edge
    /// forward pulls in consumers, following it backward pulls in producers
    /// of inputs to anything already reachable.
    pub fn reachable_from(&self, start_id: &str) -> HashSet<String> {
        let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
        let mut reverse: HashMap<&str, Vec<&str>> = HashMap::new();
        for edge in self.edges() {
            adjacency
                .entry(edge.source.as_str())
                .or_default()
                .push(edge.target.as_str());
            reverse
                .entry(edge.target.as_str())
                .or_default()
                .push(edge.source.as_str());
        }

        let mut reachable = HashSet::new();
        let mut queue = VecDeque::from([start_id]);
        while let Some(current) = queue.pop_front() {
            if !reachable.insert(current.to_string()) {
                continue;
            }
            if let Some(targets) = adjacency.get(current) {
                for &target in targets {
                    if !reachable.contains(target) {
                        queue.push_back(target);
                    }
                }
            }
            if let Some(sources) = reverse.get(current) {
                for &source in sources {
                    if !reachable.contains(source) {
                        queue.push_back(source);
                    }
                }
            }
        }
        reachable
    }

    /// Map each reachable vertex to the set of reachable vertices it depends
    /// on (distinct sources of its in-edges).
    pub fn dependency_map(&self, reachable: &HashSet<String>) -> HashMap<String, HashSet<String>> {
        let mut dependencies: HashMap<String, HashSet<String>> = HashMap::new();
        for id in reachable {
            dependencies.insert(id.clone(), HashSet::new());
        }
        for edge in self.edges() {
            if reachable.contains(&edge.source) && reachable.contains(&edge.target) {
                dependencies
                    .entry(edge.target.clone())
                    .or_default()
                    .insert(edge.source.clone());
            }
        }
        dependencies
    }

    /// Topological order of the reachable subgraph (Kahn's algorithm).
    ///
    /// Ties within a level are broken by the structure file's node order.
    /// A cycle leaves some vertices unordered and aborts the run.
    pub fn topological_order(
        &self,
        reachable: &HashSet<String>,
    ) -> Result<Vec<String>, FlowError> {
        let dependencies = self.dependency_map(reachable);
        let mut remaining: HashMap<&str, usize> = dependencies
            .iter()
            .map(|(id, deps)| (id.as_str(), deps.len()))
            .collect();

        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
        for (target, sources) in &dependencies {
            for source in sources {
                dependents
                    .entry(source.as_str())
                    .or_default()
                    .push(target.as_str());
            }
        }

        let mut ordered = Vec::with_capacity(reachable.len());
        let mut emitted: HashSet<&str> = HashSet::new();
        loop {
            // Scanning the file order each round keeps ties deterministic.
            let ready: Vec<&str> = self
                .node_order()
                .iter()
                .map(|s| s.as_str())
                .filter(|id| {
                    reachable.contains(*id)
                        && !emitted.contains(id)
                        && remaining.get(id).copied().unwrap_or(0) == 0
                })
                .collect();
            if ready.is_empty() {
                break;
            }
            for id in ready {
                emitted.insert(id);
                ordered.push(id.to_string());
                if let Some(targets) = dependents.get(id) {
                    for target in targets {
                        if let Some(count) = remaining.get_mut(target) {
                            *count = count.saturating_sub(1);
                        }
                    }
                }
            }
        }

        if ordered.len() != reachable.len() {
            return Err(FlowError::CycleDetected {
                unresolved: reachable.len() - ordered.len(),
                total: reachable.len(),
            });
        }
        Ok(ordered)
    }
}
