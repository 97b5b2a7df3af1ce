// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Static signature analysis of node source artifacts.
//!
//! Extracts input/output metadata from a node's source without executing
//! it: the declared parameters (names, printable annotations, default
//! literals) of the dispatch target, and the output keys visible in its
//! return statements. Editors use this to render node ports; the sandbox
//! evaluator uses the mode to log what it is about to dispatch.

mod analyzer;

pub use analyzer::{
    analyze_node_file, analyze_source, NodeSignature, OutputInfo, ParamInfo, SignatureMode,
};
