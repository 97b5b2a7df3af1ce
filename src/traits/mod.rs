// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod evaluator;

pub use evaluator::{EvalFailure, EvalRequest, EvalSuccess, NodeEvaluator};
