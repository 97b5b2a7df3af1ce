// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod flow;
mod worker;

pub use flow::FlowError;
pub use worker::WorkerError;
