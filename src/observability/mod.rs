// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Observability module for structured logging and tracing.
//!
//! Centralized message types for diagnostic and operational logging. Each
//! message is a plain struct implementing `Display` (human-readable line)
//! and [`messages::StructuredLog`] (machine-readable fields + span
//! creation), which keeps magic strings out of the engine and worker code.
//!
//! Messages are organized by subsystem:
//! * `messages::engine` - flow scheduler lifecycle events
//! * `messages::worker` - worker process lifecycle and RPC events
//! * `messages::store` - object store reference allocation

pub mod messages;
