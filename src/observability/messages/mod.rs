// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Centralized message types for structured logging and tracing.

pub mod engine;
pub mod store;
pub mod worker;

use tracing::Span;

/// Trait for messages that support structured logging and tracing.
///
/// `log()` emits the event at the level matching the message's semantics,
/// carrying both the `Display` rendering and the individual fields; `span()`
/// creates a tracing span with the same fields as attributes.
pub trait StructuredLog {
    /// Emit a log event with structured fields.
    fn log(&self);

    /// Create a span with this message's fields as attributes.
    fn span(&self, name: &str) -> Span;
}
