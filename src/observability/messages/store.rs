// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for object store events.

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// A vertex output was parked in the object store under a fresh reference.
///
/// # Log Level
/// `debug!` - High-volume diagnostic event
pub struct ReferenceStored<'a> {
    pub project_id: &'a str,
    pub ref_id: &'a str,
    pub data_type: &'a str,
    pub size: Option<usize>,
}

impl Display for ReferenceStored<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Stored {} as reference '{}' in project '{}'",
            self.data_type, self.ref_id, self.project_id
        )
    }
}

impl StructuredLog for ReferenceStored<'_> {
    fn log(&self) {
        tracing::debug!(
            project_id = self.project_id,
            ref_id = self.ref_id,
            data_type = self.data_type,
            size = self.size,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "reference_stored",
            span_name = name,
            project_id = self.project_id,
            ref_id = self.ref_id,
            data_type = self.data_type,
            size = self.size,
        )
    }
}
