//! Progress events emitted while a run is in flight.
//!
//! Events are fire-and-forget notifications. The driver never waits on the callback's outcome
//! and never reads state back from it, so a caller can render, log or ignore them freely.

use cyberloop_common::tools::{ToolCall, ToolResult, ToolStatus};

use crate::metrics::MetricsSnapshot;

/// Events emitted by [`crate::Core`] during a run.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum CoreEvent {
    /// Answer text, forwarded as soon as it arrives.
    Content(String),

    /// Reasoning text from models that expose it.
    Thinking(String),

    /// A tool call changed state: once pending, then once success or error.
    ToolCall(ToolCallUpdate),

    /// Running token totals for this run. Replaces any earlier snapshot.
    Metrics(MetricsSnapshot),

    /// The driver switched models after a classified failure.
    ModelFallback {
        /// Model that failed.
        from: String,
        /// Model used from now on.
        to: String,
    },
}

/// A tool call together with its current result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallUpdate {
    pub call: ToolCall,
    pub result: ToolResult,
}

impl ToolCallUpdate {
    #[must_use]
    pub const fn status(&self) -> ToolStatus {
        self.result.status
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.call.function.name
    }

    /// Serialized result or error object, once resolved.
    #[must_use]
    pub fn payload(&self) -> Option<&str> {
        self.result.payload.as_deref()
    }
}
