//! Token and tool-call accounting for a run.
//!
//! The driver only reports [`MetricsSnapshot`]s through [`CoreEvent::Metrics`]. Callers that
//! want a live view keep a [`Metrics`] and feed it every event.

use std::time::{Duration, Instant};

use cyberloop_common::client::Usage;
use cyberloop_common::tools::ToolStatus;

use crate::events::CoreEvent;

/// Running totals reported by the driver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Prompt tokens summed over every completion request so far.
    pub input_tokens: u64,
    /// Completion tokens summed over every completion request so far.
    pub output_tokens: u64,
    /// Reasoning tokens, a subset of `output_tokens`.
    pub thinking_tokens: u64,
    /// Tool calls requested by the response currently streaming.
    pub tool_calls: usize,
    /// Time since the run started.
    pub elapsed: Duration,
}

/// Token counts of completed turns.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct TokenTotals {
    input: u64,
    output: u64,
    thinking: u64,
}

impl TokenTotals {
    pub(crate) fn add(&mut self, usage: &Usage) {
        self.input += u64::from(usage.prompt_tokens);
        self.output += u64::from(usage.completion_tokens);
        self.thinking += u64::from(usage.reasoning_tokens());
    }

    /// Totals including `current`, the usage of a turn that has not been added yet.
    pub(crate) fn snapshot(
        self,
        current: &Usage,
        tool_calls: usize,
        elapsed: Duration,
    ) -> MetricsSnapshot {
        let mut totals = self;
        totals.add(current);
        MetricsSnapshot {
            input_tokens: totals.input,
            output_tokens: totals.output,
            thinking_tokens: totals.thinking,
            tool_calls,
            elapsed,
        }
    }
}

/// Caller-side metrics folded from [`CoreEvent`]s.
///
/// ```
/// use cyberloop::metrics::{Metrics, MetricsSnapshot};
/// use cyberloop::CoreEvent;
///
/// let mut metrics = Metrics::new();
/// metrics.apply(&CoreEvent::Metrics(MetricsSnapshot {
///     input_tokens: 120,
///     output_tokens: 30,
///     ..MetricsSnapshot::default()
/// }));
/// assert_eq!(metrics.input_tokens, 120);
/// ```
#[derive(Debug, Clone)]
pub struct Metrics {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub thinking_tokens: u64,
    /// Tool calls started during the run, counted from pending tool events.
    pub tool_calls: usize,
    started: Instant,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Starts the clock now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            input_tokens: 0,
            output_tokens: 0,
            thinking_tokens: 0,
            tool_calls: 0,
            started: Instant::now(),
        }
    }

    /// Folds one event into the totals.
    ///
    /// Snapshots replace the token counts; pending tool events increment the tool count.
    pub fn apply(&mut self, event: &CoreEvent) {
        match event {
            CoreEvent::Metrics(snapshot) => {
                self.input_tokens = snapshot.input_tokens;
                self.output_tokens = snapshot.output_tokens;
                self.thinking_tokens = snapshot.thinking_tokens;
            }
            CoreEvent::ToolCall(update) if update.status() == ToolStatus::Pending => {
                self.tool_calls += 1;
            }
            _ => {}
        }
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}
