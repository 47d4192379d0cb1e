//! Append-only per-run log.

use std::collections::HashMap;

use parking_lot::Mutex;
use pageflow_core_types::{RunLogEntry, RunSummary, StepStatus};
use serde_json::Value;
use tracing::debug;

/// Structured log of per-step outcomes. One instance per run; never shared
/// across runs.
#[derive(Default)]
pub struct RunLogger {
    entries: Mutex<Vec<RunLogEntry>>,
}

impl RunLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, entry: RunLogEntry) {
        debug!(
            "step {} -> {} ({}ms): {}",
            entry.step_id,
            entry.status.name(),
            entry.duration_ms,
            entry.message
        );
        self.entries.lock().push(entry);
    }

    pub fn snapshot(&self) -> Vec<RunLogEntry> {
        self.entries.lock().clone()
    }

    pub fn failed_count(&self) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.status == StepStatus::Failed)
            .count()
    }

    /// Summary over terminal entries (success/failed/paused); retries and
    /// warnings are diagnostics, not step outcomes.
    pub fn summary(&self, took_ms: u64) -> RunSummary {
        let entries = self.entries.lock();
        let total = entries.iter().filter(|e| e.status.is_terminal()).count();
        let success = entries
            .iter()
            .filter(|e| e.status == StepStatus::Success)
            .count();
        let failed = entries
            .iter()
            .filter(|e| e.status == StepStatus::Failed)
            .count();
        RunSummary {
            total,
            success,
            failed,
            took_ms,
        }
    }

    /// Failure screenshots keyed by step id.
    pub fn screenshots(&self) -> HashMap<String, String> {
        self.entries
            .lock()
            .iter()
            .filter_map(|e| {
                e.screenshot
                    .as_ref()
                    .map(|shot| (e.step_id.clone(), shot.clone()))
            })
            .collect()
    }

    /// Attach captured network snippets to the most relevant entry: the last
    /// failure, or the last entry when the run succeeded.
    pub fn attach_network(&self, snippets: Vec<Value>) {
        let mut entries = self.entries.lock();
        let idx = entries
            .iter()
            .rposition(|e| e.status == StepStatus::Failed)
            .or(entries.len().checked_sub(1));
        if let Some(idx) = idx {
            entries[idx].network = Some(snippets);
        }
    }
}
