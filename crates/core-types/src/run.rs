//! Run-side types: executor results, log entries, records, and the
//! caller-facing result.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{FlowId, RunId};

/// Contract returned by a step executor.
#[derive(Debug, Clone, Default)]
pub struct ExecResult {
    /// The executor wrote its own log entry; the step runner must not append
    /// another one.
    pub already_logged: bool,

    /// Edge label the graph walk should follow next.
    pub next_edge: Option<String>,

    /// Loop directive for the enclosing runner.
    pub control: Option<ControlDirective>,

    /// Script queued to run after the step body completes.
    pub after_script: Option<String>,

    /// Selector strategy annotation when resolution fell back past the
    /// first-priority candidate.
    pub fallback_used: Option<String>,
}

impl ExecResult {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn with_next_edge(mut self, label: impl Into<String>) -> Self {
        self.next_edge = Some(label.into());
        self
    }

    pub fn with_control(mut self, control: ControlDirective) -> Self {
        self.control = Some(control);
        self
    }

    pub fn with_fallback(mut self, strategy: impl Into<String>) -> Self {
        self.fallback_used = Some(strategy.into());
        self
    }
}

/// Loop instruction a step hands back to its runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlDirective {
    Foreach {
        list_var: String,
        item_var: String,
        subflow_id: String,
    },
    While {
        condition: String,
        subflow_id: String,
        max_iterations: u32,
    },
}

/// Per-step outcome status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Success,
    Failed,
    Retrying,
    Warning,
    Paused,
}

impl StepStatus {
    pub fn name(&self) -> &'static str {
        match self {
            StepStatus::Success => "success",
            StepStatus::Failed => "failed",
            StepStatus::Retrying => "retrying",
            StepStatus::Warning => "warning",
            StepStatus::Paused => "paused",
        }
    }

    /// Entries that count toward the run summary (one per step attempt
    /// outcome, not per retry or diagnostic).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepStatus::Success | StepStatus::Failed | StepStatus::Paused
        )
    }
}

/// Append-only structured record of one step outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunLogEntry {
    pub step_id: String,
    pub status: StepStatus,
    pub message: String,
    pub duration_ms: u64,
    pub ts: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<Vec<Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_used: Option<String>,
}

impl RunLogEntry {
    pub fn new(step_id: impl Into<String>, status: StepStatus, message: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            status,
            message: message.into(),
            duration_ms: 0,
            ts: Utc::now(),
            screenshot: None,
            network: None,
            fallback_used: None,
        }
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn with_screenshot(mut self, screenshot: impl Into<String>) -> Self {
        self.screenshot = Some(screenshot.into());
        self
    }

    pub fn with_fallback(mut self, strategy: impl Into<String>) -> Self {
        self.fallback_used = Some(strategy.into());
        self
    }
}

/// One run's full log, owned by the flow runner and handed to storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub run_id: RunId,
    pub flow_id: FlowId,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub success: bool,
    pub entries: Vec<RunLogEntry>,
}

/// Aggregate counters for a finished run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub took_ms: u64,
}

/// Caller-facing result. Failed runs still carry the full log and summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    pub run_id: RunId,
    pub success: bool,
    pub summary: RunSummary,

    /// Final non-sensitive variables.
    #[serde(default)]
    pub outputs: HashMap<String, Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs: Option<Vec<RunLogEntry>>,

    /// Screenshots captured on failures, keyed by step id.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub screenshots: HashMap<String, String>,
}

/// Caller options for one run invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOptions {
    /// Tab targeting hint passed to the action executor before the run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tab: Option<String>,

    /// Reload the target page before the first step.
    #[serde(default)]
    pub refresh: bool,

    #[serde(default)]
    pub capture_network: bool,

    /// Global wall-clock deadline for the whole run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    /// Start node (graph mode) or step id (linear mode) override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_at: Option<String>,

    /// Caller-supplied variable overrides, applied over flow defaults.
    #[serde(default)]
    pub variables: HashMap<String, Value>,

    /// Include the full log in the result (on by default).
    #[serde(default = "default_true")]
    pub include_logs: bool,
}

fn default_true() -> bool {
    true
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            tab: None,
            refresh: false,
            capture_network: false,
            timeout_ms: None,
            start_at: None,
            variables: HashMap::new(),
            include_logs: true,
        }
    }
}

impl RunOptions {
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_variable(mut self, key: impl Into<String>, value: Value) -> Self {
        self.variables.insert(key.into(), value);
        self
    }
}
