//! Timer-driven run schedules.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::FlowId;

/// A recurring (or one-shot) timer that triggers a flow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowSchedule {
    pub id: String,
    pub flow_id: FlowId,

    /// Interval between runs. `repeat = false` disables the schedule after
    /// its first firing.
    pub every_ms: u64,

    #[serde(default = "default_true")]
    pub repeat: bool,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub variables: HashMap<String, Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_at: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}

impl FlowSchedule {
    pub fn new(id: impl Into<String>, flow_id: FlowId, every_ms: u64) -> Self {
        Self {
            id: id.into(),
            flow_id,
            every_ms,
            repeat: true,
            enabled: true,
            variables: HashMap::new(),
            last_run_at: None,
        }
    }

    pub fn one_shot(mut self) -> Self {
        self.repeat = false;
        self
    }

    /// Whether the schedule should fire at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        if !self.enabled {
            return false;
        }
        match self.last_run_at {
            None => true,
            Some(last) => {
                let elapsed = now.signed_duration_since(last);
                elapsed.num_milliseconds() >= self.every_ms as i64
            }
        }
    }
}
