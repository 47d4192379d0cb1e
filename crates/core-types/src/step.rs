//! Step model: the closed union of executable actions.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One executable action within a flow.
///
/// The envelope carries the fields every step shares; the action-specific
/// payload is the flattened [`StepKind`] tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    /// Step identifier, unique within the flow.
    pub id: String,

    /// Per-step timeout in milliseconds. Falls back to the engine default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    /// Retry policy. Absent means a single attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetrySpec>,

    /// Capture a screenshot when the step ultimately fails.
    #[serde(default)]
    pub screenshot_on_failure: bool,

    #[serde(flatten)]
    pub kind: StepKind,
}

impl Step {
    pub fn new(id: impl Into<String>, kind: StepKind) -> Self {
        Self {
            id: id.into(),
            timeout_ms: None,
            retry: None,
            screenshot_on_failure: false,
            kind,
        }
    }

    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_retry(mut self, retry: RetrySpec) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Short type tag for logs.
    pub fn type_tag(&self) -> &'static str {
        self.kind.tag()
    }
}

/// Closed union of step kinds. Adding a variant forces every dispatch site
/// to handle it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum StepKind {
    Click {
        target: TargetLocator,
    },
    Dblclick {
        target: TargetLocator,
    },
    Fill {
        target: TargetLocator,
        value: String,
    },
    Navigate {
        url: String,
    },
    Wait {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ms: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<TargetLocator>,
    },
    Assert {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<TargetLocator>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        condition: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        save_as: Option<String>,
    },
    Script {
        code: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        save_as: Option<String>,
        /// Deferred scripts run after the step body and log their own entry.
        #[serde(default)]
        defer: bool,
    },
    Http {
        method: String,
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        body: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        save_as: Option<String>,
    },
    Extract {
        target: TargetLocator,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        attribute: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        save_as: Option<String>,
    },
    OpenTab {
        url: String,
    },
    SwitchTab {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        index: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url_contains: Option<String>,
    },
    CloseTab,
    Foreach {
        list_var: String,
        item_var: String,
        subflow_id: String,
    },
    While {
        condition: String,
        subflow_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_iterations: Option<u32>,
    },
    If {
        #[serde(default)]
        branches: Vec<BranchCase>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        condition: Option<String>,
    },
}

impl StepKind {
    pub fn tag(&self) -> &'static str {
        match self {
            StepKind::Click { .. } => "click",
            StepKind::Dblclick { .. } => "dblclick",
            StepKind::Fill { .. } => "fill",
            StepKind::Navigate { .. } => "navigate",
            StepKind::Wait { .. } => "wait",
            StepKind::Assert { .. } => "assert",
            StepKind::Script { .. } => "script",
            StepKind::Http { .. } => "http",
            StepKind::Extract { .. } => "extract",
            StepKind::OpenTab { .. } => "openTab",
            StepKind::SwitchTab { .. } => "switchTab",
            StepKind::CloseTab => "closeTab",
            StepKind::Foreach { .. } => "foreach",
            StepKind::While { .. } => "while",
            StepKind::If { .. } => "if",
        }
    }
}

/// One ordered branch of an `if` step. First matching condition wins and the
/// walk follows the `case:<id>` edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchCase {
    pub id: String,
    pub condition: String,
}

/// Retry policy for a single step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrySpec {
    /// Number of retries after the first attempt.
    pub count: u32,

    /// Base delay between attempts in milliseconds.
    pub interval_ms: u64,

    #[serde(default)]
    pub backoff: Backoff,
}

impl RetrySpec {
    pub fn new(count: u32, interval_ms: u64) -> Self {
        Self {
            count,
            interval_ms,
            backoff: Backoff::None,
        }
    }

    pub fn exponential(mut self) -> Self {
        self.backoff = Backoff::Exponential;
        self
    }

    /// Total attempts including the first one.
    pub fn max_attempts(&self) -> u32 {
        self.count.saturating_add(1)
    }

    /// Delay before retrying after a failed `attempt` (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::None => Duration::from_millis(self.interval_ms),
            Backoff::Exponential => {
                let millis = self
                    .interval_ms
                    .saturating_mul(2u64.saturating_pow(attempt));
                Duration::from_millis(millis)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    #[default]
    None,
    Exponential,
}

/// Element-finding spec: an optional ephemeral reference captured at record
/// time plus prioritized selector candidates for replay.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetLocator {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ephemeral_ref: Option<String>,

    #[serde(default)]
    pub candidates: Vec<SelectorCandidate>,
}

impl TargetLocator {
    pub fn css(selector: impl Into<String>) -> Self {
        Self {
            ephemeral_ref: None,
            candidates: vec![SelectorCandidate::new(SelectorKind::Css, selector)],
        }
    }

    pub fn with_ref(mut self, ephemeral_ref: impl Into<String>) -> Self {
        self.ephemeral_ref = Some(ephemeral_ref.into());
        self
    }

    pub fn with_candidate(mut self, candidate: SelectorCandidate) -> Self {
        self.candidates.push(candidate);
        self
    }

    /// Candidates sorted by ascending priority weight, stable on ties.
    pub fn ordered_candidates(&self) -> Vec<&SelectorCandidate> {
        let mut out: Vec<&SelectorCandidate> = self.candidates.iter().collect();
        out.sort_by_key(|c| c.priority);
        out
    }

    pub fn is_empty(&self) -> bool {
        self.ephemeral_ref.is_none() && self.candidates.is_empty()
    }

    /// Human-readable description for logs and errors.
    pub fn describe(&self) -> String {
        if let Some(first) = self.ordered_candidates().first() {
            format!("{}:{}", first.kind.name(), first.value)
        } else if let Some(r) = &self.ephemeral_ref {
            format!("ref:{}", r)
        } else {
            "<empty locator>".to_string()
        }
    }
}

/// One selector candidate with a priority weight (lower tries first).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorCandidate {
    pub kind: SelectorKind,
    pub value: String,
    #[serde(default)]
    pub priority: i32,
}

impl SelectorCandidate {
    pub fn new(kind: SelectorKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
            priority: 0,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectorKind {
    Css,
    Xpath,
    Attribute,
    Aria,
    Text,
}

impl SelectorKind {
    pub fn name(&self) -> &'static str {
        match self {
            SelectorKind::Css => "css",
            SelectorKind::Xpath => "xpath",
            SelectorKind::Attribute => "attribute",
            SelectorKind::Aria => "aria",
            SelectorKind::Text => "text",
        }
    }
}
