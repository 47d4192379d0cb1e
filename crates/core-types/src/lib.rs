//! Shared data model for the pageflow replay engine.
//!
//! Everything that crosses a crate boundary lives here: flow definitions,
//! the step union, target locators, graph nodes/edges, and the run-side
//! record types.

use std::fmt;

use uuid::Uuid;

pub mod flow;
pub mod run;
pub mod schedule;
pub mod step;

pub use flow::{Flow, FlowEdge, FlowNode, Subflow, VariableDecl, DEFAULT_EDGE_LABEL};
pub use run::{
    ControlDirective, ExecResult, RunLogEntry, RunOptions, RunRecord, RunResult, RunSummary,
    StepStatus,
};
pub use schedule::FlowSchedule;
pub use step::{
    Backoff, BranchCase, RetrySpec, SelectorCandidate, SelectorKind, Step, StepKind,
    TargetLocator,
};

#[derive(Clone, Debug, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
pub struct FlowId(pub String);

impl FlowId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for FlowId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for FlowId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
