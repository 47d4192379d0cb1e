//! Flow execution engine.
//!
//! Turns a stored flow (linear step list or node/edge graph) into a
//! correctly ordered, retried, time-bounded, and observably-logged
//! execution. Page access goes through injected collaborators: the action
//! executor performs actions, the page probe answers selector queries, and
//! the page event source feeds the wait policies.

pub mod boundary;
pub mod budget;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod logger;
pub mod plugins;
pub mod runner;
pub mod step_runner;
pub mod subflow;
pub mod vars;
pub mod waits;

pub use boundary::{
    ActionContent, ActionExecutor, ActionOutcome, NullPageEvents, PageEvent, PageEventBus,
    PageEvents,
};
pub use budget::RunBudget;
pub use config::{EngineConfig, WaitConfig};
pub use dispatch::{step_from_node, StepDispatcher};
pub use errors::FlowError;
pub use logger::RunLogger;
pub use plugins::{FlowPlugin, HookContext, HookDecision, PluginManager};
pub use runner::FlowRunner;
pub use step_runner::{StepDisposition, StepRunner};
pub use subflow::{SubflowMode, SubflowOutcome, SubflowRunner};
pub use vars::VariableStore;
pub use waits::WaitPolicies;
