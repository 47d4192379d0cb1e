//! pageflow: a browser flow replay engine.
//!
//! Flows recorded from user actions are replayed later, possibly
//! unattended: steps execute in order (or along a node/edge graph), each
//! wrapped with retries, timeouts, selector fallback resolution, and
//! post-action wait policies, under a global run deadline.
//!
//! The engine performs no browser I/O itself. Hosts inject three
//! collaborators: an [`ActionExecutor`] that physically performs actions, a
//! [`PageProbe`] that answers element queries, and a [`PageEvents`] source
//! feeding navigation/network signals. [`FlowService`] wires them together
//! with storage into the run-invocation surface.
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use pageflow::{FlowService, RunOptions};
//! # use pageflow_core_types::Flow;
//! # async fn example(
//! #     executor: Arc<dyn pageflow::ActionExecutor>,
//! #     probe: Arc<dyn pageflow::PageProbe>,
//! # ) -> anyhow::Result<()> {
//! let service = FlowService::builder()
//!     .executor(executor)
//!     .probe(probe)
//!     .build()?;
//!
//! let flow = Flow::new("checkout smoke");
//! service.save_flow(flow.clone()).await?;
//! let result = service.run_flow(&flow.id, RunOptions::default()).await?;
//! assert!(result.success);
//! # Ok(())
//! # }
//! ```

pub mod service;

pub use service::{FlowService, FlowServiceBuilder};

// Engine surface.
pub use flow_engine::{
    ActionContent, ActionExecutor, ActionOutcome, EngineConfig, FlowError, FlowPlugin,
    FlowRunner, HookContext, HookDecision, NullPageEvents, PageEvent, PageEventBus, PageEvents,
    PluginManager, WaitConfig,
};
pub use flow_locator::{DefaultTargetResolver, ElementHandle, LocatorError, PageProbe};

// Data model.
pub use pageflow_core_types::{
    Flow, FlowEdge, FlowId, FlowNode, FlowSchedule, RetrySpec, RunId, RunLogEntry, RunOptions,
    RunRecord, RunResult, SelectorCandidate, SelectorKind, Step, StepKind, StepStatus, Subflow,
    TargetLocator, VariableDecl,
};

// Storage boundary.
pub use pageflow_store::{
    FlowStore, InMemoryFlowStore, InMemoryRunStore, InMemoryScheduleStore, RunStore,
    ScheduleStore, StoreError,
};

// Scheduling.
pub use pageflow_scheduler::{ScheduleRuntime, ScheduleTarget, SchedulerConfig};
