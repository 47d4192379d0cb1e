//! Subflow runner: executes a named node/edge sub-graph.
//!
//! Subflows are invoked by loop and branch directives (inline, sharing the
//! caller's variable store) or explicitly in isolation (cloned store, no
//! merge-back). Execution is strictly sequential over the default-edge
//! topological order.

use async_recursion::async_recursion;
use flow_expr::eval_bool;
use pageflow_core_types::{ControlDirective, Flow, RunLogEntry, StepStatus};
use tracing::debug;

use crate::budget::RunBudget;
use crate::dispatch::step_from_node;
use crate::errors::FlowError;
use crate::step_runner::{StepDisposition, StepRunner};
use crate::vars::VariableStore;

/// How the subflow sees the caller's variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubflowMode {
    /// Shares the caller's store; writes surface to the caller.
    Inline,

    /// Runs on a cloned store; no automatic merge-back.
    Isolated,
}

/// Why a subflow stopped without failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubflowOutcome {
    Completed,
    Paused,
}

pub struct SubflowRunner<'r> {
    runner: &'r StepRunner,
}

impl<'r> SubflowRunner<'r> {
    pub fn new(runner: &'r StepRunner) -> Self {
        Self { runner }
    }

    /// Execute one subflow by id. Failures propagate to the caller; the
    /// caller decides whether they are loop-terminating or run-fatal.
    #[async_recursion]
    pub async fn run(
        &self,
        flow: &Flow,
        subflow_id: &str,
        vars: &mut VariableStore,
        budget: &RunBudget,
        mode: SubflowMode,
    ) -> Result<SubflowOutcome, FlowError> {
        if !flow.subflows.contains_key(subflow_id) {
            return Err(FlowError::Validation(format!(
                "unknown subflow '{}'",
                subflow_id
            )));
        }

        let plugins = self.runner.plugins().clone();
        let logger = self.runner.logger().clone();
        plugins.subflow_start(subflow_id, &logger).await;

        let mut isolated_store;
        let store: &mut VariableStore = match mode {
            SubflowMode::Inline => vars,
            SubflowMode::Isolated => {
                isolated_store = vars.clone();
                &mut isolated_store
            }
        };

        let result = self.run_body(flow, subflow_id, store, budget).await;

        plugins
            .subflow_end(subflow_id, result.is_ok(), &logger)
            .await;
        result
    }

    #[async_recursion]
    async fn run_body(
        &self,
        flow: &Flow,
        subflow_id: &str,
        vars: &mut VariableStore,
        budget: &RunBudget,
    ) -> Result<SubflowOutcome, FlowError> {
        let subflow = &flow.subflows[subflow_id];
        let order = flow_dag::topo_order(&subflow.nodes, &subflow.edges)?;
        debug!("subflow '{}' runs {} nodes", subflow_id, order.len());

        for node_id in &order {
            // Cooperative pause check at subflow boundaries.
            if self.runner.is_paused() {
                return Ok(SubflowOutcome::Paused);
            }

            let node = subflow
                .nodes
                .iter()
                .find(|n| n.id == *node_id)
                .expect("topological order only yields known nodes");
            if node.is_start() {
                continue;
            }

            let step = step_from_node(node)?;
            match self.runner.run_step(&step, vars, budget).await {
                StepDisposition::Success(exec) => {
                    if let Some(control) = exec.control {
                        match self
                            .run_directive(flow, &step.id, control, vars, budget)
                            .await?
                        {
                            SubflowOutcome::Completed => {}
                            SubflowOutcome::Paused => return Ok(SubflowOutcome::Paused),
                        }
                    }
                }
                StepDisposition::Paused => return Ok(SubflowOutcome::Paused),
                StepDisposition::Failed(err) => return Err(err),
            }
        }

        Ok(SubflowOutcome::Completed)
    }

    /// Execute a loop directive. `foreach` binds each list element in turn;
    /// `while` re-evaluates its condition up to the clamped iteration bound.
    /// Both run their subflow inline and strictly sequentially.
    #[async_recursion]
    pub async fn run_directive(
        &self,
        flow: &Flow,
        step_id: &str,
        directive: ControlDirective,
        vars: &mut VariableStore,
        budget: &RunBudget,
    ) -> Result<SubflowOutcome, FlowError> {
        match directive {
            ControlDirective::Foreach {
                list_var,
                item_var,
                subflow_id,
            } => {
                let items = match vars.get(&list_var) {
                    Some(serde_json::Value::Array(items)) => items.clone(),
                    Some(other) => {
                        let err = FlowError::Validation(format!(
                            "foreach variable '{}' is not a list, got {}",
                            list_var, other
                        ));
                        self.log_directive_failure(step_id, &err);
                        return Err(err);
                    }
                    None => {
                        let err = FlowError::Validation(format!(
                            "foreach variable '{}' is not bound",
                            list_var
                        ));
                        self.log_directive_failure(step_id, &err);
                        return Err(err);
                    }
                };

                debug!("foreach '{}' over {} items", step_id, items.len());
                for item in items {
                    vars.set(item_var.clone(), item);
                    match self
                        .run(flow, &subflow_id, vars, budget, SubflowMode::Inline)
                        .await?
                    {
                        SubflowOutcome::Completed => {}
                        SubflowOutcome::Paused => return Ok(SubflowOutcome::Paused),
                    }
                }
                Ok(SubflowOutcome::Completed)
            }

            ControlDirective::While {
                condition,
                subflow_id,
                max_iterations,
            } => {
                let mut iterations = 0;
                while iterations < max_iterations {
                    if !eval_bool(&condition, &vars.resolver())? {
                        break;
                    }
                    match self
                        .run(flow, &subflow_id, vars, budget, SubflowMode::Inline)
                        .await?
                    {
                        SubflowOutcome::Completed => {}
                        SubflowOutcome::Paused => return Ok(SubflowOutcome::Paused),
                    }
                    iterations += 1;
                }
                debug!("while '{}' finished after {} iterations", step_id, iterations);
                Ok(SubflowOutcome::Completed)
            }
        }
    }

    /// Directive-level validation failures have no step-runner entry yet;
    /// record one against the directive step.
    fn log_directive_failure(&self, step_id: &str, err: &FlowError) {
        self.runner.logger().append(RunLogEntry::new(
            step_id,
            StepStatus::Failed,
            err.to_string(),
        ));
    }
}
