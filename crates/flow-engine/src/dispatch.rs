//! Step dispatch: maps each step kind to its executor.
//!
//! Dispatch is an exhaustive match over [`StepKind`], so adding a step kind
//! fails compilation until every site handles it. Each arm validates its
//! inputs, performs the action through the executor boundary, and returns an
//! [`ExecResult`] describing side effects.

use std::sync::Arc;

use flow_locator::{PageProbe, Resolution, TargetResolver};
use pageflow_core_types::{
    ControlDirective, ExecResult, FlowNode, Step, StepKind, TargetLocator,
};
use serde_json::{json, Value};
use tokio::time::sleep;
use tracing::debug;

use crate::boundary::{ActionExecutor, ActionOutcome};
use crate::config::EngineConfig;
use crate::errors::FlowError;
use crate::vars::VariableStore;

pub struct StepDispatcher {
    executor: Arc<dyn ActionExecutor>,
    probe: Arc<dyn PageProbe>,
    resolver: Arc<dyn TargetResolver>,
    config: EngineConfig,
}

impl StepDispatcher {
    pub fn new(
        executor: Arc<dyn ActionExecutor>,
        probe: Arc<dyn PageProbe>,
        resolver: Arc<dyn TargetResolver>,
        config: EngineConfig,
    ) -> Self {
        Self {
            executor,
            probe,
            resolver,
            config,
        }
    }

    /// Execute one step body. Post-action waits, retries, and logging are the
    /// step runner's concern.
    pub async fn execute(
        &self,
        step: &Step,
        vars: &mut VariableStore,
    ) -> Result<ExecResult, FlowError> {
        match &step.kind {
            StepKind::Click { target } => self.pointer_action("click", target).await,
            StepKind::Dblclick { target } => self.pointer_action("dblclick", target).await,

            StepKind::Fill { target, value } => {
                let value = flow_expr::interpolate(value, &vars.resolver());
                let resolution = self.resolve(target).await?;
                self.invoke_ok(
                    "fill",
                    json!({ "handle": resolution.handle.id.as_str(), "value": value }),
                )
                .await?;
                Ok(annotated(ExecResult::ok(), &resolution))
            }

            StepKind::Navigate { url } => {
                let url = flow_expr::interpolate(url, &vars.resolver());
                if url.is_empty() {
                    return Err(FlowError::Validation("navigate step has no url".into()));
                }
                self.invoke_ok("navigate", json!({ "url": url })).await?;
                Ok(ExecResult::ok())
            }

            StepKind::Wait { ms, target } => self.run_wait(*ms, target.as_ref()).await,

            StepKind::Assert {
                target,
                condition,
                save_as,
            } => {
                self.run_assert(target.as_ref(), condition.as_deref(), save_as.as_deref(), vars)
                    .await
            }

            StepKind::Script {
                code,
                save_as,
                defer,
            } => {
                let code = flow_expr::interpolate(code, &vars.resolver());
                if *defer {
                    // Deferred scripts run after the step body and log their
                    // own entry when flushed.
                    let mut result = ExecResult::ok();
                    result.after_script = Some(code);
                    result.already_logged = true;
                    return Ok(result);
                }

                let outcome = self.invoke_ok("evaluate", json!({ "code": code })).await?;
                if let Some(key) = save_as {
                    vars.set(key.clone(), outcome_value(&outcome));
                }
                Ok(ExecResult::ok())
            }

            StepKind::Http {
                method,
                url,
                body,
                save_as,
            } => {
                if method.is_empty() {
                    return Err(FlowError::Validation("http step has no method".into()));
                }
                let url = flow_expr::interpolate(url, &vars.resolver());
                let body = body.as_ref().map(|b| interpolate_value(b, vars));

                let outcome = self
                    .invoke_ok(
                        "http",
                        json!({ "method": method, "url": url, "body": body }),
                    )
                    .await?;

                if let Some(key) = save_as {
                    let envelope = outcome
                        .json()
                        .ok_or_else(|| FlowError::Action("http returned no envelope".into()))?;
                    vars.set(key.clone(), envelope);
                }
                Ok(ExecResult::ok())
            }

            StepKind::Extract {
                target,
                attribute,
                save_as,
            } => {
                let resolution = self.resolve(target).await?;
                let outcome = self
                    .invoke_ok(
                        "extract",
                        json!({ "handle": resolution.handle.id.as_str(), "attribute": attribute }),
                    )
                    .await?;

                if let Some(key) = save_as {
                    vars.set(key.clone(), outcome_value(&outcome));
                }
                Ok(annotated(ExecResult::ok(), &resolution))
            }

            StepKind::OpenTab { url } => {
                let url = flow_expr::interpolate(url, &vars.resolver());
                self.invoke_ok("tabs.open", json!({ "url": url })).await?;
                Ok(ExecResult::ok())
            }

            StepKind::SwitchTab { index, url_contains } => {
                if index.is_none() && url_contains.is_none() {
                    return Err(FlowError::Validation(
                        "switchTab step needs an index or urlContains".into(),
                    ));
                }
                self.invoke_ok(
                    "tabs.switch",
                    json!({ "index": index, "urlContains": url_contains }),
                )
                .await?;
                Ok(ExecResult::ok())
            }

            StepKind::CloseTab => {
                self.invoke_ok("tabs.close", json!({})).await?;
                Ok(ExecResult::ok())
            }

            StepKind::Foreach {
                list_var,
                item_var,
                subflow_id,
            } => {
                if list_var.is_empty() || item_var.is_empty() || subflow_id.is_empty() {
                    return Err(FlowError::Validation(
                        "foreach step needs listVar, itemVar and subflowId".into(),
                    ));
                }
                Ok(ExecResult::ok().with_control(ControlDirective::Foreach {
                    list_var: list_var.clone(),
                    item_var: item_var.clone(),
                    subflow_id: subflow_id.clone(),
                }))
            }

            StepKind::While {
                condition,
                subflow_id,
                max_iterations,
            } => {
                if condition.is_empty() || subflow_id.is_empty() {
                    return Err(FlowError::Validation(
                        "while step needs a condition and subflowId".into(),
                    ));
                }
                let bound = max_iterations
                    .unwrap_or(self.config.max_loop_iterations)
                    .clamp(1, self.config.max_loop_iterations);
                Ok(ExecResult::ok().with_control(ControlDirective::While {
                    condition: condition.clone(),
                    subflow_id: subflow_id.clone(),
                    max_iterations: bound,
                }))
            }

            StepKind::If {
                branches,
                condition,
            } => self.run_branch(branches, condition.as_deref(), vars),
        }
    }

    async fn pointer_action(
        &self,
        action: &str,
        target: &TargetLocator,
    ) -> Result<ExecResult, FlowError> {
        let resolution = self.resolve(target).await?;
        self.invoke_ok(action, json!({ "handle": resolution.handle.id.as_str() }))
            .await?;
        Ok(annotated(ExecResult::ok(), &resolution))
    }

    async fn run_wait(
        &self,
        ms: Option<u64>,
        target: Option<&TargetLocator>,
    ) -> Result<ExecResult, FlowError> {
        match (ms, target) {
            (Some(ms), None) => {
                sleep(std::time::Duration::from_millis(ms)).await;
                Ok(ExecResult::ok())
            }
            (_, Some(target)) => {
                // Poll until the target appears; the step timeout bounds us.
                loop {
                    match self.resolver.resolve(self.probe.as_ref(), target).await {
                        Ok(resolution) => return Ok(annotated(ExecResult::ok(), &resolution)),
                        Err(err) => {
                            debug!("wait target not yet resolvable: {}", err);
                            sleep(std::time::Duration::from_millis(self.config.element_poll_ms))
                                .await;
                        }
                    }
                }
            }
            (None, None) => Err(FlowError::Validation(
                "wait step needs ms or a target".into(),
            )),
        }
    }

    async fn run_assert(
        &self,
        target: Option<&TargetLocator>,
        condition: Option<&str>,
        save_as: Option<&str>,
        vars: &mut VariableStore,
    ) -> Result<ExecResult, FlowError> {
        match (target, condition) {
            (Some(target), _) => {
                let resolution = self.resolve(target).await?;
                if let Some(key) = save_as {
                    vars.set(key.to_string(), Value::Bool(true));
                }
                Ok(annotated(ExecResult::ok(), &resolution))
            }
            (None, Some(condition)) => {
                let value = flow_expr::parse(condition)?.eval(&vars.resolver())?;
                if !flow_expr::truthy(&value) {
                    return Err(FlowError::Action(format!(
                        "assertion failed: {}",
                        condition
                    )));
                }
                if let Some(key) = save_as {
                    vars.set(key.to_string(), value);
                }
                Ok(ExecResult::ok())
            }
            (None, None) => Err(FlowError::Validation(
                "assert step needs a target or a condition".into(),
            )),
        }
    }

    fn run_branch(
        &self,
        branches: &[pageflow_core_types::BranchCase],
        condition: Option<&str>,
        vars: &VariableStore,
    ) -> Result<ExecResult, FlowError> {
        if !branches.is_empty() {
            for branch in branches {
                if flow_expr::eval_bool(&branch.condition, &vars.resolver())? {
                    debug!("branch '{}' matched", branch.id);
                    return Ok(ExecResult::ok().with_next_edge(format!("case:{}", branch.id)));
                }
            }
            // No case matched; the walk falls through to the default edge.
            return Ok(ExecResult::ok());
        }

        match condition {
            Some(condition) => {
                let label = if flow_expr::eval_bool(condition, &vars.resolver())? {
                    "true"
                } else {
                    "false"
                };
                Ok(ExecResult::ok().with_next_edge(label))
            }
            None => Err(FlowError::Validation(
                "if step needs branches or a condition".into(),
            )),
        }
    }

    async fn resolve(&self, target: &TargetLocator) -> Result<Resolution, FlowError> {
        Ok(self.resolver.resolve(self.probe.as_ref(), target).await?)
    }

    async fn invoke_ok(&self, action: &str, args: Value) -> Result<ActionOutcome, FlowError> {
        let outcome = self.executor.invoke(action, args).await?;
        if outcome.is_error {
            return Err(FlowError::Action(outcome.error_message()));
        }
        Ok(outcome)
    }
}

fn annotated(result: ExecResult, resolution: &Resolution) -> ExecResult {
    match &resolution.fallback_used {
        Some(strategy) => result.with_fallback(strategy.clone()),
        None => result,
    }
}

/// Extracted/evaluated payloads are JSON when they parse, raw text otherwise.
fn outcome_value(outcome: &ActionOutcome) -> Value {
    match outcome.first_text() {
        Some(text) => serde_json::from_str(text)
            .unwrap_or_else(|_| Value::String(text.to_string())),
        None => Value::Null,
    }
}

fn interpolate_value(value: &Value, vars: &VariableStore) -> Value {
    match value {
        Value::String(s) => Value::String(flow_expr::interpolate(s, &vars.resolver())),
        other => other.clone(),
    }
}

/// Map a graph node to an executable step: the node type becomes the step
/// tag and the node id fills in a missing step id.
pub fn step_from_node(node: &FlowNode) -> Result<Step, FlowError> {
    let mut config = match &node.config {
        Value::Object(map) => map.clone(),
        Value::Null => serde_json::Map::new(),
        other => {
            return Err(FlowError::Validation(format!(
                "node '{}' config must be an object, got {}",
                node.id, other
            )))
        }
    };

    config
        .entry("type")
        .or_insert_with(|| Value::String(node.node_type.clone()));
    config
        .entry("id")
        .or_insert_with(|| Value::String(node.id.clone()));

    serde_json::from_value(Value::Object(config)).map_err(|err| {
        FlowError::Validation(format!("node '{}' is not a valid step: {}", node.id, err))
    })
}
