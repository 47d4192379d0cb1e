//! Flow runner: owns a run's lifecycle.
//!
//! Seeds variables, checks bindings, prepares the page, dispatches to linear
//! or graph-walk execution, and assembles the final result. Every run is an
//! independent state machine: store, logger, budget, and pause flag are
//! created per run and never shared.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use flow_locator::{DefaultTargetResolver, PageProbe, TargetResolver};
use pageflow_core_types::{
    Flow, FlowNode, RunId, RunLogEntry, RunOptions, RunRecord, RunResult, StepStatus,
};
use pageflow_store::RunStore;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::boundary::{ActionExecutor, PageEvents};
use crate::budget::RunBudget;
use crate::config::EngineConfig;
use crate::dispatch::{step_from_node, StepDispatcher};
use crate::errors::FlowError;
use crate::logger::RunLogger;
use crate::plugins::PluginManager;
use crate::step_runner::{StepDisposition, StepRunner};
use crate::subflow::{SubflowOutcome, SubflowRunner};
use crate::vars::VariableStore;
use crate::waits::WaitPolicies;

pub struct FlowRunner {
    executor: Arc<dyn ActionExecutor>,
    probe: Arc<dyn PageProbe>,
    events: Arc<dyn PageEvents>,
    resolver: Arc<dyn TargetResolver>,
    plugins: Arc<PluginManager>,
    run_store: Option<Arc<dyn RunStore>>,
    config: EngineConfig,
}

impl FlowRunner {
    pub fn new(
        executor: Arc<dyn ActionExecutor>,
        probe: Arc<dyn PageProbe>,
        events: Arc<dyn PageEvents>,
    ) -> Self {
        Self {
            executor,
            probe,
            events,
            resolver: Arc::new(DefaultTargetResolver::new()),
            plugins: Arc::new(PluginManager::new()),
            run_store: None,
            config: EngineConfig::default(),
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn TargetResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_plugins(mut self, plugins: PluginManager) -> Self {
        self.plugins = Arc::new(plugins);
        self
    }

    pub fn with_run_store(mut self, store: Arc<dyn RunStore>) -> Self {
        self.run_store = Some(store);
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Execute one flow. Always returns a structured result; failures are
    /// reported through `success` and the log, never as a bare error.
    pub async fn run(&self, flow: &Flow, options: RunOptions) -> RunResult {
        let run_id = RunId::new();
        let started_at = Utc::now();
        let t0 = Instant::now();
        let logger = Arc::new(RunLogger::new());
        let budget = RunBudget::new(options.timeout_ms);
        let paused = Arc::new(AtomicBool::new(false));

        info!("running flow '{}' ({}) as {}", flow.name, flow.id, run_id);

        let mut vars = match VariableStore::seed(&flow.variables, &options.variables) {
            Ok(vars) => vars,
            Err(err) => {
                logger.append(RunLogEntry::new(
                    "bindings",
                    StepStatus::Failed,
                    err.to_string(),
                ));
                return self
                    .finish(flow, run_id, started_at, t0, &logger, false, None, &options)
                    .await;
            }
        };

        self.prepare_page(&options).await;

        let step_runner = StepRunner::new(
            StepDispatcher::new(
                self.executor.clone(),
                self.probe.clone(),
                self.resolver.clone(),
                self.config.clone(),
            ),
            WaitPolicies::new(self.events.clone(), self.config.wait.clone()),
            self.executor.clone(),
            self.plugins.clone(),
            logger.clone(),
            self.config.clone(),
            run_id.clone(),
            flow.id.clone(),
            paused.clone(),
        );

        let completed = if flow.is_graph() {
            self.run_graph(flow, &step_runner, &mut vars, &budget, &options)
                .await
        } else {
            self.run_linear(flow, &step_runner, &mut vars, &budget, &options)
                .await
        };

        if options.capture_network {
            self.collect_network(&logger).await;
        }

        let success = completed && !paused.load(Ordering::Relaxed);
        self.finish(
            flow,
            run_id,
            started_at,
            t0,
            &logger,
            success,
            Some(&vars),
            &options,
        )
        .await
    }

    /// Linear mode: steps in array order, directives executed immediately.
    async fn run_linear(
        &self,
        flow: &Flow,
        step_runner: &StepRunner,
        vars: &mut VariableStore,
        budget: &RunBudget,
        options: &RunOptions,
    ) -> bool {
        let start_idx = match &options.start_at {
            Some(id) => match flow.steps.iter().position(|s| s.id == *id) {
                Some(idx) => idx,
                None => {
                    step_runner.logger().append(RunLogEntry::new(
                        id,
                        StepStatus::Failed,
                        format!("start step '{}' not found", id),
                    ));
                    return false;
                }
            },
            None => 0,
        };

        for step in &flow.steps[start_idx..] {
            match step_runner.run_step(step, vars, budget).await {
                StepDisposition::Success(exec) => {
                    if let Some(control) = exec.control {
                        let subflows = SubflowRunner::new(step_runner);
                        match subflows
                            .run_directive(flow, &step.id, control, vars, budget)
                            .await
                        {
                            Ok(SubflowOutcome::Completed) => {}
                            Ok(SubflowOutcome::Paused) => return false,
                            Err(err) => {
                                warn!("directive '{}' aborted the run: {}", step.id, err);
                                return false;
                            }
                        }
                    }
                }
                StepDisposition::Paused => return false,
                StepDisposition::Failed(_) => return false,
            }
        }

        true
    }

    /// Graph-walk mode: follow returned edge labels from the start node,
    /// jumping along `onError` edges on unrecoverable failures.
    async fn run_graph(
        &self,
        flow: &Flow,
        step_runner: &StepRunner,
        vars: &mut VariableStore,
        budget: &RunBudget,
        options: &RunOptions,
    ) -> bool {
        let logger = step_runner.logger().clone();

        let mut current: &FlowNode = match &options.start_at {
            Some(id) => match flow.nodes.iter().find(|n| n.id == *id) {
                Some(node) => node,
                None => {
                    logger.append(RunLogEntry::new(
                        id,
                        StepStatus::Failed,
                        format!("start node '{}' not found", id),
                    ));
                    return false;
                }
            },
            None => match flow_dag::start_node(&flow.nodes, &flow.edges) {
                Some(node) => node,
                None => {
                    logger.append(RunLogEntry::new(
                        "graph",
                        StepStatus::Failed,
                        "graph has no nodes",
                    ));
                    return false;
                }
            },
        };

        let mut visits: u32 = 0;
        loop {
            visits += 1;
            if visits > self.config.max_node_visits {
                logger.append(RunLogEntry::new(
                    &current.id,
                    StepStatus::Failed,
                    format!(
                        "graph walk exceeded {} node visits",
                        self.config.max_node_visits
                    ),
                ));
                return false;
            }
            if budget.exceeded() {
                logger.append(RunLogEntry::new(
                    &current.id,
                    StepStatus::Failed,
                    FlowError::GlobalTimeout.to_string(),
                ));
                return false;
            }

            let mut next_label: Option<String> = None;
            if !current.is_start() {
                let step = match step_from_node(current) {
                    Ok(step) => step,
                    Err(err) => {
                        logger.append(RunLogEntry::new(
                            &current.id,
                            StepStatus::Failed,
                            err.to_string(),
                        ));
                        return false;
                    }
                };

                match step_runner.run_step(&step, vars, budget).await {
                    StepDisposition::Success(exec) => {
                        next_label = exec.next_edge.clone();
                        if let Some(control) = exec.control {
                            let subflows = SubflowRunner::new(step_runner);
                            match subflows
                                .run_directive(flow, &step.id, control, vars, budget)
                                .await
                            {
                                Ok(SubflowOutcome::Completed) => {}
                                Ok(SubflowOutcome::Paused) => return false,
                                Err(err) => {
                                    // A loop body failure is recoverable only
                                    // through an explicit onError edge.
                                    match self.jump_on_error(flow, current, &err) {
                                        Some(node) => {
                                            current = node;
                                            continue;
                                        }
                                        None => return false,
                                    }
                                }
                            }
                        }
                    }
                    StepDisposition::Paused => return false,
                    StepDisposition::Failed(err) => match self.jump_on_error(flow, current, &err)
                    {
                        Some(node) => {
                            current = node;
                            continue;
                        }
                        None => return false,
                    },
                }
            }

            match flow_dag::next_edge(&flow.edges, &current.id, next_label.as_deref()) {
                Some(edge) => match flow.nodes.iter().find(|n| n.id == edge.to) {
                    Some(node) => current = node,
                    None => {
                        logger.append(RunLogEntry::new(
                            &edge.to,
                            StepStatus::Failed,
                            format!("edge targets unknown node '{}'", edge.to),
                        ));
                        return false;
                    }
                },
                None => break,
            }
        }

        true
    }

    fn jump_on_error<'f>(
        &self,
        flow: &'f Flow,
        current: &FlowNode,
        err: &FlowError,
    ) -> Option<&'f FlowNode> {
        let edge = flow_dag::error_edge(&flow.edges, &current.id)?;
        let node = flow.nodes.iter().find(|n| n.id == edge.to)?;
        info!(
            "node '{}' failed ({}), continuing at onError target '{}'",
            current.id, err, node.id
        );
        Some(node)
    }

    /// Pre-run page setup: tab targeting, refresh, network capture. All
    /// best-effort.
    async fn prepare_page(&self, options: &RunOptions) {
        if let Some(tab) = &options.tab {
            if let Err(err) = self
                .executor
                .invoke("tabs.select", json!({ "match": tab }))
                .await
            {
                warn!("tab targeting failed: {}", err);
            }
        }
        if options.refresh {
            if let Err(err) = self.executor.invoke("reload", json!({})).await {
                warn!("pre-run reload failed: {}", err);
            }
        }
        if options.capture_network {
            if let Err(err) = self.executor.invoke("network.start", json!({})).await {
                warn!("network capture start failed: {}", err);
            }
        }
    }

    async fn collect_network(&self, logger: &RunLogger) {
        match self.executor.invoke("network.stop", json!({})).await {
            Ok(outcome) => {
                if let Some(Value::Array(snippets)) = outcome.json() {
                    logger.attach_network(snippets);
                }
            }
            Err(err) => debug!("network capture stop failed: {}", err),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn finish(
        &self,
        flow: &Flow,
        run_id: RunId,
        started_at: DateTime<Utc>,
        t0: Instant,
        logger: &RunLogger,
        success: bool,
        vars: Option<&VariableStore>,
        options: &RunOptions,
    ) -> RunResult {
        let took_ms = t0.elapsed().as_millis() as u64;
        let entries = logger.snapshot();
        let summary = logger.summary(took_ms);

        if let Some(store) = &self.run_store {
            let record = RunRecord {
                run_id: run_id.clone(),
                flow_id: flow.id.clone(),
                started_at,
                finished_at: Utc::now(),
                success,
                entries: entries.clone(),
            };
            if let Err(err) = store.append_run(record).await {
                warn!("failed to persist run record: {}", err);
            }
        }

        info!(
            "run {} finished: success={} total={} failed={} in {}ms",
            run_id, success, summary.total, summary.failed, took_ms
        );

        RunResult {
            run_id,
            success,
            summary,
            outputs: vars
                .map(|v| v.public_outputs(&flow.variables))
                .unwrap_or_default(),
            screenshots: logger.screenshots(),
            logs: options.include_logs.then_some(entries),
        }
    }
}
