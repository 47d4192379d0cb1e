//! Step runner: executes one step end-to-end.
//!
//! State machine per step: `pending -> running -> {success, failed, paused}`.
//! The runner wraps the dispatched body with the retry policy and the step
//! timeout, applies the step-type post-wait, keeps the run log current, and
//! drives the plugin hooks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use pageflow_core_types::{
    ExecResult, FlowId, RunId, RunLogEntry, Step, StepKind, StepStatus,
};
use serde_json::json;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::boundary::ActionExecutor;
use crate::budget::RunBudget;
use crate::config::EngineConfig;
use crate::dispatch::StepDispatcher;
use crate::errors::FlowError;
use crate::logger::RunLogger;
use crate::plugins::{HookContext, PluginManager};
use crate::vars::VariableStore;
use crate::waits::WaitPolicies;

/// Terminal state of one step execution.
pub enum StepDisposition {
    Success(ExecResult),
    Failed(FlowError),
    Paused,
}

pub struct StepRunner {
    dispatcher: StepDispatcher,
    waits: WaitPolicies,
    executor: Arc<dyn ActionExecutor>,
    plugins: Arc<PluginManager>,
    logger: Arc<RunLogger>,
    config: EngineConfig,
    run_id: RunId,
    flow_id: FlowId,
    paused: Arc<AtomicBool>,
}

impl StepRunner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        dispatcher: StepDispatcher,
        waits: WaitPolicies,
        executor: Arc<dyn ActionExecutor>,
        plugins: Arc<PluginManager>,
        logger: Arc<RunLogger>,
        config: EngineConfig,
        run_id: RunId,
        flow_id: FlowId,
        paused: Arc<AtomicBool>,
    ) -> Self {
        Self {
            dispatcher,
            waits,
            executor,
            plugins,
            logger,
            config,
            run_id,
            flow_id,
            paused,
        }
    }

    pub fn logger(&self) -> &Arc<RunLogger> {
        &self.logger
    }

    pub fn plugins(&self) -> &Arc<PluginManager> {
        &self.plugins
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    pub async fn run_step(
        &self,
        step: &Step,
        vars: &mut VariableStore,
        budget: &RunBudget,
    ) -> StepDisposition {
        if budget.exceeded() {
            return self.global_timeout(&step.id);
        }

        let ctx = HookContext {
            run_id: self.run_id.clone(),
            flow_id: self.flow_id.clone(),
            step_id: step.id.clone(),
            step_type: step.type_tag().to_string(),
        };

        // Pre-pause: an already-paused run or a beforeStep pause request
        // aborts the step without executing it.
        if self.is_paused() || self.plugins.before_step(&ctx, &self.logger).await {
            self.paused.store(true, Ordering::Relaxed);
            self.logger.append(RunLogEntry::new(
                &step.id,
                StepStatus::Paused,
                "run paused before step",
            ));
            return StepDisposition::Paused;
        }

        let pre_url = self.page_url().await;
        let started = Instant::now();

        let max_attempts = step.retry.as_ref().map(|r| r.max_attempts()).unwrap_or(1);
        let mut attempt: u32 = 0;

        let exec = loop {
            if budget.exceeded() {
                return self.global_timeout(&step.id);
            }

            match self.attempt_once(step, vars, budget).await {
                Ok(exec) => break exec,
                Err(err) if err.is_retryable() && attempt + 1 < max_attempts => {
                    let delay = step
                        .retry
                        .as_ref()
                        .map(|spec| spec.delay_for_attempt(attempt))
                        .unwrap_or_default();
                    self.logger.append(RunLogEntry::new(
                        &step.id,
                        StepStatus::Retrying,
                        format!("attempt {} failed: {}", attempt + 1, err),
                    ));
                    self.plugins
                        .on_retry(&ctx, attempt, &err.to_string(), &self.logger)
                        .await;
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return self.fail_step(step, &ctx, err, started).await,
            }
        };

        self.post_wait(step, pre_url.as_deref(), budget).await;

        if !exec.already_logged {
            let mut entry = RunLogEntry::new(
                &step.id,
                StepStatus::Success,
                format!("{} completed", step.type_tag()),
            )
            .with_duration(started.elapsed().as_millis() as u64);
            if let Some(strategy) = &exec.fallback_used {
                entry = entry.with_fallback(strategy.clone());
            }
            self.logger.append(entry);
        }

        self.plugins
            .after_step(&ctx, StepStatus::Success, &self.logger)
            .await;

        if let Some(code) = &exec.after_script {
            self.flush_deferred(step, code).await;
        }

        StepDisposition::Success(exec)
    }

    /// One dispatch attempt under the clamped step timeout.
    async fn attempt_once(
        &self,
        step: &Step,
        vars: &mut VariableStore,
        budget: &RunBudget,
    ) -> Result<ExecResult, FlowError> {
        let want_ms = step
            .timeout_ms
            .unwrap_or(self.config.default_step_timeout_ms);
        let (bound, budget_limited) = budget.clamp_ms(want_ms);

        match timeout(bound, self.dispatcher.execute(step, vars)).await {
            Ok(result) => result,
            Err(_) if budget_limited => Err(FlowError::GlobalTimeout),
            Err(_) => Err(FlowError::Timeout {
                step_id: step.id.clone(),
                timeout_ms: want_ms,
            }),
        }
    }

    async fn fail_step(
        &self,
        step: &Step,
        ctx: &HookContext,
        err: FlowError,
        started: Instant,
    ) -> StepDisposition {
        // Post-error pause: observed before the run continues to any next
        // step; the failure itself is still recorded.
        if self.plugins.on_error(ctx, &err.to_string(), &self.logger).await {
            self.paused.store(true, Ordering::Relaxed);
        }

        let mut entry = RunLogEntry::new(&step.id, StepStatus::Failed, err.to_string())
            .with_duration(started.elapsed().as_millis() as u64);
        if step.screenshot_on_failure {
            if let Some(shot) = self.capture_screenshot().await {
                entry = entry.with_screenshot(shot);
            }
        }
        self.logger.append(entry);

        self.plugins
            .after_step(ctx, StepStatus::Failed, &self.logger)
            .await;

        StepDisposition::Failed(err)
    }

    fn global_timeout(&self, step_id: &str) -> StepDisposition {
        let err = FlowError::GlobalTimeout;
        self.logger.append(RunLogEntry::new(
            step_id,
            StepStatus::Failed,
            err.to_string(),
        ));
        StepDisposition::Failed(err)
    }

    /// Step-type-specific post-action wait.
    async fn post_wait(&self, step: &Step, pre_url: Option<&str>, budget: &RunBudget) {
        match &step.kind {
            StepKind::Click { .. } | StepKind::Dblclick { .. } => {
                // Opportunistic: only commit to the full wait when the click
                // actually kicked off a navigation.
                let sniffed = self.waits.sniff_navigation().await;
                let url_changed = match (pre_url, self.page_url().await.as_deref()) {
                    (Some(before), Some(after)) => before != after,
                    _ => false,
                };
                if sniffed || url_changed {
                    debug!("click on '{}' triggered navigation", step.id);
                    let (bound, _) = budget.clamp_ms(self.config.wait.navigation_timeout_ms);
                    self.waits.wait_for_navigation(bound).await;
                    let (bound, _) = budget.clamp_ms(self.config.wait.idle_timeout_ms);
                    self.waits.wait_for_network_idle(bound).await;
                }
            }
            StepKind::Navigate { .. } | StepKind::OpenTab { .. } => {
                let (bound, _) = budget.clamp_ms(self.config.wait.navigation_timeout_ms);
                self.waits.wait_for_navigation(bound).await;
                self.prime_page().await;
            }
            StepKind::SwitchTab { .. } => {
                self.prime_page().await;
            }
            _ => {}
        }
    }

    /// Current page url, best-effort.
    async fn page_url(&self) -> Option<String> {
        match self.executor.invoke("page.info", json!({})).await {
            Ok(outcome) if !outcome.is_error => outcome
                .json()
                .and_then(|v| v.get("url").and_then(|u| u.as_str()).map(String::from)),
            _ => None,
        }
    }

    /// Prime the page read state after a tab transition.
    async fn prime_page(&self) {
        if let Err(err) = self.executor.invoke("page.read", json!({})).await {
            debug!("page priming failed: {}", err);
        }
    }

    async fn capture_screenshot(&self) -> Option<String> {
        match self.executor.invoke("screenshot", json!({})).await {
            Ok(outcome) if !outcome.is_error => outcome
                .first_image()
                .map(String::from)
                .or_else(|| outcome.first_text().map(String::from)),
            Ok(outcome) => {
                warn!("screenshot capture failed: {}", outcome.error_message());
                None
            }
            Err(err) => {
                warn!("screenshot capture failed: {}", err);
                None
            }
        }
    }

    /// Run a deferred after-script. Logs its own entry for the step; a
    /// failure here is a warning, never a step failure.
    async fn flush_deferred(&self, step: &Step, code: &str) {
        let started = Instant::now();
        match self.executor.invoke("evaluate", json!({ "code": code })).await {
            Ok(outcome) if !outcome.is_error => {
                self.logger.append(
                    RunLogEntry::new(&step.id, StepStatus::Success, "deferred script completed")
                        .with_duration(started.elapsed().as_millis() as u64),
                );
            }
            Ok(outcome) => {
                self.logger.append(RunLogEntry::new(
                    &step.id,
                    StepStatus::Warning,
                    format!("deferred script failed: {}", outcome.error_message()),
                ));
            }
            Err(err) => {
                self.logger.append(RunLogEntry::new(
                    &step.id,
                    StepStatus::Warning,
                    format!("deferred script failed: {}", err),
                ));
            }
        }
    }
}
