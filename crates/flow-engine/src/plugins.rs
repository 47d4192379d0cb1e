//! Typed plugin hook surface.
//!
//! Plugins inject cross-cutting behavior (pausing, auditing) without the
//! engine knowing about concrete implementations. Hook failures are caught
//! by the manager and downgraded to `warning` log entries; plugin
//! misbehavior never crashes a run.

use std::sync::Arc;

use async_trait::async_trait;
use pageflow_core_types::{FlowId, RunId, RunLogEntry, StepStatus};
use tracing::warn;

use crate::errors::FlowError;
use crate::logger::RunLogger;

/// Step identity handed to hooks.
#[derive(Debug, Clone)]
pub struct HookContext {
    pub run_id: RunId,
    pub flow_id: FlowId,
    pub step_id: String,
    pub step_type: String,
}

/// Control object hooks return; `pause` stops the run before the next step.
#[derive(Debug, Clone, Copy, Default)]
pub struct HookDecision {
    pub pause: bool,
}

impl HookDecision {
    pub fn pause() -> Self {
        Self { pause: true }
    }
}

/// Extension points around step and subflow execution. Every hook has a
/// no-op default so plugins implement only what they need.
#[async_trait]
pub trait FlowPlugin: Send + Sync {
    fn name(&self) -> &str;

    async fn before_step(&self, _ctx: &HookContext) -> Result<HookDecision, FlowError> {
        Ok(HookDecision::default())
    }

    async fn after_step(
        &self,
        _ctx: &HookContext,
        _status: StepStatus,
    ) -> Result<(), FlowError> {
        Ok(())
    }

    async fn on_retry(
        &self,
        _ctx: &HookContext,
        _attempt: u32,
        _error: &str,
    ) -> Result<(), FlowError> {
        Ok(())
    }

    async fn on_error(&self, _ctx: &HookContext, _error: &str) -> Result<HookDecision, FlowError> {
        Ok(HookDecision::default())
    }

    async fn subflow_start(&self, _subflow_id: &str) -> Result<(), FlowError> {
        Ok(())
    }

    async fn subflow_end(&self, _subflow_id: &str, _success: bool) -> Result<(), FlowError> {
        Ok(())
    }
}

/// Hook registry. Emission catches every hook error and records it as a
/// warning entry against the current step.
#[derive(Default)]
pub struct PluginManager {
    plugins: Vec<Arc<dyn FlowPlugin>>,
}

impl PluginManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, plugin: Arc<dyn FlowPlugin>) {
        self.plugins.push(plugin);
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub async fn before_step(&self, ctx: &HookContext, logger: &RunLogger) -> bool {
        let mut pause = false;
        for plugin in &self.plugins {
            match plugin.before_step(ctx).await {
                Ok(decision) => pause |= decision.pause,
                Err(err) => self.downgrade(plugin.name(), "beforeStep", &ctx.step_id, err, logger),
            }
        }
        pause
    }

    pub async fn after_step(&self, ctx: &HookContext, status: StepStatus, logger: &RunLogger) {
        for plugin in &self.plugins {
            if let Err(err) = plugin.after_step(ctx, status).await {
                self.downgrade(plugin.name(), "afterStep", &ctx.step_id, err, logger);
            }
        }
    }

    pub async fn on_retry(&self, ctx: &HookContext, attempt: u32, error: &str, logger: &RunLogger) {
        for plugin in &self.plugins {
            if let Err(err) = plugin.on_retry(ctx, attempt, error).await {
                self.downgrade(plugin.name(), "onRetry", &ctx.step_id, err, logger);
            }
        }
    }

    pub async fn on_error(&self, ctx: &HookContext, error: &str, logger: &RunLogger) -> bool {
        let mut pause = false;
        for plugin in &self.plugins {
            match plugin.on_error(ctx, error).await {
                Ok(decision) => pause |= decision.pause,
                Err(err) => self.downgrade(plugin.name(), "onError", &ctx.step_id, err, logger),
            }
        }
        pause
    }

    pub async fn subflow_start(&self, subflow_id: &str, logger: &RunLogger) {
        for plugin in &self.plugins {
            if let Err(err) = plugin.subflow_start(subflow_id).await {
                self.downgrade(plugin.name(), "subflowStart", subflow_id, err, logger);
            }
        }
    }

    pub async fn subflow_end(&self, subflow_id: &str, success: bool, logger: &RunLogger) {
        for plugin in &self.plugins {
            if let Err(err) = plugin.subflow_end(subflow_id, success).await {
                self.downgrade(plugin.name(), "subflowEnd", subflow_id, err, logger);
            }
        }
    }

    fn downgrade(
        &self,
        plugin: &str,
        hook: &str,
        subject: &str,
        err: FlowError,
        logger: &RunLogger,
    ) {
        warn!("plugin {} {} hook failed: {}", plugin, hook, err);
        logger.append(RunLogEntry::new(
            subject,
            StepStatus::Warning,
            format!("plugin {} {} hook failed: {}", plugin, hook, err),
        ));
    }
}
