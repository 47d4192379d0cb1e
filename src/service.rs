//! Flow service: wires injected collaborators and storage into the
//! run-invocation surface.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use flow_engine::{
    ActionExecutor, EngineConfig, FlowRunner, NullPageEvents, PageEvents, PluginManager,
};
use flow_locator::PageProbe;
use pageflow_core_types::{Flow, FlowId, FlowSchedule, RunOptions, RunRecord, RunResult};
use pageflow_scheduler::{ScheduleError, ScheduleRuntime, ScheduleTarget, SchedulerConfig};
use pageflow_store::{
    FlowStore, InMemoryFlowStore, InMemoryRunStore, InMemoryScheduleStore, RunStore,
    ScheduleStore,
};
use tracing::info;

/// Top-level handle hosts embed: flow CRUD, run invocation, schedules.
pub struct FlowService {
    flows: Arc<dyn FlowStore>,
    runs: Arc<dyn RunStore>,
    schedules: Arc<dyn ScheduleStore>,
    runner: FlowRunner,
}

impl FlowService {
    pub fn builder() -> FlowServiceBuilder {
        FlowServiceBuilder::default()
    }

    /// Run a stored flow by id.
    pub async fn run_flow(&self, id: &FlowId, options: RunOptions) -> Result<RunResult> {
        let flow = self
            .flows
            .get_flow(id)
            .await
            .with_context(|| format!("loading flow {}", id))?;
        Ok(self.runner.run(&flow, options).await)
    }

    /// Run a flow definition without storing it first.
    pub async fn run_flow_inline(&self, flow: &Flow, options: RunOptions) -> RunResult {
        self.runner.run(flow, options).await
    }

    pub async fn list_flows(&self) -> Result<Vec<Flow>> {
        Ok(self.flows.list_flows().await?)
    }

    pub async fn get_flow(&self, id: &FlowId) -> Result<Flow> {
        Ok(self.flows.get_flow(id).await?)
    }

    pub async fn save_flow(&self, flow: Flow) -> Result<()> {
        info!("saving flow '{}' ({})", flow.name, flow.id);
        Ok(self.flows.save_flow(flow).await?)
    }

    pub async fn delete_flow(&self, id: &FlowId) -> Result<()> {
        Ok(self.flows.delete_flow(id).await?)
    }

    pub async fn runs_for_flow(&self, id: &FlowId) -> Result<Vec<RunRecord>> {
        Ok(self.runs.runs_for_flow(id).await?)
    }

    pub async fn list_schedules(&self) -> Result<Vec<FlowSchedule>> {
        Ok(self.schedules.list_schedules().await?)
    }

    pub async fn save_schedule(&self, schedule: FlowSchedule) -> Result<()> {
        Ok(self.schedules.save_schedule(schedule).await?)
    }

    pub async fn remove_schedule(&self, id: &str) -> Result<()> {
        Ok(self.schedules.remove_schedule(id).await?)
    }

    /// Build a scheduler bound to this service. Call `start()` on the
    /// returned runtime to spawn the polling loop.
    pub fn scheduler(self: &Arc<Self>, config: SchedulerConfig) -> Arc<ScheduleRuntime> {
        Arc::new(ScheduleRuntime::new(
            self.schedules.clone(),
            self.clone(),
            config,
        ))
    }
}

#[async_trait]
impl ScheduleTarget for FlowService {
    async fn run_scheduled(&self, schedule: &FlowSchedule) -> Result<(), ScheduleError> {
        let options = RunOptions {
            variables: schedule.variables.clone(),
            ..RunOptions::default()
        };
        let result = self
            .run_flow(&schedule.flow_id, options)
            .await
            .map_err(|err| ScheduleError::RunFailed(err.to_string()))?;

        if result.success {
            Ok(())
        } else {
            Err(ScheduleError::RunFailed(format!(
                "run {} failed ({}/{} steps ok)",
                result.run_id, result.summary.success, result.summary.total
            )))
        }
    }
}

/// Assembles a [`FlowService`]. The executor and probe are mandatory; the
/// event source defaults to a silent bus and storage to the in-memory
/// implementations.
#[derive(Default)]
pub struct FlowServiceBuilder {
    executor: Option<Arc<dyn ActionExecutor>>,
    probe: Option<Arc<dyn PageProbe>>,
    events: Option<Arc<dyn PageEvents>>,
    plugins: Option<PluginManager>,
    flows: Option<Arc<dyn FlowStore>>,
    runs: Option<Arc<dyn RunStore>>,
    schedules: Option<Arc<dyn ScheduleStore>>,
    config: Option<EngineConfig>,
}

impl FlowServiceBuilder {
    pub fn executor(mut self, executor: Arc<dyn ActionExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn probe(mut self, probe: Arc<dyn PageProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn events(mut self, events: Arc<dyn PageEvents>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn plugins(mut self, plugins: PluginManager) -> Self {
        self.plugins = Some(plugins);
        self
    }

    pub fn flow_store(mut self, store: Arc<dyn FlowStore>) -> Self {
        self.flows = Some(store);
        self
    }

    pub fn run_store(mut self, store: Arc<dyn RunStore>) -> Self {
        self.runs = Some(store);
        self
    }

    pub fn schedule_store(mut self, store: Arc<dyn ScheduleStore>) -> Self {
        self.schedules = Some(store);
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn build(self) -> Result<FlowService> {
        let executor = self
            .executor
            .ok_or_else(|| anyhow!("FlowService requires an action executor"))?;
        let probe = self
            .probe
            .ok_or_else(|| anyhow!("FlowService requires a page probe"))?;
        let events = self.events.unwrap_or_else(|| NullPageEvents::new());

        let flows: Arc<dyn FlowStore> =
            self.flows.unwrap_or_else(|| Arc::new(InMemoryFlowStore::new()));
        let runs: Arc<dyn RunStore> =
            self.runs.unwrap_or_else(|| Arc::new(InMemoryRunStore::new()));
        let schedules: Arc<dyn ScheduleStore> = self
            .schedules
            .unwrap_or_else(|| Arc::new(InMemoryScheduleStore::new()));

        let mut runner = FlowRunner::new(executor, probe, events)
            .with_config(self.config.unwrap_or_default())
            .with_run_store(runs.clone());
        if let Some(plugins) = self.plugins {
            runner = runner.with_plugins(plugins);
        }

        Ok(FlowService {
            flows,
            runs,
            schedules,
            runner,
        })
    }
}
