//! In-memory reference implementations.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use pageflow_core_types::{Flow, FlowId, FlowSchedule, RunRecord};
use tracing::debug;

use crate::api::{FlowStore, RunStore, ScheduleStore};
use crate::errors::StoreError;
use crate::StoreResult;

/// Default number of run records kept per flow.
pub const DEFAULT_RUN_RETENTION: usize = 20;

#[derive(Default)]
pub struct InMemoryFlowStore {
    flows: DashMap<String, Flow>,
}

impl InMemoryFlowStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FlowStore for InMemoryFlowStore {
    async fn list_flows(&self) -> StoreResult<Vec<Flow>> {
        Ok(self.flows.iter().map(|e| e.value().clone()).collect())
    }

    async fn get_flow(&self, id: &FlowId) -> StoreResult<Flow> {
        self.flows
            .get(&id.0)
            .map(|e| e.value().clone())
            .ok_or_else(|| StoreError::FlowNotFound(id.0.clone()))
    }

    async fn save_flow(&self, flow: Flow) -> StoreResult<()> {
        self.flows.insert(flow.id.0.clone(), flow);
        Ok(())
    }

    async fn delete_flow(&self, id: &FlowId) -> StoreResult<()> {
        self.flows
            .remove(&id.0)
            .map(|_| ())
            .ok_or_else(|| StoreError::FlowNotFound(id.0.clone()))
    }
}

/// Run history with trim-on-write retention per flow id.
pub struct InMemoryRunStore {
    runs: Mutex<Vec<RunRecord>>,
    retention: usize,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_RUN_RETENTION)
    }

    pub fn with_retention(retention: usize) -> Self {
        Self {
            runs: Mutex::new(Vec::new()),
            retention: retention.max(1),
        }
    }
}

impl Default for InMemoryRunStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RunStore for InMemoryRunStore {
    async fn append_run(&self, record: RunRecord) -> StoreResult<()> {
        let mut runs = self.runs.lock();
        let flow_id = record.flow_id.clone();
        runs.push(record);

        let for_flow = runs.iter().filter(|r| r.flow_id == flow_id).count();
        if for_flow > self.retention {
            let mut to_drop = for_flow - self.retention;
            runs.retain(|r| {
                if to_drop > 0 && r.flow_id == flow_id {
                    to_drop -= 1;
                    return false;
                }
                true
            });
            debug!(
                "trimmed run history for flow {} to {} records",
                flow_id, self.retention
            );
        }
        Ok(())
    }

    async fn runs_for_flow(&self, flow_id: &FlowId) -> StoreResult<Vec<RunRecord>> {
        Ok(self
            .runs
            .lock()
            .iter()
            .filter(|r| r.flow_id == *flow_id)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryScheduleStore {
    schedules: DashMap<String, FlowSchedule>,
}

impl InMemoryScheduleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ScheduleStore for InMemoryScheduleStore {
    async fn list_schedules(&self) -> StoreResult<Vec<FlowSchedule>> {
        Ok(self.schedules.iter().map(|e| e.value().clone()).collect())
    }

    async fn save_schedule(&self, schedule: FlowSchedule) -> StoreResult<()> {
        self.schedules.insert(schedule.id.clone(), schedule);
        Ok(())
    }

    async fn remove_schedule(&self, id: &str) -> StoreResult<()> {
        self.schedules
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::ScheduleNotFound(id.to_string()))
    }
}
