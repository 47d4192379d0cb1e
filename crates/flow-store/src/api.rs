//! Storage boundary traits.

use async_trait::async_trait;
use pageflow_core_types::{Flow, FlowId, FlowSchedule, RunRecord};

use crate::StoreResult;

#[async_trait]
pub trait FlowStore: Send + Sync {
    async fn list_flows(&self) -> StoreResult<Vec<Flow>>;
    async fn get_flow(&self, id: &FlowId) -> StoreResult<Flow>;
    async fn save_flow(&self, flow: Flow) -> StoreResult<()>;
    async fn delete_flow(&self, id: &FlowId) -> StoreResult<()>;
}

#[async_trait]
pub trait RunStore: Send + Sync {
    /// Append one run record. Implementations trim on write, keeping at most
    /// the configured number of most-recent records per flow.
    async fn append_run(&self, record: RunRecord) -> StoreResult<()>;

    /// Records for one flow, oldest first.
    async fn runs_for_flow(&self, flow_id: &FlowId) -> StoreResult<Vec<RunRecord>>;
}

#[async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn list_schedules(&self) -> StoreResult<Vec<FlowSchedule>>;
    async fn save_schedule(&self, schedule: FlowSchedule) -> StoreResult<()>;
    async fn remove_schedule(&self, id: &str) -> StoreResult<()>;
}
