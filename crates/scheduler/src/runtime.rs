//! Schedule polling loop.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use pageflow_core_types::FlowSchedule;
use pageflow_store::ScheduleStore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::ScheduleError;

/// What a firing schedule invokes. The host wires this to its flow service.
#[async_trait]
pub trait ScheduleTarget: Send + Sync {
    async fn run_scheduled(&self, schedule: &FlowSchedule) -> Result<(), ScheduleError>;
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Poll interval for due schedules.
    pub tick: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(5),
        }
    }
}

/// Background scheduler over a schedule store.
pub struct ScheduleRuntime {
    store: Arc<dyn ScheduleStore>,
    target: Arc<dyn ScheduleTarget>,
    config: SchedulerConfig,
    cancel: CancellationToken,
}

impl ScheduleRuntime {
    pub fn new(
        store: Arc<dyn ScheduleStore>,
        target: Arc<dyn ScheduleTarget>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            target,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that stops the loop when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Spawn the polling loop.
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        let runtime = self.clone();
        tokio::spawn(async move {
            info!("scheduler started (tick {:?})", runtime.config.tick);
            loop {
                tokio::select! {
                    _ = runtime.cancel.cancelled() => {
                        info!("scheduler stopped");
                        return;
                    }
                    _ = tokio::time::sleep(runtime.config.tick) => {
                        runtime.fire_due().await;
                    }
                }
            }
        })
    }

    /// Fire every due schedule once. Public for tests and manual ticks.
    pub async fn fire_due(&self) {
        let schedules = match self.store.list_schedules().await {
            Ok(schedules) => schedules,
            Err(err) => {
                warn!("listing schedules failed: {}", err);
                return;
            }
        };

        let now = Utc::now();
        for mut schedule in schedules {
            if !schedule.is_due(now) {
                continue;
            }

            debug!("schedule '{}' firing for flow {}", schedule.id, schedule.flow_id);
            if let Err(err) = self.target.run_scheduled(&schedule).await {
                warn!("schedule '{}' run failed: {}", schedule.id, err);
            }

            schedule.last_run_at = Some(now);
            if !schedule.repeat {
                schedule.enabled = false;
            }
            if let Err(err) = self.store.save_schedule(schedule).await {
                warn!("persisting schedule state failed: {}", err);
            }
        }
    }
}
