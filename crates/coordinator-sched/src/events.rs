//! A reference event sink: forwards every event to `tracing` rather
//! than a real log aggregator. Best-effort — nothing here can fail
//! the coordinator.

use async_trait::async_trait;
use coordinator_core::{CoordinatorHandle, EventSink, JobName, Result, TaskId};
use tracing::info;
use uuid::Uuid;

/// Names jobs `"{prefix}-{uuid}"`, using a UUIDv7 for time-ordered,
/// sortable identifiers.
#[derive(Debug, Default)]
pub struct TracingEventSink;

impl TracingEventSink {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EventSink for TracingEventSink {
    async fn new_job(&self, prefix: &str, _coordinator: CoordinatorHandle) -> Result<JobName> {
        let name = JobName(format!("{prefix}-{}", Uuid::now_v7()));
        info!(job = %name, "job registered with event sink");
        Ok(name)
    }

    fn task_event(&self, job: &JobName, task_id: TaskId, message: &str) {
        info!(job = %job, task = %task_id, %message, "task event");
    }

    fn event(&self, job: &JobName, message: &str) {
        info!(job = %job, %message, "job event");
    }
}
