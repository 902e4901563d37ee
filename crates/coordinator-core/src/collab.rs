//! External collaborator traits: the cluster-wide task scheduler,
//! the event/log sink, and the job-pack store. All three are out of scope
//! to implement in full — these traits are the coordinator's only contact
//! with them.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::ids::JobName;
use crate::message::CoordinatorHandle;
use crate::model::{TaskRun, TaskSpec};

/// The cluster-wide task scheduler: given a submitted task, it assigns
/// a worker and eventually reports results back via the coordinator's
/// mailbox. One instance is shared by every coordinator in the process;
/// implementations must be safe under concurrent calls from many jobs.
#[async_trait]
pub trait ClusterScheduler: Send + Sync {
    /// Register a job with the scheduler so it knows where to route
    /// `task_done` callbacks.
    async fn new_job(
        &self,
        job_name: &JobName,
        coordinator: CoordinatorHandle,
        timeout: Duration,
    ) -> Result<()>;

    /// Admit a task for execution. Submission timeout is fixed at 30s by
    /// the submission dispatcher; callers pass it through here so the
    /// scheduler enforces the same bound.
    async fn new_task(&self, task_spec: TaskSpec, task_run: TaskRun, timeout: Duration)
    -> Result<()>;
}

/// The best-effort event/log sink. Drops are permitted; nothing
/// observable about job correctness may depend on an event being recorded.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Register a new job with the sink, returning the job name it should
    /// be known by (the sink may apply its own naming/prefixing rules).
    async fn new_job(&self, prefix: &str, coordinator: CoordinatorHandle) -> Result<JobName>;

    /// Emit a free-form event scoped to one task.
    fn task_event(&self, job: &JobName, task_id: crate::ids::TaskId, message: &str);

    /// Emit a free-form job-level event.
    fn event(&self, job: &JobName, message: &str);
}

/// The job-pack validator and on-disk store. Persists the job-pack
/// bytes to `<job_home>/<job_name>`; everything else about a job is
/// in-memory.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn save(&self, job_home: &Path, job_name: &JobName, job_pack: &[u8]) -> Result<()>;
}
