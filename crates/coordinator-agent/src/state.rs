//! The state store: three in-memory ordered maps plus two
//! monotonic counters, owned exclusively by the coordinator's mailbox loop.
//! No locks — the mailbox processes one message at a time.

use std::collections::BTreeMap;
use std::sync::Arc;

use coordinator_core::{
    DataInfo, InputId, JobInfo, JobName, Pipeline, RunId, StageInfo, TaskId, TaskInfo, TaskSpec,
};

/// All mutable job state. `BTreeMap`s give deterministic iteration order
/// keyed by the monotonic ids themselves.
pub struct StateStore {
    pub job_name: JobName,
    pub job_info: Arc<JobInfo>,
    pub pipeline: Pipeline,

    pub tasks: BTreeMap<TaskId, TaskInfo>,
    pub data_map: BTreeMap<InputId, DataInfo>,
    pub stage_info: BTreeMap<String, StageInfo>,

    next_taskid: u64,
    next_runid: u64,
}

impl StateStore {
    pub fn new(job_name: JobName, job_info: Arc<JobInfo>, pipeline: Pipeline) -> Self {
        Self {
            job_name,
            job_info,
            pipeline,
            tasks: BTreeMap::new(),
            data_map: BTreeMap::new(),
            stage_info: BTreeMap::new(),
            next_taskid: 0,
            next_runid: 0,
        }
    }

    /// Allocate a fresh, never-reused task-id.
    pub fn alloc_task_id(&mut self) -> TaskId {
        let id = TaskId(self.next_taskid);
        self.next_taskid += 1;
        id
    }

    /// Allocate a fresh, never-reused run-id.
    pub fn alloc_run_id(&mut self) -> RunId {
        let id = RunId(self.next_runid);
        self.next_runid += 1;
        id
    }

    pub fn insert_task(&mut self, spec: TaskSpec) -> TaskId {
        let id = spec.task_id;
        self.tasks.insert(id, TaskInfo::new(spec));
        id
    }

    /// Move a task-id from `running` to `stopped` in its stage.
    pub fn mark_stopped(&mut self, task_id: TaskId) {
        let stage = self.tasks[&task_id].spec.stage.clone();
        if let Some(info) = self.stage_info.get_mut(&stage) {
            info.running.remove(&task_id);
            info.stopped.insert(task_id);
        }
        self.check_stage_accounting(&stage);
    }

    /// Move a task-id from `stopped`/not-yet-submitted into `running` ahead
    /// of a submission. A regenerated task may already be in `done` (its
    /// earlier run succeeded before an ancestor's data went unreachable);
    /// pull it back out so the stage's accounting (`all == |done| +
    /// |running| + |stopped|`) stays correct while it re-runs.
    pub fn mark_running(&mut self, task_id: TaskId) {
        let stage = self.tasks[&task_id].spec.stage.clone();
        if let Some(info) = self.stage_info.get_mut(&stage) {
            info.stopped.remove(&task_id);
            info.done.retain(|&id| id != task_id);
            info.running.insert(task_id);
        }
        self.check_stage_accounting(&stage);
    }

    /// Move a task-id into `done`, idempotently: a task-id may complete more
    /// than once across its lifetime (a regenerated producer re-completing),
    /// and `done` must not accumulate duplicate entries. Returns whether the
    /// stage is now closed (every allocated task-id has reached `done`).
    pub fn mark_done(&mut self, task_id: TaskId, stage: &str) -> bool {
        let closed = if let Some(info) = self.stage_info.get_mut(stage) {
            info.running.remove(&task_id);
            if !info.done.contains(&task_id) {
                info.done.push(task_id);
            }
            info.is_closed()
        } else {
            false
        };
        self.check_stage_accounting(stage);
        closed
    }

    /// Debug-only self-check that the stage accounting invariant holds:
    /// `all == len(done) + len(running) + len(stopped)`. A no-op in release
    /// builds (`debug_assert_eq!` compiles out); never used to gate
    /// production behavior.
    pub fn check_stage_accounting(&self, stage: &str) {
        if let Some(info) = self.stage_info.get(stage) {
            debug_assert_eq!(
                info.all,
                info.done.len() + info.running.len() + info.stopped.len(),
                "stage accounting invariant violated for stage {stage}"
            );
        }
    }
}
