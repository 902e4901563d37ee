//! The coordinator's mailbox message type and the handle external
//! collaborators use to send it messages.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::ids::{InputId, TaskId};
use crate::model::TaskOutput;

/// Whether a `submit_tasks` batch is a first submission or a resubmission
/// after failure/regeneration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubmitMode {
    /// Preferred host is passed to the scheduler to exploit data locality.
    FirstRun,
    /// Host selection is delegated to the scheduler (the preferred host
    /// likely failed).
    ReRun,
}

/// The outcome a worker (proxied by the cluster scheduler) reports for a
/// task attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TaskResult {
    Done { outputs: Vec<TaskOutput> },
    Error { reason: String },
    Fatal { reason: String },
    InputError { input_id: InputId, hosts: Vec<String> },
}

/// Messages accepted by a coordinator's mailbox.
#[derive(Debug, Clone)]
pub enum CoordinatorMsg {
    SubmitTasks {
        mode: SubmitMode,
        task_ids: Vec<TaskId>,
    },
    /// Also sent synthetically for the synthetic `input` stage.
    StageDone {
        stage: String,
    },
    TaskDone {
        task_id: TaskId,
        host: String,
        result: TaskResult,
    },
    PipelineDone,
    KillJob {
        reason: String,
    },
}

/// What the rest of the system uses to talk to a running coordinator.
/// Cloneable; dropping every clone causes the mailbox loop to observe a
/// closed channel and exit, the same as an explicit `kill_job`.
pub type CoordinatorHandle = mpsc::UnboundedSender<CoordinatorMsg>;
