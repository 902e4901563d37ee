//! Job, task, run and input identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A job's identity: a plain string rather than a generated UUID, since the
/// name is chosen (or prefixed) by the submitter and persisted as a path
/// component (`<job_home>/<job_name>`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct JobName(pub String);

impl fmt::Display for JobName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A task identifier. Strictly monotonic per job — minted
/// by the state store's `next_taskid` counter, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// A task run identifier. Strictly monotonic per job, one per submission
/// attempt (first-run or re-run) of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RunId(pub u64);

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Who produced a given piece of data: either a task, or the synthetic
/// "input" producer standing in for the job's initial inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ProducerId {
    /// The job's initial inputs; no regenerating task exists for these.
    Input,
    /// A task in this job's dependency DAG.
    Task(TaskId),
}

impl fmt::Display for ProducerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProducerId::Input => write!(f, "input"),
            ProducerId::Task(id) => write!(f, "{id}"),
        }
    }
}

/// Names one piece of data in the job: the pair `(producer_task_id,
/// position)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InputId {
    pub producer: ProducerId,
    pub position: usize,
}

impl InputId {
    pub fn new(producer: ProducerId, position: usize) -> Self {
        Self { producer, position }
    }

    pub fn from_task(task_id: TaskId, position: usize) -> Self {
        Self::new(ProducerId::Task(task_id), position)
    }

    pub fn initial(position: usize) -> Self {
        Self::new(ProducerId::Input, position)
    }
}

impl fmt::Display for InputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.producer, self.position)
    }
}
