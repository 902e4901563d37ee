//! Data model entities: task specs/info/runs, data info, stage info,
//! task outputs, and the values that travel between them.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::ids::{InputId, JobName, ProducerId, RunId, TaskId};
use crate::pipeline::Grouping;

/// Where a piece of data lives on a given host: a path on that host's local
/// disk, a URL reachable from other hosts, or purely in-memory (no
/// durable reference, only reachable while the producing task's process is
/// alive).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataRef {
    Path(PathBuf),
    Url(String),
    Memory,
}

/// One artifact produced by a task, identified by its position within that
/// task's outputs. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOutput {
    pub position: usize,
    pub label: String,
    pub host: String,
    pub location: DataRef,
    /// Opaque reference to an in-process handle (e.g. a cached buffer) kept
    /// alive alongside the durable `location`. Never serialized out to the
    /// scheduler; local to this coordinator's process.
    pub local_handle: Option<String>,
}

/// Who describes the provenance of an input: which task (or the synthetic
/// `input` producer) produced it, and under what label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub producer: ProducerId,
    pub position: usize,
    pub label: String,
}

/// Per-input bookkeeping: where it can be found, and how many times each
/// host has failed to serve it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataInfo {
    pub source: SourceDescriptor,
    /// host -> reference. A `BTreeMap` so iteration (and therefore which
    /// host is tried first) is deterministic.
    pub locations: BTreeMap<String, DataRef>,
    /// host -> failure count. Monotonic non-decreasing.
    pub failures: BTreeMap<String, u32>,
}

impl DataInfo {
    pub fn new(source: SourceDescriptor, locations: BTreeMap<String, DataRef>) -> Self {
        let failures = locations.keys().cloned().map(|h| (h, 0)).collect();
        Self {
            source,
            locations,
            failures,
        }
    }

    /// Hosts that still have a recorded location and whose failure count is
    /// below `cap`.
    pub fn usable_hosts(&self, cap: u32) -> Vec<String> {
        self.locations
            .keys()
            .filter(|host| self.failures.get(*host).copied().unwrap_or(0) < cap)
            .cloned()
            .collect()
    }
}

/// A group key allocated by the stage builder: the label the grouping
/// assigned to a bucket, plus the preferred host to exploit data locality
/// on first run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupKey {
    pub label: String,
    pub preferred_host: Option<String>,
}

/// An opaque handle to the worker binary a task should run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerHandle {
    pub binary: String,
}

/// An opaque schedule policy produced by `job_schedule_option`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulePolicy {
    pub name: String,
}

/// Immutable specification of one task, built by the stage builder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    pub task_id: TaskId,
    pub stage: String,
    pub group: GroupKey,
    pub grouping: Grouping,
    pub input_ids: Vec<InputId>,
    pub job_name: JobName,
    pub job_env: BTreeMap<String, String>,
    pub worker: WorkerHandle,
    pub schedule: SchedulePolicy,
}

/// Which host a run attempt should target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HostChoice {
    Preferred(String),
    Any,
}

/// One submission attempt of a task. Ephemeral — not kept once the
/// task reaches a new run or completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRun {
    pub run_id: RunId,
    pub task_id: TaskId,
    pub host: HostChoice,
    /// The (host, reference) chosen per input for this attempt, excluding
    /// hosts already known to have failed.
    pub inputs_snapshot: BTreeMap<InputId, (String, DataRef)>,
    pub failed_hosts: BTreeSet<String>,
}

/// Mutable bookkeeping for a task across its lifetime. Created at spec
/// creation time; mutated by the failure handler and on completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInfo {
    pub spec: TaskSpec,
    pub outputs: Vec<TaskOutput>,
    pub failed_count: u32,
    pub failed_hosts: BTreeSet<String>,
    /// Other task-ids parked waiting for this task's regeneration.
    pub waiters: BTreeSet<TaskId>,
}

impl TaskInfo {
    pub fn new(spec: TaskSpec) -> Self {
        Self {
            spec,
            outputs: Vec::new(),
            failed_count: 0,
            failed_hosts: BTreeSet::new(),
            waiters: BTreeSet::new(),
        }
    }

    pub fn is_done(&self) -> bool {
        !self.outputs.is_empty()
    }
}

/// Per-stage accounting: `all == len(done) + len(running)
/// + len(stopped)` at all times after the stage is started.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageInfo {
    pub all: usize,
    pub done: Vec<TaskId>,
    pub running: BTreeSet<TaskId>,
    pub stopped: BTreeSet<TaskId>,
}

impl StageInfo {
    pub fn new(all: usize) -> Self {
        Self {
            all,
            done: Vec::new(),
            running: BTreeSet::new(),
            stopped: BTreeSet::new(),
        }
    }

    /// Whether every task allocated to this stage has reached `done`.
    pub fn is_closed(&self) -> bool {
        self.done.len() == self.all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::ProducerId;

    fn data_info(hosts: &[&str]) -> DataInfo {
        let locations = hosts
            .iter()
            .map(|h| (h.to_string(), DataRef::Url(format!("http://{h}/blob"))))
            .collect();
        DataInfo::new(
            SourceDescriptor {
                producer: ProducerId::Task(TaskId(0)),
                position: 0,
                label: "out".into(),
            },
            locations,
        )
    }

    #[test]
    fn usable_hosts_excludes_hosts_at_cap() {
        let mut info = data_info(&["h1", "h2"]);
        *info.failures.get_mut("h1").unwrap() = 3;
        let usable = info.usable_hosts(3);
        assert_eq!(usable, vec!["h2".to_string()]);
    }

    #[test]
    fn usable_hosts_empty_once_all_hosts_exhausted() {
        let mut info = data_info(&["h1", "h2"]);
        *info.failures.get_mut("h1").unwrap() = 3;
        *info.failures.get_mut("h2").unwrap() = 4;
        assert!(info.usable_hosts(3).is_empty());
    }

    #[test]
    fn stage_info_closes_when_all_tasks_done() {
        let mut stage = StageInfo::new(2);
        assert!(!stage.is_closed());
        stage.done.push(TaskId(0));
        stage.done.push(TaskId(1));
        assert!(stage.is_closed());
    }
}
