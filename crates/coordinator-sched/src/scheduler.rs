//! Reference implementations of the cluster scheduler contract: one
//! that simulates worker execution well enough to drive the demo CLI's
//! happy path, and one that replays a scripted sequence of results per
//! task, for deterministic scenario tests.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use coordinator_core::{
    ClusterScheduler, CoordinatorHandle, CoordinatorMsg, DataRef, Error, HostChoice, JobName,
    Result, TaskOutput, TaskResult, TaskRun, TaskSpec,
};

/// Simulates a cluster by round-robining a fixed host pool and always
/// reporting success with one dummy output per task. Good enough to
/// exercise the coordinator's happy path end-to-end (the demo CLI); not a
/// substitute for the real out-of-scope scheduler.
pub struct HostPoolScheduler {
    inner: Mutex<HostPoolInner>,
}

struct HostPoolInner {
    hosts: Vec<String>,
    next_host: usize,
    coordinator: Option<CoordinatorHandle>,
}

impl HostPoolScheduler {
    pub fn new(hosts: Vec<String>) -> Self {
        Self {
            inner: Mutex::new(HostPoolInner {
                    hosts,
                    next_host: 0,
                    coordinator: None,
            }),
        }
    }

    fn pick_host(&self, preferred: &HostChoice) -> String {
        let mut inner = self.inner.lock().expect("host pool lock poisoned");
        match preferred {
            HostChoice::Preferred(host) => host.clone(),
            HostChoice::Any => {
                let host = inner
                    .hosts
                    .get(inner.next_host % inner.hosts.len().max(1))
                    .cloned()
                    .unwrap_or_else(|| "any".to_string());
                inner.next_host += 1;
                host
            }
        }
    }
}

#[async_trait]
impl ClusterScheduler for HostPoolScheduler {
    async fn new_job(
        &self,
        _job_name: &JobName,
        coordinator: CoordinatorHandle,
        _timeout: Duration,
    ) -> Result<()> {
        self.inner.lock().expect("host pool lock poisoned").coordinator = Some(coordinator);
        Ok(())
    }

    async fn new_task(&self, spec: TaskSpec, run: TaskRun, _timeout: Duration) -> Result<()> {
        let coordinator = self
            .inner
            .lock()
            .expect("host pool lock poisoned")
            .coordinator
            .clone()
            .ok_or_else(|| Error::Internal("new_task before new_job".to_string()))?;
        let host = self.pick_host(&run.host);
        let task_id = spec.task_id;

        tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(1)).await;
                let outputs = vec![TaskOutput {
                        position: 0,
                        label: format!("{}-out", spec.stage),
                        host: host.clone(),
                        location: DataRef::Memory,
                        local_handle: None,
                }];
                let _ = coordinator.send(CoordinatorMsg::TaskDone {
                        task_id,
                        host,
                        result: TaskResult::Done { outputs },
                });
        });
        Ok(())
    }
}

/// One canned response for a task's `n`th submission attempt.
#[derive(Debug, Clone)]
pub struct ScriptedResponse {
    pub host: String,
    pub result: TaskResult,
}

impl ScriptedResponse {
    pub fn done(host: impl Into<String>, outputs: Vec<TaskOutput>) -> Self {
        Self {
            host: host.into(),
            result: TaskResult::Done { outputs },
        }
    }

    pub fn error(host: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            result: TaskResult::Error {
                reason: reason.into(),
            },
        }
    }

    pub fn fatal(host: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            result: TaskResult::Fatal {
                reason: reason.into(),
            },
        }
    }

    pub fn input_error(
        host: impl Into<String>,
        input_id: coordinator_core::InputId,
        hosts: Vec<String>,
    ) -> Self {
        Self {
            host: host.into(),
            result: TaskResult::InputError { input_id, hosts },
        }
    }
}

/// A [`ClusterScheduler`] double that replays a pre-loaded queue of
/// responses per task-id, one per submission attempt, for the scenario
/// tests in `coordinator-agent`'s test suite. Tasks with no
/// script left default to an immediate `Done` with no outputs.
pub struct ScriptedScheduler {
    inner: Mutex<ScriptedInner>,
}

struct ScriptedInner {
    coordinator: Option<CoordinatorHandle>,
    scripts: BTreeMap<coordinator_core::TaskId, VecDeque<ScriptedResponse>>,
    submissions: Vec<(coordinator_core::TaskId, coordinator_core::RunId)>,
}

impl ScriptedScheduler {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(ScriptedInner {
                    coordinator: None,
                    scripts: BTreeMap::new(),
                    submissions: Vec::new(),
            }),
        }
    }

    /// Queue the responses a task should receive, one per submission
    /// attempt, in order.
    pub fn script(&self, task_id: coordinator_core::TaskId, responses: Vec<ScriptedResponse>) {
        self.inner
            .lock()
            .expect("scripted scheduler lock poisoned")
            .scripts
            .insert(task_id, responses.into());
    }

    /// Every `(task_id, run_id)` pair submitted so far, in submission
    /// order — lets tests assert on retry counts without reaching into
    /// coordinator-private state.
    pub fn submissions(&self) -> Vec<(coordinator_core::TaskId, coordinator_core::RunId)> {
        self.inner
            .lock()
            .expect("scripted scheduler lock poisoned")
            .submissions
            .clone()
    }
}

impl Default for ScriptedScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClusterScheduler for ScriptedScheduler {
    async fn new_job(
        &self,
        _job_name: &JobName,
        coordinator: CoordinatorHandle,
        _timeout: Duration,
    ) -> Result<()> {
        self.inner
            .lock()
            .expect("scripted scheduler lock poisoned")
            .coordinator = Some(coordinator);
        Ok(())
    }

    async fn new_task(&self, spec: TaskSpec, run: TaskRun, _timeout: Duration) -> Result<()> {
        let (coordinator, response) = {
            let mut inner = self.inner.lock().expect("scripted scheduler lock poisoned");
            inner.submissions.push((spec.task_id, run.run_id));
            let coordinator = inner
                .coordinator
                .clone()
                .ok_or_else(|| Error::Internal("new_task before new_job".to_string()))?;
            let response = inner
                .scripts
                .get_mut(&spec.task_id)
                .and_then(|q| q.pop_front())
                .unwrap_or_else(|| {
                    let host = match &run.host {
                        HostChoice::Preferred(h) => h.clone(),
                        HostChoice::Any => "any".to_string(),
                    };
                    // A task with nothing scripted succeeds by default,
                    // producing one output — enough for a downstream stage
                    // to have something to group.
                    let outputs = vec![TaskOutput {
                            position: 0,
                            label: format!("{}-out", spec.stage),
                            host: host.clone(),
                            location: DataRef::Memory,
                            local_handle: None,
                    }];
                    ScriptedResponse::done(host, outputs)
            });
            (coordinator, response)
        };

        tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(1)).await;
                let _ = coordinator.send(CoordinatorMsg::TaskDone {
                        task_id: spec.task_id,
                        host: response.host,
                        result: response.result,
                });
        });
        Ok(())
    }
}
