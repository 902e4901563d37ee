//! The job coordinator: a single-mailbox agent that owns all
//! mutable state for one job and drives it from accepted job-pack to
//! terminal state.
//!
//! `spawn_coordinator` is the "intake API" entry point: it registers
//! the job with the event sink and cluster scheduler, compiles the
//! pipeline, and starts the mailbox loop on its own `tokio` task. Every
//! other crate talks to a running coordinator exclusively through its
//! [`CoordinatorHandle`].

pub mod builder;
pub mod dispatch;
pub mod failure;
pub mod state;

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use coordinator_config::RetryConfig;
use coordinator_core::{
    ClusterScheduler, CoordinatorHandle, CoordinatorMsg, DataRef, EventSink, HostChoice, InputId,
    JobInfo, JobName, JobStore, PipelineLibrary, ProducerId, SchedulePolicy, StageTransition,
    SubmitMode, TaskId, TaskOutput, TaskResult, TaskRun,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use crate::failure::{InputErrorOutcome, RetryOutcome};
use crate::state::StateStore;

/// How long `spawn_coordinator` waits for the coordinator to announce
/// `job_started` before treating startup as failed.
const STARTUP_TIMEOUT: Duration = Duration::from_secs(60);

/// How the mailbox loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalState {
    /// The pipeline's last stage completed.
    Completed,
    /// `kill_job` was processed, or a task reported `fatal`, or submission
    /// to the scheduler failed irrecoverably.
    Killed(String),
}

/// A spawned coordinator: the handle other components use to send it
/// messages, the job name it announced, and a join handle resolving to the
/// terminal state once the job ends.
pub struct CoordinatorJob {
    pub handle: CoordinatorHandle,
    pub job_name: JobName,
    pub join: tokio::task::JoinHandle<TerminalState>,
}

/// Validate and spawn a coordinator for one job.
///
/// Registers with the event sink and cluster scheduler, persists the
/// job-pack via the job store, compiles the pipeline, and starts the
/// mailbox loop. On any init-time failure no coordinator task is
/// left running.
pub async fn spawn_coordinator(
    job_info: JobInfo,
    job_pack: Vec<u8>,
    job_home: PathBuf,
    config: RetryConfig,
    pipeline_lib: Arc<dyn PipelineLibrary>,
    scheduler: Arc<dyn ClusterScheduler>,
    event_sink: Arc<dyn EventSink>,
    job_store: Arc<dyn JobStore>,
) -> coordinator_core::Result<CoordinatorJob> {
    let pipeline = pipeline_lib
        .job_from_jobinfo(&job_info)
        .map_err(coordinator_core::Error::UnsupportedPipeline)?;

    let (tx, rx): (CoordinatorHandle, mpsc::UnboundedReceiver<CoordinatorMsg>) =
        mpsc::unbounded_channel();

    let job_name = event_sink.new_job(&job_info.name_prefix, tx.clone()).await?;

    job_store.save(&job_home, &job_name, &job_pack).await?;

    scheduler
        .new_job(&job_name, tx.clone(), STARTUP_TIMEOUT)
        .await?;

    let schedule = pipeline_lib.job_schedule_option(&job_info);
    let state = StateStore::new(job_name.clone(), Arc::new(job_info), pipeline);

    let coordinator = Coordinator {
        state,
        config,
        pipeline_lib,
        scheduler,
        event_sink,
        schedule,
        self_handle: tx.clone(),
        // Seeded per-coordinator from the thread-local CSPRNG. `StdRng` rather than `ThreadRng`
        // itself so the coordinator's future stays `Send` across awaits.
        rng: StdRng::seed_from_u64(rand::rng().random()),
    };

    let (started_tx, started_rx) = oneshot::channel();
    let join = tokio::spawn(coordinator.run(rx, started_tx));

    // Synthesize the dummy completed "input" stage: this
    // kicks off stage-building for the pipeline's first real stage.
    let _ = tx.send(CoordinatorMsg::StageDone {
        stage: "input".to_string(),
    });

    match tokio::time::timeout(STARTUP_TIMEOUT, started_rx).await {
        Ok(Ok(())) => Ok(CoordinatorJob {
            handle: tx,
            job_name,
            join,
        }),
        _ => {
            let _ = tx.send(CoordinatorMsg::KillJob {
                reason: "coordinator did not start".to_string(),
            });
            Err(coordinator_core::Error::StartupTimeout)
        }
    }
}

/// Outcome of processing one mailbox message.
enum Step {
    Continue,
    Terminated(TerminalState),
}

struct Coordinator {
    state: StateStore,
    config: RetryConfig,
    pipeline_lib: Arc<dyn PipelineLibrary>,
    scheduler: Arc<dyn ClusterScheduler>,
    event_sink: Arc<dyn EventSink>,
    schedule: SchedulePolicy,
    self_handle: CoordinatorHandle,
    rng: StdRng,
}

// StdRng (Send + Sync) backs the per-task jitter source so `Coordinator`'s
// future remains `Send`; see `spawn_coordinator` for how it's seeded.

impl Coordinator {
    /// The mailbox loop: messages are processed strictly
    /// serially, so no locking is needed on any of `self.state`'s maps.
    async fn run(
        mut self,
        mut rx: mpsc::UnboundedReceiver<CoordinatorMsg>,
        started_tx: oneshot::Sender<()>,
    ) -> TerminalState {
        let _ = started_tx.send(());

        let terminal = loop {
            let Some(msg) = rx.recv().await else {
                // Every handle dropped (intake gone): treated the same as
                // an explicit kill.
                break TerminalState::Killed("coordinator handle dropped".to_string());
            };
            match self.handle(msg).await {
                Step::Continue => continue,
                Step::Terminated(state) => break state,
            }
        };

        // Drain and discard anything already queued rather than process it:
        // a `task_done` racing `kill_job` must not resurrect state after exit.
        rx.close();
        while rx.try_recv().is_ok() {}

        match &terminal {
            TerminalState::Completed => {
                info!(job = %self.state.job_name, "pipeline completed");
            }
            TerminalState::Killed(reason) => {
                warn!(job = %self.state.job_name, %reason, "job killed");
                self.event_sink
                    .event(&self.state.job_name, &format!("killed: {reason}"));
            }
        }
        terminal
    }

    async fn handle(&mut self, msg: CoordinatorMsg) -> Step {
        match msg {
            CoordinatorMsg::PipelineDone => Step::Terminated(TerminalState::Completed),
            CoordinatorMsg::KillJob { reason } => Step::Terminated(TerminalState::Killed(reason)),
            CoordinatorMsg::SubmitTasks { mode, task_ids } => {
                self.do_submit_tasks(mode, task_ids).await;
                Step::Continue
            }
            CoordinatorMsg::StageDone { stage } => {
                self.do_stage_done(stage).await;
                Step::Continue
            }
            CoordinatorMsg::TaskDone {
                task_id,
                host,
                result,
            } => self.do_task_done(task_id, host, result).await,
        }
    }

    /// `stage_done(stage)`: look up the next stage; if the pipeline
    /// is exhausted, post `pipeline_done`; otherwise start the next stage,
    /// unless it's already started.
    async fn do_stage_done(&mut self, stage: String) {
        match self.pipeline_lib.next_stage(&self.state.pipeline, &stage) {
            StageTransition::Done => {
                let _ = self.self_handle.send(CoordinatorMsg::PipelineDone);
            }
            StageTransition::Next(stage_def) => {
                if self.state.stage_info.contains_key(&stage_def.name) {
                    return;
                }
                self.event_sink.event(
                    &self.state.job_name,
                    &format!("starting stage {}", stage_def.name),
                );
                let schedule = self.schedule.clone();
                match builder::build_stage(
                    &mut self.state,
                    self.pipeline_lib.as_ref(),
                    &stage,
                    &stage_def,
                    &schedule,
                ) {
                    builder::BuiltStage::Empty => {
                        let _ = self.self_handle.send(CoordinatorMsg::StageDone {
                            stage: stage_def.name,
                        });
                    }
                    builder::BuiltStage::Tasks(task_ids) => {
                        self.do_submit_tasks(SubmitMode::FirstRun, task_ids).await;
                    }
                }
            }
        }
    }

    /// `task_done(task_id, host, result)` dispatch.
    async fn do_task_done(&mut self, task_id: TaskId, host: String, result: TaskResult) -> Step {
        let Some(stage) = self.state.tasks.get(&task_id).map(|t| t.spec.stage.clone()) else {
            return Step::Continue;
        };
        let still_running = self
            .state
            .stage_info
            .get(&stage)
            .map(|s| s.running.contains(&task_id))
            .unwrap_or(false);
        // A task_done for a task-id arrives at most once per run; a
        // duplicate (or one for a task that's already done/stopped from an
        // earlier message) is ignored.
        if !still_running {
            return Step::Continue;
        }

        match result {
            TaskResult::Fatal { reason } => {
                self.state.mark_stopped(task_id);
                self.event_sink.task_event(
                    &self.state.job_name,
                    task_id,
                    &format!("fatal: {reason}"),
                );
                Step::Terminated(TerminalState::Killed(reason))
            }
            TaskResult::Error { reason } => {
                self.state.mark_stopped(task_id);
                self.retry_or_abort(task_id, host, &reason).await
            }
            TaskResult::InputError { input_id, hosts } => {
                self.state.mark_stopped(task_id);
                if input_id.producer == ProducerId::Input {
                    // Initial inputs have no regenerating task, so this is
                    // routed through the generic retry path, losing per-host
                    // blacklist information for them.
                    self.retry_or_abort(task_id, host, "input_error").await
                } else {
                    self.handle_input_error(task_id, input_id, &hosts).await
                }
            }
            TaskResult::Done { outputs } => {
                self.task_complete(task_id, &host, outputs).await;
                Step::Continue
            }
        }
    }

    async fn retry_or_abort(&mut self, task_id: TaskId, host: String, reason: &str) -> Step {
        match failure::retry_task(&mut self.state, &self.config, &mut self.rng, task_id, host, reason)
        {
            RetryOutcome::ScheduleRetry { sleep } => {
                self.event_sink.task_event(
                    &self.state.job_name,
                    task_id,
                    &format!("retry in {sleep:?} (due to {reason})"),
                );
                self.schedule_retry(sleep, vec![task_id]);
                Step::Continue
            }
            RetryOutcome::Abort { reason } => Step::Terminated(TerminalState::Killed(reason)),
        }
    }

    async fn handle_input_error(
        &mut self,
        task_id: TaskId,
        input_id: InputId,
        hosts: &[String],
    ) -> Step {
        match failure::handle_input_error(
            &mut self.state,
            &self.config,
            &mut self.rng,
            task_id,
            input_id,
            hosts,
        ) {
            InputErrorOutcome::Retry { sleep } => {
                self.schedule_retry(sleep, vec![task_id]);
                Step::Continue
            }
            InputErrorOutcome::Regenerate { frontier } => {
                self.event_sink.task_event(
                    &self.state.job_name,
                    task_id,
                    &format!("regenerating input {input_id} via {} ancestors", frontier.len()),
                );
                if !frontier.is_empty() {
                    self.do_submit_tasks(SubmitMode::ReRun, frontier).await;
                }
                Step::Continue
            }
        }
    }

    /// The completion path.
    async fn task_complete(&mut self, task_id: TaskId, host: &str, outputs: Vec<TaskOutput>) {
        let (waiters, stage) = {
            let Some(task) = self.state.tasks.get_mut(&task_id) else {
                return;
            };
            task.failed_hosts.remove(host);
            task.outputs = outputs;
            let waiters: Vec<TaskId> = task.waiters.iter().copied().collect();
            task.waiters.clear();
            (waiters, task.spec.stage.clone())
        };

        let closed = self.state.mark_done(task_id, &stage);
        self.event_sink
            .task_event(&self.state.job_name, task_id, "done");

        if !waiters.is_empty() {
            self.do_submit_tasks(SubmitMode::ReRun, waiters).await;
        }

        if closed {
            let _ = self.self_handle.send(CoordinatorMsg::StageDone { stage });
        }
    }

    async fn do_submit_tasks(&mut self, mode: SubmitMode, task_ids: Vec<TaskId>) {
        for task_id in task_ids {
            self.submit_one(mode, task_id).await;
        }
    }

    /// The submission dispatcher: builds `(task_spec, task_run)`,
    /// marks the task running, and hands the pair to the external
    /// scheduler.
    async fn submit_one(&mut self, mode: SubmitMode, task_id: TaskId) {
        let Some(task) = self.state.tasks.get(&task_id) else {
            return;
        };
        let spec = task.spec.clone();
        let host_choice = match mode {
            SubmitMode::FirstRun => spec
                .group
                .preferred_host
                .clone()
                .map(HostChoice::Preferred)
                .unwrap_or(HostChoice::Any),
            SubmitMode::ReRun => HostChoice::Any,
        };
        let inputs_snapshot = self.snapshot_inputs(&spec.input_ids, &task.failed_hosts);
        let failed_hosts = task.failed_hosts.clone();
        let run_id = self.state.alloc_run_id();
        let run = TaskRun {
            run_id,
            task_id,
            host: host_choice,
            inputs_snapshot,
            failed_hosts,
        };

        self.state.mark_running(task_id);
        self.event_sink.task_event(
            &self.state.job_name,
            task_id,
            &format!("submit {mode:?} run {run_id}"),
        );

        if let Err(err) = dispatch::submit_with_retry(self.scheduler.as_ref(), spec, run).await {
            let reason = format!("submission failed for {task_id}: {err}");
            warn!(%task_id, %err, "submission failed after retries");
            let _ = self
                .self_handle
                .send(CoordinatorMsg::KillJob { reason });
        }
    }

    /// Resolve one location per input, preferring a host not already known
    /// to have failed for this task.
    fn snapshot_inputs(
        &self,
        input_ids: &[InputId],
        avoid_hosts: &BTreeSet<String>,
    ) -> BTreeMap<InputId, (String, DataRef)> {
        input_ids
            .iter()
            .filter_map(|id| {
                let info = self.state.data_map.get(id)?;
                let chosen = info
                    .locations
                    .iter()
                    .find(|(host, _)| !avoid_hosts.contains(*host))
                    .or_else(|| info.locations.iter().next())?;
                Some((*id, (chosen.0.clone(), chosen.1.clone())))
            })
            .collect()
    }

    /// The retry backoff worker: a detached helper that sleeps
    /// off-agent, then re-submits. A no-op once the coordinator is gone
    /// since the send simply fails silently.
    fn schedule_retry(&self, sleep: Duration, task_ids: Vec<TaskId>) {
        let handle = self.self_handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(sleep).await;
            let _ = handle.send(CoordinatorMsg::SubmitTasks {
                mode: SubmitMode::ReRun,
                task_ids,
            });
        });
    }
}
