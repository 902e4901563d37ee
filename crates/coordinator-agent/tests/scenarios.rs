//! End-to-end scenario tests matching spec §8's literal examples: happy
//! path, retry within/over budget, input replica failover, regeneration,
//! and a fatal task abort.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use coordinator_agent::{TerminalState, spawn_coordinator};
use coordinator_config::RetryConfig;
use coordinator_core::{
    GroupKey, Grouping, InitialInput, InputId, JobInfo, JobName, JobStore, Pipeline,
    PipelineLibrary, SchedulePolicy, StageTransition, TaskId, TaskOutput, WorkerHandle,
};
use coordinator_sched::{ScriptedResponse, ScriptedScheduler, StaticPipelineLibrary, TracingEventSink};

struct NoopJobStore;

#[async_trait]
impl JobStore for NoopJobStore {
    async fn save(&self, _job_home: &Path, _job_name: &JobName, _job_pack: &[u8]) -> coordinator_core::Result<()> {
        Ok(())
    }
}

/// Wraps [`StaticPipelineLibrary`] but reports a fixed set of replica hosts
/// for every output, so tests can exercise input failover/regeneration
/// without a real multi-host data-movement layer.
struct MultiHostLibrary {
    inner: StaticPipelineLibrary,
    hosts: Vec<String>,
}

impl PipelineLibrary for MultiHostLibrary {
    fn job_from_jobinfo(&self, job_info: &JobInfo) -> Result<Pipeline, String> {
        self.inner.job_from_jobinfo(job_info)
    }

    fn next_stage(&self, pipeline: &Pipeline, stage_name: &str) -> StageTransition {
        self.inner.next_stage(pipeline, stage_name)
    }

    fn group_outputs(
        &self,
        grouping: &Grouping,
        outputs: &[(InputId, TaskOutput)],
    ) -> Vec<(GroupKey, Vec<(InputId, TaskOutput)>)> {
        self.inner.group_outputs(grouping, outputs)
    }

    fn locations(&self, _data_input: &TaskOutput) -> Vec<String> {
        self.hosts.clone()
    }

    fn job_schedule_option(&self, job_info: &JobInfo) -> SchedulePolicy {
        self.inner.job_schedule_option(job_info)
    }
}

fn fast_retry_config(max_failure_rate: u32, input_failure_cap: u32) -> RetryConfig {
    RetryConfig {
        max_failure_rate,
        failed_min_pause: Duration::from_millis(1),
        failed_max_pause: Duration::from_millis(5),
        failed_pause_randomize: Duration::from_millis(1),
        input_failure_cap,
    }
}

fn job_info(stages: serde_json::Value, inputs: Vec<(&str, &str)>) -> JobInfo {
    let initial_inputs = inputs
        .into_iter()
        .map(|(label, host)| {
            let mut locations = BTreeMap::new();
            locations.insert(host.to_string(), PathBuf::from(format!("/data/{label}")));
            InitialInput {
                label: label.to_string(),
                locations,
            }
    })
        .collect();

    JobInfo {
        name_prefix: "test-job".to_string(),
        pipeline_decl: stages,
        env: BTreeMap::new(),
        worker: WorkerHandle {
            binary: "noop-worker".to_string(),
        },
        initial_inputs,
        job_file_path: PathBuf::from("/tmp/job.pack"),
    }
}

#[tokio::test]
async fn scenario_a_happy_path_two_stages() {
    let pipeline = serde_json::json!([
            {"name": "map", "grouping": "PerInput"},
            {"name": "reduce", "grouping": "AllToOne"},
    ]);
    let info = job_info(pipeline, vec![("i0", "h1"), ("i1", "h2")]);

    let scheduler = Arc::new(ScriptedScheduler::new());
    let job = spawn_coordinator(
        info,
        Vec::new(),
        PathBuf::from("/tmp/coordinator-test-a"),
        fast_retry_config(3, 3),
        Arc::new(StaticPipelineLibrary::new()),
        scheduler.clone(),
        Arc::new(TracingEventSink::new()),
        Arc::new(NoopJobStore),
    )
        .await
        .expect("coordinator should start");

    let terminal = tokio::time::timeout(Duration::from_secs(5), job.join)
        .await
        .expect("coordinator should finish")
        .expect("coordinator task should not panic");

    assert_eq!(terminal, TerminalState::Completed);
    // t0, t1 (map) + t2 (reduce) each submitted exactly once.
    assert_eq!(scheduler.submissions().len(), 3);
}

#[tokio::test]
async fn scenario_b_retry_within_budget() {
    let pipeline = serde_json::json!([{"name": "map", "grouping": "PerInput"}]);
    let info = job_info(pipeline, vec![("i0", "h1")]);

    let scheduler = Arc::new(ScriptedScheduler::new());
    scheduler.script(
        TaskId(0),
        vec![
            ScriptedResponse::error("h1", "E"),
            ScriptedResponse::error("h1", "E"),
            ScriptedResponse::done("h2", Vec::new()),
        ],
    );

    let job = spawn_coordinator(
        info,
        Vec::new(),
        PathBuf::from("/tmp/coordinator-test-b"),
        fast_retry_config(3, 3),
        Arc::new(StaticPipelineLibrary::new()),
        scheduler.clone(),
        Arc::new(TracingEventSink::new()),
        Arc::new(NoopJobStore),
    )
        .await
        .expect("coordinator should start");

    let terminal = tokio::time::timeout(Duration::from_secs(5), job.join)
        .await
        .expect("coordinator should finish")
        .expect("coordinator task should not panic");

    assert_eq!(terminal, TerminalState::Completed);
    assert_eq!(scheduler.submissions().len(), 3);
}

#[tokio::test]
async fn scenario_c_retry_over_budget_aborts() {
    let pipeline = serde_json::json!([{"name": "map", "grouping": "PerInput"}]);
    let info = job_info(pipeline, vec![("i0", "h1")]);

    let scheduler = Arc::new(ScriptedScheduler::new());
    scheduler.script(
        TaskId(0),
        vec![
            ScriptedResponse::error("h1", "E"),
            ScriptedResponse::error("h1", "E"),
            ScriptedResponse::error("h1", "E"),
        ],
    );

    let job = spawn_coordinator(
        info,
        Vec::new(),
        PathBuf::from("/tmp/coordinator-test-c"),
        fast_retry_config(2, 3),
        Arc::new(StaticPipelineLibrary::new()),
        scheduler,
        Arc::new(TracingEventSink::new()),
        Arc::new(NoopJobStore),
    )
        .await
        .expect("coordinator should start");

    let terminal = tokio::time::timeout(Duration::from_secs(5), job.join)
        .await
        .expect("coordinator should finish")
        .expect("coordinator task should not panic");

    assert_eq!(
        terminal,
        TerminalState::Killed(
            "Task failed 3 times (due to E). At most 2 failures are allowed.".to_string()
        )
    );
}

#[tokio::test]
async fn scenario_d_input_replica_failover() {
    let pipeline = serde_json::json!([
            {"name": "gen", "grouping": "PerInput"},
            {"name": "use", "grouping": "PerInput"},
    ]);
    let info = job_info(pipeline, vec![("i0", "in-host")]);

    let scheduler = Arc::new(ScriptedScheduler::new());
    // t1 (the "use" stage's consumer) reports h1 unreachable four times;
    // h2 never fails, so it stays usable and t1 is simply retried.
    let input_id = InputId::from_task(TaskId(0), 0);
    scheduler.script(
        TaskId(1),
        vec![
            ScriptedResponse::input_error("h1", input_id, vec!["h1".to_string()]),
            ScriptedResponse::input_error("h1", input_id, vec!["h1".to_string()]),
            ScriptedResponse::input_error("h1", input_id, vec!["h1".to_string()]),
            ScriptedResponse::input_error("h1", input_id, vec!["h1".to_string()]),
        ],
    );

    let pipeline_lib = Arc::new(MultiHostLibrary {
            inner: StaticPipelineLibrary::new(),
            hosts: vec!["h1".to_string(), "h2".to_string()],
    });

    let job = spawn_coordinator(
        info,
        Vec::new(),
        PathBuf::from("/tmp/coordinator-test-d"),
        // max_failure_rate = 2, deliberately lower than the 4 input_errors
        // t1 reports below: input-unreachable events must not count against
        // the consumer's retry budget, only against the per-host failure
        // count, so this must still complete rather than abort.
        fast_retry_config(2, 3),
        pipeline_lib,
        scheduler.clone(),
        Arc::new(TracingEventSink::new()),
        Arc::new(NoopJobStore),
    )
        .await
        .expect("coordinator should start");

    let terminal = tokio::time::timeout(Duration::from_secs(5), job.join)
        .await
        .expect("coordinator should finish")
        .expect("coordinator task should not panic");

    assert_eq!(terminal, TerminalState::Completed);
    // t0 submitted once (never fails); t1: 4 scripted input_errors + 1
    // final successful retry on the still-usable host.
    let t1_submissions = scheduler
        .submissions()
        .into_iter()
        .filter(|(task, _)| *task == TaskId(1))
        .count();
    assert_eq!(t1_submissions, 5);
}

#[tokio::test]
async fn scenario_e_regeneration_wakes_parked_consumer() {
    let pipeline = serde_json::json!([
            {"name": "gen", "grouping": "PerInput"},
            {"name": "use", "grouping": "PerInput"},
    ]);
    let info = job_info(pipeline, vec![("i0", "in-host")]);

    let scheduler = Arc::new(ScriptedScheduler::new());
    let input_id = InputId::from_task(TaskId(0), 0);
    // First report kills h1 (cap=1), second kills h2: no usable host left,
    // so the third report triggers regeneration of t0.
    scheduler.script(
        TaskId(1),
        vec![
            ScriptedResponse::input_error("h1", input_id, vec!["h1".to_string()]),
            ScriptedResponse::input_error("h2", input_id, vec!["h2".to_string()]),
        ],
    );

    let pipeline_lib = Arc::new(MultiHostLibrary {
            inner: StaticPipelineLibrary::new(),
            hosts: vec!["h1".to_string(), "h2".to_string()],
    });

    let job = spawn_coordinator(
        info,
        Vec::new(),
        PathBuf::from("/tmp/coordinator-test-e"),
        fast_retry_config(10, 1),
        pipeline_lib,
        scheduler.clone(),
        Arc::new(TracingEventSink::new()),
        Arc::new(NoopJobStore),
    )
        .await
        .expect("coordinator should start");

    let terminal = tokio::time::timeout(Duration::from_secs(5), job.join)
        .await
        .expect("coordinator should finish")
        .expect("coordinator task should not panic");

    assert_eq!(terminal, TerminalState::Completed);
    let t0_submissions = scheduler
        .submissions()
        .into_iter()
        .filter(|(task, _)| *task == TaskId(0))
        .count();
    // Initial submission, plus one regeneration re-run.
    assert_eq!(t0_submissions, 2);
    let t1_submissions = scheduler
        .submissions()
        .into_iter()
        .filter(|(task, _)| *task == TaskId(1))
        .count();
    // Two input_errors (both parking), then woken once t0 regenerates.
    assert_eq!(t1_submissions, 3);
}

#[tokio::test]
async fn scenario_f_fatal_aborts_immediately() {
    let pipeline = serde_json::json!([{"name": "map", "grouping": "PerInput"}]);
    let info = job_info(pipeline, vec![("i0", "h1")]);

    let scheduler = Arc::new(ScriptedScheduler::new());
    scheduler.script(TaskId(0), vec![ScriptedResponse::fatal("h1", "OOM")]);

    let job = spawn_coordinator(
        info,
        Vec::new(),
        PathBuf::from("/tmp/coordinator-test-f"),
        fast_retry_config(3, 3),
        Arc::new(StaticPipelineLibrary::new()),
        scheduler,
        Arc::new(TracingEventSink::new()),
        Arc::new(NoopJobStore),
    )
        .await
        .expect("coordinator should start");

    let terminal = tokio::time::timeout(Duration::from_secs(5), job.join)
        .await
        .expect("coordinator should finish")
        .expect("coordinator task should not panic");

    assert_eq!(terminal, TerminalState::Killed("OOM".to_string()));
}
