//! Pipeline shape types and the external pipeline-shape library contract
//!. The library itself — stage topology, grouping, locations,
//! next-stage lookup — is an out-of-scope external collaborator; this
//! module defines the shapes that cross that boundary plus the trait a
//! concrete implementation must satisfy.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::ids::InputId;
use crate::model::{GroupKey, SchedulePolicy, TaskOutput, WorkerHandle};

/// A deterministic partition strategy for `(input-id, data-input)` pairs
/// into labelled buckets. The pipeline-shape library is the
/// external authority on what groupings exist for a given job; this enum
/// lists the common shapes a reference/test implementation supports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grouping {
    /// Each input becomes its own single-input bucket (map-like stages).
    PerInput,
    /// Every input is merged into exactly one bucket (reduce-like stages).
    AllToOne,
    /// Inputs are bucketed by a string key extracted from their label.
    ByLabelPrefix,
}

/// One stage in a compiled pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDef {
    pub name: String,
    pub grouping: Grouping,
}

/// A compiled pipeline: an ordered sequence of stages plus the synthetic
/// `input` stage that precedes the first real stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pipeline {
    pub stages: Vec<StageDef>,
}

impl Pipeline {
    pub fn new(stages: Vec<StageDef>) -> Self {
        Self { stages }
    }
}

/// Result of looking up the stage that follows `stage_name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageTransition {
    Next(StageDef),
    Done,
}

/// The raw, unvalidated job declaration handed to the coordinator by
/// intake, after the job-pack validator (out of scope) has accepted it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobInfo {
    pub name_prefix: String,
    /// Opaque pipeline declaration; only `PipelineLibrary::job_from_jobinfo`
    /// knows how to compile it.
    pub pipeline_decl: serde_json::Value,
    pub env: BTreeMap<String, String>,
    pub worker: WorkerHandle,
    pub initial_inputs: Vec<InitialInput>,
    pub job_file_path: PathBuf,
}

/// One of the job's initial inputs, as supplied in the job-pack.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitialInput {
    pub label: String,
    /// host -> path on that host, e.g. `i0@h1`.
    pub locations: BTreeMap<String, PathBuf>,
}

/// The pipeline-shape library contract. Out of scope to implement in
/// full (topology compilation, real grouping semantics belong to the wider
/// system); `coordinator-sched` ships a reference implementation covering
/// the `Grouping` variants above, sufficient to drive the coordinator
/// end-to-end in tests.
pub trait PipelineLibrary: Send + Sync {
    /// Compile a job-pack's pipeline declaration, or reject it as
    /// unsupported.
    fn job_from_jobinfo(&self, job_info: &JobInfo) -> Result<Pipeline, String>;

    /// Find the stage after `stage_name`, or report the pipeline is
    /// exhausted. `stage_name == "input"` looks up the first real stage.
    fn next_stage(&self, pipeline: &Pipeline, stage_name: &str) -> StageTransition;

    /// Bucket a flattened list of `(input-id, output)` pairs per `grouping`.
    /// Bucket order determines task-id allocation order and must be
    /// deterministic given the same inputs.
    fn group_outputs(
        &self,
        grouping: &Grouping,
        outputs: &[(InputId, TaskOutput)],
    ) -> Vec<(GroupKey, Vec<(InputId, TaskOutput)>)>;

    /// Hosts known to hold a replica of this data (may exceed the single
    /// producing host once the out-of-scope data-movement layer has
    /// replicated it).
    fn locations(&self, data_input: &TaskOutput) -> Vec<String>;

    /// The job's scheduling policy, compiled once at job start.
    fn job_schedule_option(&self, job_info: &JobInfo) -> SchedulePolicy;
}
