//! Domain types and external-collaborator traits for the job coordinator.
//!
//! This crate contains:
//! - Task, run, and input identifiers
//! - The data model entities owned by a coordinator's state store
//! - Pipeline shape types and the pipeline-shape library contract
//! - The coordinator mailbox message type and handle
//! - The cluster scheduler, event sink, and job store traits

pub mod collab;
pub mod error;
pub mod ids;
pub mod message;
pub mod model;
pub mod pipeline;

pub use collab::{ClusterScheduler, EventSink, JobStore};
pub use error::{Error, Result};
pub use ids::{InputId, JobName, ProducerId, RunId, TaskId};
pub use message::{CoordinatorHandle, CoordinatorMsg, SubmitMode, TaskResult};
pub use model::{
    DataInfo, DataRef, GroupKey, HostChoice, SchedulePolicy, SourceDescriptor, StageInfo,
    TaskInfo, TaskOutput, TaskRun, TaskSpec, WorkerHandle,
};
pub use pipeline::{Grouping, InitialInput, JobInfo, Pipeline, PipelineLibrary, StageDef, StageTransition};
