//! Error types for the job coordinator.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("job pack invalid: {0}")]
    InvalidJobPack(String),

    #[error("pipeline unsupported: {0}")]
    UnsupportedPipeline(String),

    #[error("scheduler refused job registration: {0}")]
    SchedulerRefused(String),

    #[error("scheduler submission failed for task {task_id}: {reason}")]
    SubmissionFailed { task_id: String, reason: String },

    #[error("scheduler submission timed out for task {0}")]
    SubmissionTimeout(String),

    #[error("job save failed: {0}")]
    SaveFailed(String),

    #[error("coordinator did not announce job_started within the deadline")]
    StartupTimeout,

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
