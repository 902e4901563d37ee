//! Packages a `(task-spec, task-run)` pair and hands it to the external
//! scheduler with a fixed 30s timeout.
//!
//! Submission is retried a bounded number of times with exponential
//! backoff before giving up; the caller turns a final failure into a
//! `kill_job` with a fatal-submission reason.

use std::time::Duration;

use coordinator_core::{ClusterScheduler, Result, TaskRun, TaskSpec};

const SUBMIT_TIMEOUT: Duration = Duration::from_secs(30);
const SUBMIT_ATTEMPTS: u32 = 3;
const SUBMIT_RETRY_BASE: Duration = Duration::from_millis(100);

/// Submit `(spec, run)` to `scheduler`, retrying up to [`SUBMIT_ATTEMPTS`]
/// times (100ms, 200ms, .. backoff between attempts) before giving up.
pub async fn submit_with_retry(
    scheduler: &dyn ClusterScheduler,
    spec: TaskSpec,
    run: TaskRun,
) -> Result<()> {
    let mut attempt = 0;
    loop {
        match scheduler.new_task(spec.clone(), run.clone(), SUBMIT_TIMEOUT).await {
            Ok(()) => return Ok(()),
            Err(err) => {
                attempt += 1;
                if attempt >= SUBMIT_ATTEMPTS {
                    return Err(err);
                }
                let backoff = SUBMIT_RETRY_BASE * 2u32.pow(attempt - 1);
                tokio::time::sleep(backoff).await;
            }
        }
    }
}
