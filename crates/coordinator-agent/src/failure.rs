//! The failure handler: chooses retry vs regenerate vs abort,
//! updates per-input host failure counts, and walks the dependency DAG to
//! compute the runnable frontier of regeneration.

use std::collections::{BTreeSet, VecDeque};
use std::time::Duration;

use coordinator_config::RetryConfig;
use coordinator_core::{InputId, ProducerId, TaskId};
use rand::Rng;

use crate::state::StateStore;

/// Outcome of the retry path.
pub enum RetryOutcome {
    /// Caller should schedule `sleep` off-agent, then re-submit the task in
    /// `re_run` mode.
    ScheduleRetry { sleep: Duration },
    /// Retry budget exhausted; caller should abort the job.
    Abort { reason: String },
}

/// Compute the backoff for the `fail_count`th failure.
/// Jitter is drawn synchronously by the caller (who owns the
/// coordinator's process-local PRNG) so the sleep itself can run in a
/// detached, RNG-free helper.
pub fn backoff_duration(config: &RetryConfig, fail_count: u32, rng: &mut impl Rng) -> Duration {
    let capped = (config.failed_min_pause * fail_count).min(config.failed_max_pause);
    let jitter_ms = if config.failed_pause_randomize.is_zero() {
        0
    } else {
        rng.random_range(0..=config.failed_pause_randomize.as_millis() as u64)
    };
    capped + Duration::from_millis(jitter_ms)
}

/// The generic retry path: applies to `error`/`fatal` and to `input_error`
/// whose producer is `input` (no task to regenerate). `input_error` against
/// a task-produced input goes through [`handle_input_error`] instead, which
/// keeps the per-host failure count separate from this budget.
pub fn retry_task(
    state: &mut StateStore,
    config: &RetryConfig,
    rng: &mut impl Rng,
    task_id: TaskId,
    host: String,
    reason: &str,
) -> RetryOutcome {
    let task = state
        .tasks
        .get_mut(&task_id)
        .expect("retry_task called for unknown task");

    let fail_count = task.failed_count + 1;
    if fail_count > config.max_failure_rate {
        return RetryOutcome::Abort {
            reason: format!(
                "Task failed {} times (due to {}). At most {} failures are allowed.",
                fail_count, reason, config.max_failure_rate
            ),
        };
    }

    task.failed_count = fail_count;
    task.failed_hosts.insert(host);

    let sleep = backoff_duration(config, fail_count, rng);
    RetryOutcome::ScheduleRetry { sleep }
}

/// Outcome of handling an `input_error` whose producer is a real task.
pub enum InputErrorOutcome {
    /// At least one host remains usable for this input; retry the task.
    Retry { sleep: Duration },
    /// Every known host is at or past the per-input failure cap;
    /// regenerate via the frontier of runnable ancestor tasks.
    Regenerate { frontier: Vec<TaskId> },
}

/// Record failures for every host reported in an `input_error`, then decide
/// retry vs regenerate.
///
/// Per spec §7.3, an input-unreachable event is not counted against the
/// consumer's `max_failure_rate`: only `data_info.failures` (the per-host,
/// per-input count) advances here. `task.failed_count`/`failed_hosts` are
/// reserved for the `error`/`fatal` taxonomy and are left untouched by this
/// path.
pub fn handle_input_error(
    state: &mut StateStore,
    config: &RetryConfig,
    rng: &mut impl Rng,
    task_id: TaskId,
    input_id: InputId,
    reported_hosts: &[String],
) -> InputErrorOutcome {
    if let Some(data_info) = state.data_map.get_mut(&input_id) {
        for bad_host in reported_hosts {
            *data_info.failures.entry(bad_host.clone()).or_insert(0) += 1;
        }
    }

    let usable = state
        .data_map
        .get(&input_id)
        .map(|d| d.usable_hosts(config.input_failure_cap))
        .unwrap_or_default();

    if !usable.is_empty() {
        let sleep = retry_usable_input(state, config, rng, input_id);
        InputErrorOutcome::Retry { sleep }
    } else {
        let failing_hosts: BTreeSet<String> = state
            .data_map
            .get(&input_id)
            .map(|d| d.locations.keys().cloned().collect())
            .unwrap_or_default();
        let frontier = collect_runnable_deps(state, input_id.producer, &failing_hosts, task_id);
        InputErrorOutcome::Regenerate { frontier }
    }
}

/// Backoff for a task retried after an input-replica failure with at least
/// one other host still usable. Scaled off the worst per-host failure count
/// recorded against this input rather than the task's own `failed_count`,
/// since this path must not touch task-level retry bookkeeping.
fn retry_usable_input(
    state: &StateStore,
    config: &RetryConfig,
    rng: &mut impl Rng,
    input_id: InputId,
) -> Duration {
    let fail_count = state
        .data_map
        .get(&input_id)
        .and_then(|d| d.failures.values().copied().max())
        .unwrap_or(1)
        .max(1);
    backoff_duration(config, fail_count, rng)
}

/// Walk the task dependency DAG backward from `gen_producer`, breadth-first,
/// computing the runnable frontier of ancestor tasks to re-run.
///
/// `consumer` is the task that should be woken (re-submitted) once
/// `gen_producer`'s task completes. The walk is iterative (a plain queue,
/// not recursion) since pipelines may be long.
pub fn collect_runnable_deps(
    state: &mut StateStore,
    gen_producer: ProducerId,
    failing_hosts: &BTreeSet<String>,
    consumer: TaskId,
) -> Vec<TaskId> {
    let mut visited: BTreeSet<TaskId> = BTreeSet::new();
    let mut frontier: Vec<TaskId> = Vec::new();
    let mut queue: VecDeque<(TaskId, TaskId)> = VecDeque::new();

    match gen_producer {
        ProducerId::Input => {
            // No regenerating task exists for the job's initial inputs;
            // nothing to walk. The caller's retry path
            // handles this producer instead.
            return Vec::new();
        }
        ProducerId::Task(root) => queue.push_back((root, consumer)),
    }

    while let Some((task_id, dependent)) = queue.pop_front() {
        // Whoever depends on `task_id` needs to be woken when it
        // eventually completes, whether or not it ends up runnable now.
        if let Some(task) = state.tasks.get_mut(&task_id) {
            task.waiters.insert(dependent);
        }

        if visited.contains(&task_id) {
            continue;
        }
        visited.insert(task_id);

        let Some(task) = state.tasks.get(&task_id) else {
            continue;
        };

        let is_runnable = task.spec.input_ids.iter().all(|input_id| {
                state
                    .data_map
                    .get(input_id)
                    .map(|d| {
                        d.locations
                            .keys()
                            .any(|host| !failing_hosts.contains(host))
                })
                    .unwrap_or(true)
        });

        if is_runnable {
            frontier.push(task_id);
            continue;
        }

        for input_id in &task.spec.input_ids {
            if let ProducerId::Task(parent) = input_id.producer {
                queue.push_back((parent, task_id));
            }
        }
    }

    // Stage-wise order: earlier stages submit first.
    frontier.sort_by_key(|tid| (stage_order(state, *tid), *tid));
    frontier
}

fn stage_order(state: &StateStore, task_id: TaskId) -> usize {
    let Some(task) = state.tasks.get(&task_id) else {
        return usize::MAX;
    };
    state
        .pipeline
        .stages
        .iter()
        .position(|s| s.name == task.spec.stage)
        .unwrap_or(usize::MAX)
}
