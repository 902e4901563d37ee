//! The stage builder: given a newly reachable stage, computes
//! grouped inputs, allocates task-ids, records input locations, and emits
//! the set of task-ids to submit.

use std::collections::BTreeMap;

use coordinator_core::{
    DataInfo, DataRef, GroupKey, InputId, PipelineLibrary, ProducerId, SchedulePolicy,
    SourceDescriptor, StageDef, StageInfo, TaskId, TaskOutput, TaskSpec,
};

use crate::state::StateStore;

/// Result of building a stage's tasks.
pub enum BuiltStage {
    /// The stage produced no work; `stage_done` should be emitted for it
    /// immediately.
    Empty,
    /// These task-ids were allocated and should be submitted in
    /// `first_run` mode.
    Tasks(Vec<TaskId>),
}

/// One previous-stage output, carried alongside the full per-host data-info
/// it would install if selected into a bucket.
struct PendingOutput {
    input_id: InputId,
    output: TaskOutput,
    data_info: DataInfo,
}

/// Gather the outputs of `prev_stage`, synthesizing them from the job's
/// initial inputs when `prev_stage == "input"`.
fn collect_prev_outputs(
    state: &StateStore,
    pipeline_lib: &dyn PipelineLibrary,
    prev_stage: &str,
) -> Vec<PendingOutput> {
    if prev_stage == "input" {
        state
            .job_info
            .initial_inputs
            .iter()
            .enumerate()
            .map(|(position, initial)| {
                let locations: BTreeMap<String, DataRef> = initial
                    .locations
                    .iter()
                    .map(|(host, path)| (host.clone(), DataRef::Path(path.clone())))
                    .collect();
                let source = SourceDescriptor {
                    producer: ProducerId::Input,
                    position,
                    label: initial.label.clone(),
                };
                let data_info = DataInfo::new(source, locations.clone());
                // A deterministic representative location for grouping
                // purposes; `BTreeMap` iteration is sorted by host name.
                let (host, location) = locations
                    .iter()
                    .next()
                    .map(|(h, l)| (h.clone(), l.clone()))
                    .unwrap_or_else(|| ("unknown".to_string(), DataRef::Memory));
                let output = TaskOutput {
                    position,
                    label: initial.label.clone(),
                    host,
                    location,
                    local_handle: None,
                };
                PendingOutput {
                    input_id: InputId::initial(position),
                    output,
                    data_info,
                }
        })
            .collect()
    } else {
        let Some(stage_info) = state.stage_info.get(prev_stage) else {
            return Vec::new();
        };
        let mut result = Vec::new();
        for &task_id in &stage_info.done {
            let Some(task) = state.tasks.get(&task_id) else {
                continue;
            };
            for output in &task.outputs {
                let input_id = InputId::from_task(task_id, output.position);
                let hosts = pipeline_lib.locations(output);
                let locations: BTreeMap<String, DataRef> = hosts
                    .into_iter()
                    .map(|h| (h, output.location.clone()))
                    .collect();
                let source = SourceDescriptor {
                    producer: ProducerId::Task(task_id),
                    position: output.position,
                    label: output.label.clone(),
                };
                result.push(PendingOutput {
                        input_id,
                        output: output.clone(),
                        data_info: DataInfo::new(source, locations),
                });
            }
        }
        result
    }
}

/// Build stage `stage_def`'s tasks from `prev_stage`'s completed outputs
///.
pub fn build_stage(
    state: &mut StateStore,
    pipeline_lib: &dyn PipelineLibrary,
    prev_stage: &str,
    stage_def: &StageDef,
    schedule: &SchedulePolicy,
) -> BuiltStage {
    let pending = collect_prev_outputs(state, pipeline_lib, prev_stage);
    let by_input_id: BTreeMap<InputId, &PendingOutput> =
    pending.iter().map(|p| (p.input_id, p)).collect();

    let flattened: Vec<(InputId, TaskOutput)> = pending
        .iter()
        .map(|p| (p.input_id, p.output.clone()))
        .collect();

    let buckets = pipeline_lib.group_outputs(&stage_def.grouping, &flattened);

    if buckets.is_empty() {
        state
            .stage_info
            .insert(stage_def.name.clone(), StageInfo::new(0));
        return BuiltStage::Empty;
    }

    let mut task_ids = Vec::with_capacity(buckets.len());

    for (group_key, bucket) in &buckets {
        // Step 3: install data_info for every new input in this bucket.
        for (input_id, _) in bucket {
            if !state.data_map.contains_key(input_id) {
                if let Some(pending) = by_input_id.get(input_id) {
                    state
                        .data_map
                        .insert(*input_id, pending.data_info.clone());
                }
            }
        }

        let task_id = state.alloc_task_id();
        let input_ids: Vec<InputId> = bucket.iter().map(|(id, _)| *id).collect();

        let spec = TaskSpec {
            task_id,
            stage: stage_def.name.clone(),
            group: GroupKey {
                label: group_key.label.clone(),
                preferred_host: group_key.preferred_host.clone(),
            },
            grouping: stage_def.grouping.clone(),
            input_ids,
            job_name: state.job_name.clone(),
            job_env: state.job_info.env.clone(),
            worker: state.job_info.worker.clone(),
            schedule: schedule.clone(),
        };

        state.insert_task(spec);
        task_ids.push(task_id);
    }

    state
        .stage_info
        .insert(stage_def.name.clone(), StageInfo::new(task_ids.len()));

    BuiltStage::Tasks(task_ids)
}
