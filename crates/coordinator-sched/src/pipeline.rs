//! A reference implementation of the pipeline-shape library contract
//!: compiles a job-pack's pipeline declaration, looks up the stage
//! that follows a given one, and buckets outputs per the `Grouping`
//! variants `coordinator-core` defines.

use coordinator_core::{GroupKey, Grouping, InputId, JobInfo, Pipeline, StageDef, StageTransition, TaskOutput};
use serde::Deserialize;

/// The on-the-wire shape `job_from_jobinfo` expects in
/// `JobInfo::pipeline_decl`: a flat, ordered list of stages.
#[derive(Debug, Deserialize)]
struct StageDecl {
    name: String,
    grouping: Grouping,
}

/// A pipeline library good enough to drive a coordinator end-to-end in
/// tests and the demo CLI. Real deployments would resolve stage topology,
/// grouping, and data locations from a cluster-wide catalog; this reference
/// only knows what's in the job's own declaration.
#[derive(Debug, Default)]
pub struct StaticPipelineLibrary;

impl StaticPipelineLibrary {
    pub fn new() -> Self {
        Self
    }
}

impl coordinator_core::PipelineLibrary for StaticPipelineLibrary {
    fn job_from_jobinfo(&self, job_info: &JobInfo) -> Result<Pipeline, String> {
        let decls: Vec<StageDecl> = serde_json::from_value(job_info.pipeline_decl.clone())
            .map_err(|e| format!("pipeline declaration is not a stage list: {e}"))?;
        if decls.is_empty() {
            return Err("pipeline declares no stages".to_string());
        }
        let stages = decls
            .into_iter()
            .map(|d| StageDef {
                name: d.name,
                grouping: d.grouping,
        })
            .collect();
        Ok(Pipeline::new(stages))
    }

    fn next_stage(&self, pipeline: &Pipeline, stage_name: &str) -> StageTransition {
        if stage_name == "input" {
            return match pipeline.stages.first() {
                Some(s) => StageTransition::Next(s.clone()),
                None => StageTransition::Done,
            };
        }
        match pipeline.stages.iter().position(|s| s.name == stage_name) {
            Some(idx) => match pipeline.stages.get(idx + 1) {
                Some(next) => StageTransition::Next(next.clone()),
                None => StageTransition::Done,
            },
            None => StageTransition::Done,
        }
    }

    fn group_outputs(
        &self,
        grouping: &Grouping,
        outputs: &[(InputId, TaskOutput)],
    ) -> Vec<(GroupKey, Vec<(InputId, TaskOutput)>)> {
        let mut sorted: Vec<(InputId, TaskOutput)> = outputs.to_vec();
        sorted.sort_by_key(|(id, _)| *id);

        match grouping {
            Grouping::PerInput => sorted
                .into_iter()
                .map(|(id, output)| {
                    let key = GroupKey {
                        label: output.label.clone(),
                        preferred_host: Some(output.host.clone()),
                    };
                    (key, vec![(id, output)])
            })
                .collect(),
            Grouping::AllToOne => {
                if sorted.is_empty() {
                    Vec::new()
                } else {
                    let key = GroupKey {
                        label: "all".to_string(),
                        preferred_host: None,
                    };
                    vec![(key, sorted)]
                }
            }
            Grouping::ByLabelPrefix => {
                let mut buckets: Vec<(String, Vec<(InputId, TaskOutput)>)> = Vec::new();
                for (id, output) in sorted {
                    let prefix = output
                        .label
                        .split('/')
                        .next()
                        .unwrap_or(&output.label)
                        .to_string();
                    match buckets.iter_mut().find(|(label, _)| *label == prefix) {
                        Some((_, bucket)) => bucket.push((id, output)),
                        None => buckets.push((prefix, vec![(id, output)])),
                    }
                }
                buckets
                    .into_iter()
                    .map(|(label, bucket)| {
                        let preferred_host = bucket.first().map(|(_, o)| o.host.clone());
                        (
                            GroupKey {
                                label,
                                preferred_host,
                            },
                            bucket,
                        )
                })
                    .collect()
            }
        }
    }

    fn locations(&self, data_input: &TaskOutput) -> Vec<String> {
        vec![data_input.host.clone()]
    }

    fn job_schedule_option(&self, _job_info: &JobInfo) -> coordinator_core::SchedulePolicy {
        coordinator_core::SchedulePolicy {
            name: "default".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coordinator_core::{DataRef, PipelineLibrary};

    fn output(label: &str, host: &str, position: usize) -> TaskOutput {
        TaskOutput {
            position,
            label: label.to_string(),
            host: host.to_string(),
            location: DataRef::Memory,
            local_handle: None,
        }
    }

    #[test]
    fn per_input_makes_one_bucket_per_output() {
        let lib = StaticPipelineLibrary::new();
        let outputs = vec![
            (InputId::from_task(coordinator_core::TaskId(0), 0), output("a", "h1", 0)),
            (InputId::from_task(coordinator_core::TaskId(1), 0), output("b", "h2", 0)),
        ];
        let buckets = lib.group_outputs(&Grouping::PerInput, &outputs);
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].0.preferred_host, Some("h1".to_string()));
    }

    #[test]
    fn all_to_one_merges_every_input() {
        let lib = StaticPipelineLibrary::new();
        let outputs = vec![
            (InputId::from_task(coordinator_core::TaskId(0), 0), output("a", "h1", 0)),
            (InputId::from_task(coordinator_core::TaskId(1), 0), output("b", "h2", 0)),
        ];
        let buckets = lib.group_outputs(&Grouping::AllToOne, &outputs);
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].1.len(), 2);
    }

    #[test]
    fn next_stage_from_input_is_first_real_stage() {
        let lib = StaticPipelineLibrary::new();
        let pipeline = Pipeline::new(vec![
                StageDef {
                    name: "map".into(),
                    grouping: Grouping::PerInput,
                },
                StageDef {
                    name: "reduce".into(),
                    grouping: Grouping::AllToOne,
                },
        ]);
        match lib.next_stage(&pipeline, "input") {
            StageTransition::Next(s) => assert_eq!(s.name, "map"),
            StageTransition::Done => panic!("expected map"),
        }
        match lib.next_stage(&pipeline, "reduce") {
            StageTransition::Done => {}
            StageTransition::Next(_) => panic!("expected pipeline to be exhausted"),
        }
    }
}
