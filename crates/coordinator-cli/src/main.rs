//! Demo CLI for the job coordinator.
//!
//! Stands in for the intake layer just enough to exercise a coordinator
//! end-to-end: it reads a pipeline declaration and initial inputs from
//! JSON files, spawns a coordinator backed by `coordinator-sched`'s
//! reference collaborators, and prints the job's terminal state.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use coordinator_agent::{TerminalState, spawn_coordinator};
use coordinator_config::RetryConfig;
use coordinator_core::{InitialInput, JobInfo, WorkerHandle};
use coordinator_sched::{FileJobStore, HostPoolScheduler, StaticPipelineLibrary, TracingEventSink};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "coordinator")]
#[command(about = "Run a job through the coordinator", long_about = None)]
struct Cli {
    /// Path to a JSON pipeline declaration: `[{"name": "map", "grouping": "PerInput"}, ..]`.
    #[arg(long)]
    pipeline: PathBuf,

    /// Path to a JSON list of initial inputs: `[{"label": "i0", "locations": {"h1": "/data/i0"}}, ..]`.
    #[arg(long)]
    inputs: PathBuf,

    /// Job name prefix; the event sink appends a unique suffix.
    #[arg(long, default_value = "job")]
    prefix: String,

    /// Directory the job-pack is persisted under as `<job_home>/<job_name>`.
    #[arg(long, env = "COORDINATOR_JOB_HOME", default_value = "/tmp/coordinator-jobs")]
    job_home: PathBuf,

    /// Comma-separated pool of hosts the reference scheduler assigns
    /// re-run attempts to.
    #[arg(long, default_value = "h1,h2,h3", value_delimiter = ',')]
    hosts: Vec<String>,
}

#[derive(serde::Deserialize)]
struct InitialInputDecl {
    label: String,
    locations: BTreeMap<String, PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let pipeline_decl: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(&cli.pipeline)
            .with_context(|| format!("failed to read pipeline file {}", cli.pipeline.display()))?,
    )
        .context("failed to parse pipeline declaration as JSON")?;

    let input_decls: Vec<InitialInputDecl> = serde_json::from_str(
        &std::fs::read_to_string(&cli.inputs)
            .with_context(|| format!("failed to read inputs file {}", cli.inputs.display()))?,
    )
        .context("failed to parse initial inputs as JSON")?;

    let job_info = JobInfo {
        name_prefix: cli.prefix,
        pipeline_decl,
        env: BTreeMap::new(),
        worker: WorkerHandle {
            binary: "demo-worker".to_string(),
        },
        initial_inputs: input_decls
            .into_iter()
            .map(|d| InitialInput {
                label: d.label,
                locations: d.locations,
        })
            .collect(),
        job_file_path: cli.pipeline.clone(),
    };

    let config = RetryConfig::from_env().context("invalid coordinator configuration")?;

    let job = spawn_coordinator(
        job_info,
        Vec::new(),
        cli.job_home,
        config,
        Arc::new(StaticPipelineLibrary::new()),
        Arc::new(HostPoolScheduler::new(cli.hosts)),
        Arc::new(TracingEventSink::new()),
        Arc::new(FileJobStore::new()),
    )
        .await
        .context("coordinator failed to start")?;

    info!(job = %job.job_name, "coordinator started");

    match job.join.await.context("coordinator task panicked")? {
        TerminalState::Completed => {
            println!("job {} completed", job.job_name);
            Ok(())
        }
        TerminalState::Killed(reason) => {
            println!("job {} killed: {reason}", job.job_name);
            anyhow::bail!("job killed: {reason}")
        }
    }
}
