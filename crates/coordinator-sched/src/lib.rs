//! Reference implementations of the job coordinator's external
//! collaborators: the cluster scheduler, event sink, job-pack
//! store, and pipeline-shape library. None of these are the real,
//! out-of-scope production systems — they exist so the coordinator can be
//! driven end-to-end by tests and the demo CLI.

pub mod events;
pub mod pipeline;
pub mod scheduler;
pub mod store;

pub use events::TracingEventSink;
pub use pipeline::StaticPipelineLibrary;
pub use scheduler::{HostPoolScheduler, ScriptedResponse, ScriptedScheduler};
pub use store::FileJobStore;
