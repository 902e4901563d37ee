//! A reference job-pack store: persists job-pack bytes to
//! `<job_home>/<job_name>` and nothing else —
//! everything else about a job lives only in the coordinator's memory.

use std::path::Path;

use async_trait::async_trait;
use coordinator_core::{Error, JobName, JobStore, Result};

#[derive(Debug, Default)]
pub struct FileJobStore;

impl FileJobStore {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl JobStore for FileJobStore {
    async fn save(&self, job_home: &Path, job_name: &JobName, job_pack: &[u8]) -> Result<()> {
        tokio::fs::create_dir_all(job_home)
            .await
            .map_err(|e| Error::SaveFailed(e.to_string()))?;
        tokio::fs::write(job_home.join(&job_name.0), job_pack)
            .await
            .map_err(|e| Error::SaveFailed(e.to_string()))
    }
}
