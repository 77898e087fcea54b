//! CSV artifact persistence
//!
//! One `{job_id}.csv` per job in the download directory, one record per
//! graph row with every field present. Files are written to a temporary
//! name and renamed into place, so a reader never sees a partial artifact.
//!
//! Author: hephaex@gmail.com

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use uuid::Uuid;

use causegraph_core::{ArtifactSink, CausalError, GraphRow, Result};

/// Artifact sink writing CSV files to a directory
#[derive(Debug, Clone)]
pub struct CsvArtifactStore {
    dir: PathBuf,
}

impl CsvArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Location of a job's artifact
    pub fn path(&self, job_id: Uuid) -> PathBuf {
        self.dir.join(format!("{job_id}.csv"))
    }

    pub(crate) fn encode(rows: &[GraphRow]) -> Result<Vec<u8>> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        if rows.is_empty() {
            writer
                .write_record(["id", "cause", "cause_cluster", "effect", "effect_cluster", "text"])
                .map_err(persistence)?;
        }
        for row in rows {
            writer.serialize(row).map_err(persistence)?;
        }
        writer
            .into_inner()
            .map_err(|e| CausalError::Persistence(e.to_string()))
    }

    fn decode(bytes: &[u8]) -> Result<Vec<GraphRow>> {
        csv::Reader::from_reader(bytes)
            .deserialize()
            .collect::<std::result::Result<Vec<GraphRow>, _>>()
            .map_err(persistence)
    }
}

fn persistence(err: impl std::fmt::Display) -> CausalError {
    CausalError::Persistence(err.to_string())
}

#[async_trait]
impl ArtifactSink for CsvArtifactStore {
    async fn persist(&self, job_id: Uuid, rows: &[GraphRow]) -> Result<PathBuf> {
        let bytes = Self::encode(rows)?;
        let path = self.path(job_id);
        let staging = self.dir.join(format!("{job_id}.csv.tmp"));

        tokio::fs::create_dir_all(&self.dir).await.map_err(persistence)?;
        tokio::fs::write(&staging, &bytes).await.map_err(persistence)?;
        tokio::fs::rename(&staging, &path).await.map_err(persistence)?;

        tracing::info!(%job_id, rows = rows.len(), path = %path.display(), "Artifact persisted");
        Ok(path)
    }

    async fn load(&self, job_id: Uuid) -> Result<Vec<GraphRow>> {
        let bytes = self.read_raw(job_id).await?;
        Self::decode(&bytes)
    }

    async fn read_raw(&self, job_id: Uuid) -> Result<Vec<u8>> {
        match tokio::fs::read(self.path(job_id)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(CausalError::NotFound(format!(
                "No artifact for job {job_id}"
            ))),
            Err(e) => Err(persistence(e)),
        }
    }

    async fn remove(&self, job_id: Uuid) -> Result<()> {
        match tokio::fs::remove_file(self.path(job_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(persistence(e)),
        }
    }
}
