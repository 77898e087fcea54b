//! Job metadata store
//!
//! Holds job records for every worker and API handler. Records expire a
//! fixed time after their last write, so finished jobs are archived away
//! without an explicit sweep.
//!
//! Uses the moka crate for thread-safe, async-compatible caching with TTL
//! support.
//!
//! Author: hephaex@gmail.com

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use uuid::Uuid;

use causegraph_core::{CausalError, Job, Result};

/// Default number of job records kept before eviction
const DEFAULT_MAX_CAPACITY: u64 = 100_000;

/// Shared, TTL-bounded store of job records
///
/// Cloning is cheap; clones share the same records. Each job has a single
/// writer (the worker executing it), so read-modify-write through
/// [`JobStore::update`] does not race with another writer.
#[derive(Clone)]
pub struct JobStore {
    jobs: Cache<Uuid, Arc<Job>>,
}

impl JobStore {
    /// Create a store whose records expire `ttl` after their last write
    pub fn new(ttl: Duration) -> Self {
        Self::with_capacity(ttl, DEFAULT_MAX_CAPACITY)
    }

    pub fn with_capacity(ttl: Duration, max_capacity: u64) -> Self {
        let jobs = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(ttl)
            .build();
        Self { jobs }
    }

    /// Store a job record, replacing any record with the same id
    pub async fn insert(&self, job: Job) {
        self.jobs.insert(job.id, Arc::new(job)).await;
    }

    /// Snapshot of a job record
    pub async fn get(&self, job_id: Uuid) -> Option<Job> {
        self.jobs.get(&job_id).await.map(|job| (*job).clone())
    }

    /// Snapshot of a job record, or `NotFound`
    pub async fn require(&self, job_id: Uuid) -> Result<Job> {
        self.get(job_id)
            .await
            .ok_or_else(|| CausalError::NotFound(format!("Job not found: {job_id}")))
    }

    /// Apply `f` to a job record and store the result
    ///
    /// # Returns
    /// The updated record, or None when the job is unknown or expired
    pub async fn update<F>(&self, job_id: Uuid, f: F) -> Option<Job>
    where
        F: FnOnce(&mut Job),
    {
        let mut job = self.get(job_id).await?;
        f(&mut job);
        self.jobs.insert(job_id, Arc::new(job.clone())).await;
        Some(job)
    }

    /// Remove a job record, returning it if it existed
    pub async fn remove(&self, job_id: Uuid) -> Option<Job> {
        self.jobs.remove(&job_id).await.map(|job| (*job).clone())
    }

    pub fn contains(&self, job_id: Uuid) -> bool {
        self.jobs.contains_key(&job_id)
    }

    /// Approximate number of records
    pub fn entry_count(&self) -> u64 {
        self.jobs.entry_count()
    }
}

impl Default for JobStore {
    fn default() -> Self {
        // one day
        Self::new(Duration::from_secs(86_400))
    }
}
