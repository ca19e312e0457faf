use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::jobs::model::{JobProgress, JobRecord, JobResult, JobStatus, NewJob};

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StatusCounts {
    pub pending: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
    pub cancelled: i64,
}

/// Durable storage for job records.
///
/// Transition guards live here so no caller can mutate a terminal job:
/// `mark_processing` accepts pending (first claim) and processing (resume);
/// `update_progress`/`complete`/`fail` only touch processing jobs; `cancel`
/// only pending or processing ones.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create(&self, job: NewJob) -> anyhow::Result<JobRecord>;

    async fn get(&self, job_id: Uuid) -> anyhow::Result<Option<JobRecord>>;

    /// Newest-first listing. `limit` is clamped to [1, 500].
    async fn list(&self, limit: i64) -> anyhow::Result<Vec<JobRecord>>;

    async fn find_processing(&self) -> anyhow::Result<Vec<JobRecord>>;

    /// Claim the job for processing, setting `started_at` on first entry.
    /// Returns false if the job is terminal (claim refused).
    async fn mark_processing(&self, job_id: Uuid) -> anyhow::Result<bool>;

    /// Overwrite progress counters. No-op unless the job is processing;
    /// bumps `updated_at`, which is what keeps the reaper away.
    async fn update_progress(&self, job_id: Uuid, progress: &JobProgress) -> anyhow::Result<()>;

    async fn complete(&self, job_id: Uuid, result: &JobResult) -> anyhow::Result<()>;

    async fn fail(&self, job_id: Uuid, error: &str) -> anyhow::Result<()>;

    /// Returns false if the job was already terminal.
    async fn cancel(&self, job_id: Uuid) -> anyhow::Result<bool>;

    /// Fail every processing job whose `updated_at` is older than `cutoff`.
    /// Returns the number of jobs reset.
    async fn reap_stale(&self, cutoff: DateTime<Utc>, error: &str) -> anyhow::Result<u64>;

    async fn status_counts(&self) -> anyhow::Result<StatusCounts>;
}

/// In-memory store used by tests and local development. Cloning shares the
/// underlying map.
#[derive(Clone, Default)]
pub struct InMemoryJobStore {
    inner: Arc<Mutex<HashMap<Uuid, JobRecord>>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test hook: backdate a job's `updated_at` to simulate staleness.
    pub fn set_updated_at(&self, job_id: Uuid, at: DateTime<Utc>) {
        if let Some(job) = self.inner.lock().unwrap().get_mut(&job_id) {
            job.updated_at = at;
        }
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, job: NewJob) -> anyhow::Result<JobRecord> {
        let now = Utc::now();
        let record = JobRecord {
            id: Uuid::new_v4(),
            job_type: job.job_type,
            config: job.config,
            status: JobStatus::Pending,
            progress: JobProgress::default(),
            result: None,
            error: None,
            started_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        };
        self.inner
            .lock()
            .unwrap()
            .insert(record.id, record.clone());
        Ok(record)
    }

    async fn get(&self, job_id: Uuid) -> anyhow::Result<Option<JobRecord>> {
        Ok(self.inner.lock().unwrap().get(&job_id).cloned())
    }

    async fn list(&self, limit: i64) -> anyhow::Result<Vec<JobRecord>> {
        let limit = limit.clamp(1, 500) as usize;
        let mut jobs: Vec<JobRecord> = self.inner.lock().unwrap().values().cloned().collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs.truncate(limit);
        Ok(jobs)
    }

    async fn find_processing(&self) -> anyhow::Result<Vec<JobRecord>> {
        let mut jobs: Vec<JobRecord> = self
            .inner
            .lock()
            .unwrap()
            .values()
            .filter(|j| j.status == JobStatus::Processing)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(jobs)
    }

    async fn mark_processing(&self, job_id: Uuid) -> anyhow::Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        let Some(job) = inner.get_mut(&job_id) else {
            anyhow::bail!("job {job_id} not found");
        };
        if job.status.is_terminal() {
            return Ok(false);
        }
        job.status = JobStatus::Processing;
        let now = Utc::now();
        job.started_at.get_or_insert(now);
        job.updated_at = now;
        Ok(true)
    }

    async fn update_progress(&self, job_id: Uuid, progress: &JobProgress) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(job) = inner.get_mut(&job_id) {
            if job.status == JobStatus::Processing {
                job.progress = progress.clone();
                job.updated_at = Utc::now();
            }
        }
        Ok(())
    }

    async fn complete(&self, job_id: Uuid, result: &JobResult) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(job) = inner.get_mut(&job_id) {
            if job.status == JobStatus::Processing {
                job.status = JobStatus::Completed;
                job.result = Some(result.clone());
                let now = Utc::now();
                job.completed_at = Some(now);
                job.updated_at = now;
            }
        }
        Ok(())
    }

    async fn fail(&self, job_id: Uuid, error: &str) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(job) = inner.get_mut(&job_id) {
            if job.status == JobStatus::Processing {
                job.status = JobStatus::Failed;
                job.error = Some(error.to_string());
                let now = Utc::now();
                job.completed_at = Some(now);
                job.updated_at = now;
            }
        }
        Ok(())
    }

    async fn cancel(&self, job_id: Uuid) -> anyhow::Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        let Some(job) = inner.get_mut(&job_id) else {
            anyhow::bail!("job {job_id} not found");
        };
        if job.status.is_terminal() {
            return Ok(false);
        }
        job.status = JobStatus::Cancelled;
        let now = Utc::now();
        job.completed_at = Some(now);
        job.updated_at = now;
        Ok(true)
    }

    async fn reap_stale(&self, cutoff: DateTime<Utc>, error: &str) -> anyhow::Result<u64> {
        let mut inner = self.inner.lock().unwrap();
        let mut reset = 0;
        let now = Utc::now();
        for job in inner.values_mut() {
            if job.status == JobStatus::Processing && job.updated_at < cutoff {
                job.status = JobStatus::Failed;
                job.error = Some(error.to_string());
                job.completed_at = Some(now);
                job.updated_at = now;
                reset += 1;
            }
        }
        Ok(reset)
    }

    async fn status_counts(&self) -> anyhow::Result<StatusCounts> {
        let inner = self.inner.lock().unwrap();
        let mut counts = StatusCounts::default();
        for job in inner.values() {
            match job.status {
                JobStatus::Pending => counts.pending += 1,
                JobStatus::Processing => counts.processing += 1,
                JobStatus::Completed => counts.completed += 1,
                JobStatus::Failed => counts.failed += 1,
                JobStatus::Cancelled => counts.cancelled += 1,
            }
        }
        Ok(counts)
    }
}
