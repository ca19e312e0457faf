use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::jobs::model::{JobProgress, JobRecord, JobResult, JobStatus, NewJob};
use crate::jobs::store::{JobStore, StatusCounts};

const JOB_COLUMNS: &str = "id, job_type, config, status, progress, result, error, \
                           started_at, completed_at, created_at, updated_at";

#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn job_from_row(row: &PgRow) -> anyhow::Result<JobRecord> {
    let status_raw: String = row.get("status");
    let status = JobStatus::parse(&status_raw)
        .ok_or_else(|| anyhow::anyhow!("unknown job status in database: {status_raw}"))?;

    let config: serde_json::Value = row.get("config");
    let progress: serde_json::Value = row.get("progress");
    let result: Option<serde_json::Value> = row.get("result");

    Ok(JobRecord {
        id: row.get("id"),
        job_type: row.get("job_type"),
        config: serde_json::from_value(config)?,
        status,
        progress: serde_json::from_value(progress)?,
        result: result.map(serde_json::from_value).transpose()?,
        error: row.get("error"),
        started_at: row.get("started_at"),
        completed_at: row.get("completed_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create(&self, job: NewJob) -> anyhow::Result<JobRecord> {
        let id = Uuid::new_v4();
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO bulk_jobs (id, job_type, config, status, progress)
            VALUES ($1, $2, $3, 'pending', $4)
            RETURNING {JOB_COLUMNS}
            "#,
        ))
        .bind(id)
        .bind(&job.job_type)
        .bind(serde_json::to_value(&job.config)?)
        .bind(serde_json::to_value(JobProgress::default())?)
        .fetch_one(&self.pool)
        .await?;

        job_from_row(&row)
    }

    async fn get(&self, job_id: Uuid) -> anyhow::Result<Option<JobRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM bulk_jobs WHERE id = $1"
        ))
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(job_from_row).transpose()
    }

    async fn list(&self, limit: i64) -> anyhow::Result<Vec<JobRecord>> {
        let limit = limit.clamp(1, 500);
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM bulk_jobs ORDER BY created_at DESC, id DESC LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(job_from_row).collect()
    }

    async fn find_processing(&self) -> anyhow::Result<Vec<JobRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM bulk_jobs WHERE status = 'processing' ORDER BY created_at ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(job_from_row).collect()
    }

    async fn mark_processing(&self, job_id: Uuid) -> anyhow::Result<bool> {
        let res = sqlx::query(
            r#"
            UPDATE bulk_jobs
            SET status = 'processing',
                started_at = COALESCE(started_at, now()),
                updated_at = now()
            WHERE id = $1
              AND status IN ('pending', 'processing')
            "#,
        )
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        Ok(res.rows_affected() > 0)
    }

    async fn update_progress(&self, job_id: Uuid, progress: &JobProgress) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE bulk_jobs
            SET progress = $2,
                updated_at = now()
            WHERE id = $1
              AND status = 'processing'
            "#,
        )
        .bind(job_id)
        .bind(serde_json::to_value(progress)?)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn complete(&self, job_id: Uuid, result: &JobResult) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE bulk_jobs
            SET status = 'completed',
                result = $2,
                completed_at = now(),
                updated_at = now()
            WHERE id = $1
              AND status = 'processing'
            "#,
        )
        .bind(job_id)
        .bind(serde_json::to_value(result)?)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn fail(&self, job_id: Uuid, error: &str) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE bulk_jobs
            SET status = 'failed',
                error = $2,
                completed_at = now(),
                updated_at = now()
            WHERE id = $1
              AND status = 'processing'
            "#,
        )
        .bind(job_id)
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn cancel(&self, job_id: Uuid) -> anyhow::Result<bool> {
        let res = sqlx::query(
            r#"
            UPDATE bulk_jobs
            SET status = 'cancelled',
                completed_at = now(),
                updated_at = now()
            WHERE id = $1
              AND status IN ('pending', 'processing')
            "#,
        )
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        Ok(res.rows_affected() > 0)
    }

    async fn reap_stale(&self, cutoff: DateTime<Utc>, error: &str) -> anyhow::Result<u64> {
        let res = sqlx::query(
            r#"
            UPDATE bulk_jobs
            SET status = 'failed',
                error = $2,
                completed_at = now(),
                updated_at = now()
            WHERE status = 'processing'
              AND updated_at < $1
            "#,
        )
        .bind(cutoff)
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(res.rows_affected())
    }

    async fn status_counts(&self) -> anyhow::Result<StatusCounts> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM bulk_jobs GROUP BY status")
                .fetch_all(&self.pool)
                .await?;

        let mut counts = StatusCounts::default();
        for (status, count) in rows {
            match JobStatus::parse(&status) {
                Some(JobStatus::Pending) => counts.pending = count,
                Some(JobStatus::Processing) => counts.processing = count,
                Some(JobStatus::Completed) => counts.completed = count,
                Some(JobStatus::Failed) => counts.failed = count,
                Some(JobStatus::Cancelled) => counts.cancelled = count,
                None => {}
            }
        }
        Ok(counts)
    }
}
