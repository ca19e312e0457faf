use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog::CatalogQuery;
use crate::reviews::ReviewRef;

pub const JOB_TYPE_BULK_CREATE: &str = "bulk_create";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            "cancelled" => Some(JobStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

/// Immutable snapshot of the ingestion request. Set once at creation and
/// never mutated; a resume re-reads it to re-derive the candidate set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    pub query: CatalogQuery,
    pub batch_size: u32,
    pub delay_between_batches_ms: u64,
    pub publish_status: String,
    pub skip_existing: bool,
    pub max_retries: u32,
    pub total_limit: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobProgress {
    pub total_items: u32,
    pub processed_items: u32,
    pub successful_items: u32,
    pub failed_items: u32,
    pub skipped_items: u32,
    pub current_batch: u32,
    pub total_batches: u32,
    pub current_item: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemError {
    pub item: String,
    pub message: String,
}

/// Terminal outcome of a job: everything it produced plus every per-item
/// error. Written exactly once, when the job completes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobResult {
    pub reviews: Vec<ReviewRef>,
    pub errors: Vec<ItemError>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub id: Uuid,
    pub job_type: String,
    pub config: JobConfig,
    pub status: JobStatus,
    pub progress: JobProgress,
    pub result: Option<JobResult>,
    pub error: Option<String>,

    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewJob {
    pub job_type: String,
    pub config: JobConfig,
}
