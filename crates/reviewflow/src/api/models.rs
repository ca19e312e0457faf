use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog::CatalogQuery;
use crate::jobs::model::JobRecord;

#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    pub query: CatalogQuery,
    pub batch_size: Option<u32>,
    pub delay_between_batches_ms: Option<u64>,
    pub publish_status: Option<String>,
    pub skip_existing: Option<bool>,
    pub max_retries: Option<u32>,
    pub total_limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct CreateJobResponse {
    pub job_id: Uuid,
    pub total_items: u32,
}

#[derive(Debug, Deserialize)]
pub struct ListJobsParams {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ListJobsResponse {
    /// Stale processing jobs the reaper reset while serving this request.
    pub reset_stale: u64,
    pub jobs: Vec<JobRecord>,
}

#[derive(Debug, Serialize)]
pub struct CancelJobResponse {
    pub job_id: Uuid,
    pub cancelled: bool,
}
