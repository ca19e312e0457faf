use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::error;
use uuid::Uuid;

use crate::catalog::CatalogClient;
use crate::jobs::model::{JobConfig, JobRecord, NewJob, JOB_TYPE_BULK_CREATE};
use crate::jobs::processor::BatchProcessor;
use crate::jobs::reaper::Reaper;
use crate::jobs::resumer::Resumer;
use crate::jobs::store::{JobStore, StatusCounts};

pub mod models;

use models::{
    CancelJobResponse, CreateJobRequest, CreateJobResponse, ListJobsParams, ListJobsResponse,
};

/// Request-side defaults applied before a request is frozen into a job's
/// config snapshot.
#[derive(Clone, Debug)]
pub struct JobDefaults {
    pub batch_size: u32,
    pub delay_between_batches_ms: u64,
    pub max_retries: u32,
}

#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<dyn JobStore>,
    pub catalog: Arc<dyn CatalogClient>,
    pub processor: BatchProcessor,
    pub reaper: Reaper,
    pub resumer: Resumer,
    pub defaults: JobDefaults,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/jobs", get(list_jobs).post(create_bulk_job))
        .route("/jobs/:id", get(get_job))
        .route("/jobs/:id/cancel", post(cancel_job))
        .route("/metrics", get(metrics))
        .route("/health", get(health))
        .with_state(state)
}

fn internal_err(e: anyhow::Error) -> (StatusCode, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("internal error: {e}"),
    )
}

/// Opportunistic resume trigger: the guard makes every call after the first a
/// no-op, so request handlers can fire it blindly.
fn trigger_resume(state: &ApiState) {
    let resumer = state.resumer.clone();
    tokio::spawn(async move {
        resumer.resume_incomplete().await;
    });
}

pub async fn create_bulk_job(
    State(state): State<ApiState>,
    Json(body): Json<CreateJobRequest>,
) -> Result<(StatusCode, Json<CreateJobResponse>), (StatusCode, String)> {
    trigger_resume(&state);

    let batch_size = body.batch_size.unwrap_or(state.defaults.batch_size);
    if batch_size == 0 {
        return Err((StatusCode::BAD_REQUEST, "batch_size must be > 0".into()));
    }
    let max_retries = body.max_retries.unwrap_or(state.defaults.max_retries);
    if max_retries == 0 {
        return Err((StatusCode::BAD_REQUEST, "max_retries must be > 0".into()));
    }
    if matches!(body.total_limit, Some(0)) {
        return Err((StatusCode::BAD_REQUEST, "total_limit must be > 0".into()));
    }

    // The catalog is consulted before any job record exists: an empty result
    // is reported synchronously and nothing is ever persisted for it.
    let candidates = state
        .catalog
        .fetch_candidates(&body.query)
        .await
        .map_err(|e| (StatusCode::BAD_GATEWAY, format!("catalog fetch failed: {e}")))?;

    if candidates.is_empty() {
        return Err((StatusCode::NOT_FOUND, "no items found".into()));
    }

    let config = JobConfig {
        query: body.query,
        batch_size,
        delay_between_batches_ms: body
            .delay_between_batches_ms
            .unwrap_or(state.defaults.delay_between_batches_ms),
        publish_status: body.publish_status.unwrap_or_else(|| "draft".to_string()),
        skip_existing: body.skip_existing.unwrap_or(true),
        max_retries,
        total_limit: body.total_limit,
    };

    let job = state
        .store
        .create(NewJob {
            job_type: JOB_TYPE_BULK_CREATE.to_string(),
            config,
        })
        .await
        .map_err(internal_err)?;

    let total_items = match job.config.total_limit {
        Some(limit) => (candidates.len() as u32).min(limit),
        None => candidates.len() as u32,
    };

    let processor = state.processor.clone();
    let job_id = job.id;
    tokio::spawn(async move {
        if let Err(e) = processor.run_with_candidates(job_id, candidates).await {
            error!(%job_id, error = %e, "bulk job processing aborted");
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(CreateJobResponse { job_id, total_items }),
    ))
}

pub async fn get_job(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> Result<Json<JobRecord>, (StatusCode, String)> {
    let job = state.store.get(id).await.map_err(internal_err)?;
    match job {
        Some(job) => Ok(Json(job)),
        None => Err((StatusCode::NOT_FOUND, format!("job {id} not found"))),
    }
}

pub async fn list_jobs(
    State(state): State<ApiState>,
    Query(params): Query<ListJobsParams>,
) -> Result<Json<ListJobsResponse>, (StatusCode, String)> {
    trigger_resume(&state);

    // Listing doubles as the reap trigger so zombie jobs never linger in the
    // operator's view.
    let reset_stale = state.reaper.reap().await.map_err(internal_err)?;

    let jobs = state
        .store
        .list(params.limit.unwrap_or(100))
        .await
        .map_err(internal_err)?;

    Ok(Json(ListJobsResponse { reset_stale, jobs }))
}

pub async fn cancel_job(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CancelJobResponse>, (StatusCode, String)> {
    if state.store.get(id).await.map_err(internal_err)?.is_none() {
        return Err((StatusCode::NOT_FOUND, format!("job {id} not found")));
    }

    let cancelled = state.store.cancel(id).await.map_err(internal_err)?;
    Ok(Json(CancelJobResponse {
        job_id: id,
        cancelled,
    }))
}

pub async fn metrics(
    State(state): State<ApiState>,
) -> Result<Json<StatusCounts>, (StatusCode, String)> {
    let counts = state.store.status_counts().await.map_err(internal_err)?;
    Ok(Json(counts))
}

pub async fn health() -> &'static str {
    "ok"
}
