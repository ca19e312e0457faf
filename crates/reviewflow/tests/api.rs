mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Utc;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use common::{api_state, candidates, create_job, job_config, Behavior, ScriptedCatalog, ScriptedSynthesizer};
use reviewflow::api;
use reviewflow::jobs::{InMemoryJobStore, JobStatus, JobStore};

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn wait_for_terminal(store: &InMemoryJobStore, job_id: Uuid) -> JobStatus {
    for _ in 0..500 {
        let job = store.get(job_id).await.unwrap().unwrap();
        if job.status.is_terminal() {
            return job.status;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("job {job_id} never reached a terminal state");
}

#[tokio::test]
async fn empty_catalog_result_creates_no_job() {
    let store = Arc::new(InMemoryJobStore::new());
    let synth = Arc::new(ScriptedSynthesizer::new(Behavior::Succeed));
    let catalog = Arc::new(ScriptedCatalog::new(Vec::new()));
    let app = api::router(api_state(store.clone(), catalog, synth, 30));

    let response = app
        .oneshot(post_json("/jobs", json!({"query": {"search": "nothing"}})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(store.list(100).await.unwrap().is_empty());
}

#[tokio::test]
async fn created_job_runs_to_completion_in_the_background() {
    let store = Arc::new(InMemoryJobStore::new());
    let synth = Arc::new(ScriptedSynthesizer::new(Behavior::Succeed));
    let catalog = Arc::new(ScriptedCatalog::new(candidates(3)));
    let app = api::router(api_state(store.clone(), catalog, synth, 30));

    let response = app
        .clone()
        .oneshot(post_json(
            "/jobs",
            json!({"query": {}, "batch_size": 2, "delay_between_batches_ms": 0}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let body = body_json(response).await;
    assert_eq!(body["total_items"], 3);
    let job_id: Uuid = body["job_id"].as_str().unwrap().parse().unwrap();

    assert_eq!(wait_for_terminal(&store, job_id).await, JobStatus::Completed);

    let response = app.oneshot(get(&format!("/jobs/{job_id}"))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let job = body_json(response).await;
    assert_eq!(job["status"], "completed");
    assert_eq!(job["progress"]["successful_items"], 3);
    assert_eq!(job["result"]["reviews"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn invalid_batch_size_is_rejected() {
    let store = Arc::new(InMemoryJobStore::new());
    let synth = Arc::new(ScriptedSynthesizer::new(Behavior::Succeed));
    let catalog = Arc::new(ScriptedCatalog::new(candidates(1)));
    let app = api::router(api_state(store.clone(), catalog, synth, 30));

    let response = app
        .oneshot(post_json("/jobs", json!({"query": {}, "batch_size": 0})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(store.list(100).await.unwrap().is_empty());
}

#[tokio::test]
async fn listing_reaps_stale_jobs_and_reports_the_count() {
    let store = Arc::new(InMemoryJobStore::new());
    let synth = Arc::new(ScriptedSynthesizer::new(Behavior::Succeed));
    let catalog = Arc::new(ScriptedCatalog::new(candidates(1)));
    let state = api_state(store.clone(), catalog, synth, 30);
    // Burn the resume sweep up front so it cannot race the reaper for the
    // stale job below.
    state.resumer.resume_incomplete().await;
    let app = api::router(state);

    let job_id = create_job(&store, job_config(1, 0, 1)).await;
    store.mark_processing(job_id).await.unwrap();
    store.set_updated_at(job_id, Utc::now() - chrono::Duration::hours(2));

    let response = app.oneshot(get("/jobs")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["reset_stale"], 1);
    assert_eq!(body["jobs"][0]["status"], "failed");
}

#[tokio::test]
async fn cancel_endpoint_flags_pending_jobs() {
    let store = Arc::new(InMemoryJobStore::new());
    let synth = Arc::new(ScriptedSynthesizer::new(Behavior::Succeed));
    let catalog = Arc::new(ScriptedCatalog::new(candidates(1)));
    let app = api::router(api_state(store.clone(), catalog, synth, 30));

    let job_id = create_job(&store, job_config(1, 0, 1)).await;

    let response = app
        .clone()
        .oneshot(post_json(&format!("/jobs/{job_id}/cancel"), json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["cancelled"], true);

    // Already terminal: reported, not re-cancelled.
    let response = app
        .oneshot(post_json(&format!("/jobs/{job_id}/cancel"), json!({})))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["cancelled"], false);
}

#[tokio::test]
async fn unknown_job_id_is_a_404() {
    let store = Arc::new(InMemoryJobStore::new());
    let synth = Arc::new(ScriptedSynthesizer::new(Behavior::Succeed));
    let catalog = Arc::new(ScriptedCatalog::new(candidates(1)));
    let app = api::router(api_state(store, catalog, synth, 30));

    let response = app
        .oneshot(get(&format!("/jobs/{}", Uuid::new_v4())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn metrics_reports_counts_by_status() {
    let store = Arc::new(InMemoryJobStore::new());
    let synth = Arc::new(ScriptedSynthesizer::new(Behavior::Succeed));
    let catalog = Arc::new(ScriptedCatalog::new(candidates(1)));
    let app = api::router(api_state(store.clone(), catalog, synth, 30));

    let _pending = create_job(&store, job_config(1, 0, 1)).await;
    let cancelled = create_job(&store, job_config(1, 0, 1)).await;
    store.cancel(cancelled).await.unwrap();

    let response = app.oneshot(get("/metrics")).await.unwrap();
    let body = body_json(response).await;
    assert_eq!(body["pending"], 1);
    assert_eq!(body["cancelled"], 1);
}
