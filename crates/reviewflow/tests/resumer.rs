mod common;

use std::sync::Arc;

use common::{candidates, create_job, job_config, processor, Behavior, ScriptedCatalog, ScriptedSynthesizer};
use reviewflow::jobs::{InMemoryJobStore, JobStatus, JobStore, ResumeGuard, Resumer};

fn resumer(
    store: Arc<InMemoryJobStore>,
    catalog: Arc<ScriptedCatalog>,
    synth: Arc<ScriptedSynthesizer>,
) -> Resumer {
    let processor = processor(store.clone(), catalog, synth);
    Resumer::new(store, processor, Arc::new(ResumeGuard::new()))
}

#[tokio::test]
async fn resumes_an_interrupted_job_to_completion() {
    let store = Arc::new(InMemoryJobStore::new());
    let synth = Arc::new(ScriptedSynthesizer::new(Behavior::Succeed));
    let catalog = Arc::new(ScriptedCatalog::new(candidates(3)));

    // Simulate a crash: the job was claimed but never finalized.
    let job_id = create_job(&store, job_config(2, 0, 1)).await;
    store.mark_processing(job_id).await.unwrap();

    let resumer = resumer(store.clone(), catalog, synth);
    assert_eq!(resumer.resume_incomplete().await, 1);

    let job = store.get(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.progress.total_items, 3);
    assert_eq!(job.progress.successful_items, 3);
}

#[tokio::test]
async fn second_sweep_in_the_same_process_is_a_no_op() {
    let store = Arc::new(InMemoryJobStore::new());
    let synth = Arc::new(ScriptedSynthesizer::new(Behavior::Succeed));
    let catalog = Arc::new(ScriptedCatalog::new(candidates(1)));

    let job_id = create_job(&store, job_config(1, 0, 1)).await;
    store.mark_processing(job_id).await.unwrap();

    let resumer = resumer(store.clone(), catalog, synth);
    assert_eq!(resumer.resume_incomplete().await, 1);

    // Even with another job stuck in processing, the guard wins.
    let second = create_job(&store, job_config(1, 0, 1)).await;
    store.mark_processing(second).await.unwrap();
    assert_eq!(resumer.resume_incomplete().await, 0);
    assert_eq!(
        store.get(second).await.unwrap().unwrap().status,
        JobStatus::Processing
    );
}

#[tokio::test]
async fn sweep_ignores_pending_and_terminal_jobs() {
    let store = Arc::new(InMemoryJobStore::new());
    let synth = Arc::new(ScriptedSynthesizer::new(Behavior::Succeed));
    let catalog = Arc::new(ScriptedCatalog::new(candidates(1)));

    let pending = create_job(&store, job_config(1, 0, 1)).await;
    let cancelled = create_job(&store, job_config(1, 0, 1)).await;
    store.cancel(cancelled).await.unwrap();

    let resumer = resumer(store.clone(), catalog, synth);
    assert_eq!(resumer.resume_incomplete().await, 0);

    assert_eq!(
        store.get(pending).await.unwrap().unwrap().status,
        JobStatus::Pending
    );
    assert_eq!(
        store.get(cancelled).await.unwrap().unwrap().status,
        JobStatus::Cancelled
    );
}

#[tokio::test]
async fn resume_skips_the_already_processed_prefix() {
    let store = Arc::new(InMemoryJobStore::new());
    let synth = Arc::new(ScriptedSynthesizer::new(Behavior::Succeed));
    let catalog = Arc::new(ScriptedCatalog::new(candidates(5)));

    // Crashed run: two items were already processed successfully.
    let job_id = create_job(&store, job_config(2, 0, 1)).await;
    store.mark_processing(job_id).await.unwrap();
    let mut progress = store.get(job_id).await.unwrap().unwrap().progress;
    progress.total_items = 5;
    progress.total_batches = 3;
    progress.processed_items = 2;
    progress.successful_items = 2;
    progress.current_batch = 1;
    store.update_progress(job_id, &progress).await.unwrap();

    let resumer = resumer(store.clone(), catalog, synth.clone());
    assert_eq!(resumer.resume_incomplete().await, 1);

    let job = store.get(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.progress.processed_items, 5);
    assert_eq!(job.progress.successful_items, 5);
    assert_eq!(job.progress.total_batches, 3);

    // The counters carried over; only the remaining items were re-synthesized.
    assert_eq!(synth.calls_for("Item 1"), 0);
    assert_eq!(synth.calls_for("Item 2"), 0);
    assert_eq!(synth.calls_for("Item 3"), 1);
    assert_eq!(synth.calls_for("Item 5"), 1);
}
