use std::sync::Arc;
use std::time::Duration;

use rand::{rngs::StdRng, SeedableRng};
use tracing::{info, warn};
use uuid::Uuid;

use crate::catalog::{Candidate, CatalogClient};
use crate::jobs::model::{ItemError, JobResult, JobStatus};
use crate::jobs::retry::{next_delay_ms, RetryPolicy};
use crate::jobs::store::JobStore;
use crate::synth::{ContentSynthesizer, SynthesisError, SynthesisOptions};

enum ItemOutcome {
    Created(crate::reviews::ReviewRef),
    Skipped,
    Failed(String),
}

/// Executes one job record end-to-end: partitions the candidate set into
/// batches, drives per-item synthesis with retry, updates progress after
/// every item, and finalizes the job.
#[derive(Clone)]
pub struct BatchProcessor {
    store: Arc<dyn JobStore>,
    catalog: Arc<dyn CatalogClient>,
    synth: Arc<dyn ContentSynthesizer>,
    retry: RetryPolicy,
}

impl BatchProcessor {
    pub fn new(
        store: Arc<dyn JobStore>,
        catalog: Arc<dyn CatalogClient>,
        synth: Arc<dyn ContentSynthesizer>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            catalog,
            synth,
            retry,
        }
    }

    /// Re-derive the candidate set from the job's own config and process it.
    /// This is the resume path; the create path already holds candidates and
    /// goes through [`run_with_candidates`](Self::run_with_candidates).
    pub async fn run(&self, job_id: Uuid) -> anyhow::Result<()> {
        let Some(job) = self.store.get(job_id).await? else {
            anyhow::bail!("job {job_id} not found");
        };
        if job.status.is_terminal() {
            return Ok(());
        }
        if !self.store.mark_processing(job_id).await? {
            return Ok(());
        }

        match self.catalog.fetch_candidates(&job.config.query).await {
            Ok(candidates) if candidates.is_empty() => {
                self.store.fail(job_id, "no items found in catalog").await
            }
            Ok(candidates) => self.drive(job_id, candidates).await,
            Err(e) => {
                self.store
                    .fail(job_id, &format!("catalog fetch failed: {e}"))
                    .await
            }
        }
    }

    /// Process a job whose candidates were already fetched at
    /// request-acceptance time.
    pub async fn run_with_candidates(
        &self,
        job_id: Uuid,
        candidates: Vec<Candidate>,
    ) -> anyhow::Result<()> {
        if !self.store.mark_processing(job_id).await? {
            return Ok(());
        }
        self.drive(job_id, candidates).await
    }

    /// Item-level errors are absorbed into the result; anything escaping the
    /// batch loop itself aborts the whole job as failed.
    async fn drive(&self, job_id: Uuid, candidates: Vec<Candidate>) -> anyhow::Result<()> {
        match self.process_batches(job_id, candidates).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(%job_id, error = %e, "job aborted");
                self.store.fail(job_id, &e.to_string()).await
            }
        }
    }

    async fn process_batches(
        &self,
        job_id: Uuid,
        mut candidates: Vec<Candidate>,
    ) -> anyhow::Result<()> {
        let Some(job) = self.store.get(job_id).await? else {
            anyhow::bail!("job {job_id} not found");
        };
        let cfg = job.config.clone();

        if let Some(limit) = cfg.total_limit {
            candidates.truncate(limit as usize);
        }

        let batch_size = cfg.batch_size.max(1) as usize;
        let total = candidates.len() as u32;

        // total_items is fixed here and never changes mid-run. A resume picks
        // up the counters where the crashed run left them and skips the
        // already-processed prefix of the (re-derived) candidate list.
        let mut progress = job.progress.clone();
        progress.total_items = total;
        progress.total_batches = (total.max(1) as usize).div_ceil(batch_size) as u32;

        let offset = (progress.processed_items as usize).min(candidates.len());
        let done_batches = offset / batch_size;
        let remaining = &candidates[offset..];

        let opts = SynthesisOptions {
            publish_status: cfg.publish_status.clone(),
            skip_existing: cfg.skip_existing,
        };
        let max_attempts = cfg.max_retries.max(1);

        let mut result = JobResult::default();
        let batches: Vec<&[Candidate]> = remaining.chunks(batch_size).collect();

        for (i, batch) in batches.iter().enumerate() {
            // Cooperative cancellation, batch granularity: an in-flight batch
            // always finishes, but no new batch starts on a cancelled job.
            let Some(current) = self.store.get(job_id).await? else {
                anyhow::bail!("job {job_id} disappeared mid-run");
            };
            if current.status == JobStatus::Cancelled {
                info!(%job_id, "job cancelled, stopping before next batch");
                return Ok(());
            }

            progress.current_batch = (done_batches + i + 1) as u32;

            for item in batch.iter() {
                progress.current_item = Some(item.display_name.clone());
                self.store.update_progress(job_id, &progress).await?;

                match self.process_item(item, &opts, max_attempts).await {
                    ItemOutcome::Created(review) => {
                        progress.successful_items += 1;
                        result.reviews.push(review);
                    }
                    ItemOutcome::Skipped => {
                        progress.skipped_items += 1;
                    }
                    ItemOutcome::Failed(message) => {
                        progress.failed_items += 1;
                        result.errors.push(ItemError {
                            item: item.display_name.clone(),
                            message,
                        });
                    }
                }

                progress.processed_items += 1;
                progress.current_item = None;
                self.store.update_progress(job_id, &progress).await?;
            }

            // Inter-batch throttle for upstream rate limits, skipped after
            // the final batch.
            if i + 1 < batches.len() && cfg.delay_between_batches_ms > 0 {
                tokio::time::sleep(Duration::from_millis(cfg.delay_between_batches_ms)).await;
            }
        }

        info!(
            %job_id,
            successful = progress.successful_items,
            skipped = progress.skipped_items,
            failed = progress.failed_items,
            "job finished"
        );
        self.store.complete(job_id, &result).await
    }

    /// One item, up to `max_attempts` synthesis attempts. Never lets an error
    /// escape: every failure mode collapses into an outcome classification.
    async fn process_item(
        &self,
        item: &Candidate,
        opts: &SynthesisOptions,
        max_attempts: u32,
    ) -> ItemOutcome {
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            match self.synth.synthesize(item, opts).await {
                Ok(review) => return ItemOutcome::Created(review),
                Err(SynthesisError::AlreadyExists) => return ItemOutcome::Skipped,
                Err(SynthesisError::Fatal(message)) => return ItemOutcome::Failed(message),
                Err(SynthesisError::Transient(message)) => {
                    warn!(
                        item = %item.display_name,
                        attempt,
                        max_attempts,
                        error = %message,
                        "synthesis attempt failed"
                    );
                    last_error = message;
                    if attempt < max_attempts {
                        let mut rng = StdRng::from_entropy();
                        let delay = next_delay_ms(attempt, &self.retry, &mut rng);
                        if delay > 0 {
                            tokio::time::sleep(Duration::from_millis(delay)).await;
                        }
                    }
                }
            }
        }

        ItemOutcome::Failed(last_error)
    }
}
