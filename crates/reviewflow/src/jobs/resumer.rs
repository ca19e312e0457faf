use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{info, warn};

use crate::jobs::processor::BatchProcessor;
use crate::jobs::store::JobStore;

/// Process-wide guard ensuring the resume sweep runs at most once per process
/// lifetime. Explicit singleton injected into whoever triggers resumes, so
/// tests can hand out a fresh one instead of fighting global state.
#[derive(Default)]
pub struct ResumeGuard {
    resumed: AtomicBool,
}

impl ResumeGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// First caller wins; every later call observes `false`.
    pub fn try_claim(&self) -> bool {
        !self.resumed.swap(true, Ordering::SeqCst)
    }

    pub fn has_resumed(&self) -> bool {
        self.resumed.load(Ordering::SeqCst)
    }
}

/// After a process (re)start, continues every job left in `processing`
/// exactly once. Runs opportunistically; its own errors are logged, never
/// surfaced.
#[derive(Clone)]
pub struct Resumer {
    store: Arc<dyn JobStore>,
    processor: BatchProcessor,
    guard: Arc<ResumeGuard>,
}

impl Resumer {
    pub fn new(store: Arc<dyn JobStore>, processor: BatchProcessor, guard: Arc<ResumeGuard>) -> Self {
        Self {
            store,
            processor,
            guard,
        }
    }

    /// Returns the number of jobs re-entered. Zero on every call after the
    /// first, and zero when the sweep itself cannot list jobs.
    pub async fn resume_incomplete(&self) -> u64 {
        if !self.guard.try_claim() {
            return 0;
        }

        let jobs = match self.store.find_processing().await {
            Ok(jobs) => jobs,
            Err(e) => {
                warn!(error = %e, "resume sweep could not list incomplete jobs");
                return 0;
            }
        };

        let mut resumed = 0;
        for job in jobs {
            info!(job_id = %job.id, "resuming job left in processing");
            // Cancelled jobs never show up here; find_processing filters them.
            if let Err(e) = self.processor.run(job.id).await {
                warn!(job_id = %job.id, error = %e, "resume failed");
            }
            resumed += 1;
        }

        if resumed > 0 {
            info!(resumed, "resume sweep finished");
        }
        resumed
    }
}
