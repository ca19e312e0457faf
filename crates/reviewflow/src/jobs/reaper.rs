use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::warn;

use crate::jobs::store::JobStore;

pub const STALE_JOB_ERROR: &str =
    "job stalled: no progress update within the staleness window, reset by reaper";

/// Reclaims jobs stuck in `processing` past the staleness threshold, e.g.
/// after a crash that left nobody around to finalize them. Invoked
/// opportunistically rather than on a schedule; idempotent for anything
/// below the threshold.
#[derive(Clone)]
pub struct Reaper {
    store: Arc<dyn JobStore>,
    stale_after: Duration,
}

impl Reaper {
    pub fn new(store: Arc<dyn JobStore>, stale_after_minutes: i64) -> Self {
        Self {
            store,
            stale_after: Duration::minutes(stale_after_minutes),
        }
    }

    /// Returns how many jobs were reset so callers can report it.
    pub async fn reap(&self) -> anyhow::Result<u64> {
        let cutoff = stale_cutoff(self.stale_after);
        let reset = self.store.reap_stale(cutoff, STALE_JOB_ERROR).await?;
        if reset > 0 {
            warn!(reset, "reaped stale processing jobs");
        }
        Ok(reset)
    }
}

pub fn stale_cutoff(stale_after: Duration) -> DateTime<Utc> {
    Utc::now() - stale_after
}
