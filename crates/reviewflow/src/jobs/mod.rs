pub mod model;
pub mod pg_store;
pub mod processor;
pub mod reaper;
pub mod resumer;
pub mod retry;
pub mod store;

pub use model::{
    ItemError, JobConfig, JobProgress, JobRecord, JobResult, JobStatus, NewJob,
    JOB_TYPE_BULK_CREATE,
};
pub use pg_store::PgJobStore;
pub use processor::BatchProcessor;
pub use reaper::Reaper;
pub use resumer::{ResumeGuard, Resumer};
pub use retry::RetryPolicy;
pub use store::{InMemoryJobStore, JobStore, StatusCounts};
