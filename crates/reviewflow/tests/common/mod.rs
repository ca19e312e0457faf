// Not every test binary uses every helper.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use uuid::Uuid;

use reviewflow::api::{ApiState, JobDefaults};
use reviewflow::catalog::{Candidate, CatalogClient, CatalogQuery};
use reviewflow::jobs::{
    BatchProcessor, InMemoryJobStore, JobConfig, JobStore, NewJob, Reaper, ResumeGuard, Resumer,
    RetryPolicy, JOB_TYPE_BULK_CREATE,
};
use reviewflow::reviews::ReviewRef;
use reviewflow::synth::{slugify, ContentSynthesizer, SynthesisError, SynthesisOptions};

pub fn candidates(n: usize) -> Vec<Candidate> {
    (1..=n)
        .map(|i| Candidate {
            native_id: i as i64,
            display_name: format!("Item {i}"),
        })
        .collect()
}

/// Catalog double returning a fixed candidate list, or a scripted failure.
pub struct ScriptedCatalog {
    candidates: Vec<Candidate>,
    fail_with: Option<String>,
}

impl ScriptedCatalog {
    pub fn new(candidates: Vec<Candidate>) -> Self {
        Self {
            candidates,
            fail_with: None,
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            candidates: Vec::new(),
            fail_with: Some(message.to_string()),
        }
    }
}

#[async_trait]
impl CatalogClient for ScriptedCatalog {
    async fn fetch_candidates(&self, _query: &CatalogQuery) -> anyhow::Result<Vec<Candidate>> {
        if let Some(message) = &self.fail_with {
            anyhow::bail!("{message}");
        }
        Ok(self.candidates.clone())
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    Succeed,
    AlreadyExists,
    Fatal,
    /// Fail transiently this many times, then succeed.
    TransientThenSucceed(u32),
    AlwaysTransient,
}

/// Synthesizer double with per-item scripted behavior and call counting.
pub struct ScriptedSynthesizer {
    default: Behavior,
    behaviors: HashMap<String, Behavior>,
    calls: Mutex<HashMap<String, u32>>,
}

impl ScriptedSynthesizer {
    pub fn new(default: Behavior) -> Self {
        Self {
            default,
            behaviors: HashMap::new(),
            calls: Mutex::new(HashMap::new()),
        }
    }

    pub fn with(mut self, item: &str, behavior: Behavior) -> Self {
        self.behaviors.insert(item.to_string(), behavior);
        self
    }

    pub fn calls_for(&self, item: &str) -> u32 {
        self.calls.lock().unwrap().get(item).copied().unwrap_or(0)
    }
}

#[async_trait]
impl ContentSynthesizer for ScriptedSynthesizer {
    async fn synthesize(
        &self,
        item: &Candidate,
        _opts: &SynthesisOptions,
    ) -> Result<ReviewRef, SynthesisError> {
        let call_no = {
            let mut calls = self.calls.lock().unwrap();
            let entry = calls.entry(item.display_name.clone()).or_insert(0);
            *entry += 1;
            *entry
        };

        let behavior = self
            .behaviors
            .get(&item.display_name)
            .copied()
            .unwrap_or(self.default);

        let succeed = || {
            Ok(ReviewRef {
                id: Uuid::new_v4(),
                title: item.display_name.clone(),
                slug: slugify(&item.display_name),
            })
        };

        match behavior {
            Behavior::Succeed => succeed(),
            Behavior::AlreadyExists => Err(SynthesisError::AlreadyExists),
            Behavior::Fatal => Err(SynthesisError::Fatal("unprocessable item".to_string())),
            Behavior::TransientThenSucceed(failures) if call_no <= failures => {
                Err(SynthesisError::Transient("Network error".to_string()))
            }
            Behavior::TransientThenSucceed(_) => succeed(),
            Behavior::AlwaysTransient => {
                Err(SynthesisError::Transient("Network error".to_string()))
            }
        }
    }
}

pub fn job_config(batch_size: u32, delay_between_batches_ms: u64, max_retries: u32) -> JobConfig {
    JobConfig {
        query: CatalogQuery::default(),
        batch_size,
        delay_between_batches_ms,
        publish_status: "draft".to_string(),
        skip_existing: true,
        max_retries,
        total_limit: None,
    }
}

pub async fn create_job(store: &InMemoryJobStore, config: JobConfig) -> Uuid {
    store
        .create(NewJob {
            job_type: JOB_TYPE_BULK_CREATE.to_string(),
            config,
        })
        .await
        .unwrap()
        .id
}

pub fn processor(
    store: Arc<InMemoryJobStore>,
    catalog: Arc<dyn CatalogClient>,
    synth: Arc<dyn ContentSynthesizer>,
) -> BatchProcessor {
    BatchProcessor::new(store, catalog, synth, RetryPolicy::immediate())
}

pub fn api_state(
    store: Arc<InMemoryJobStore>,
    catalog: Arc<dyn CatalogClient>,
    synth: Arc<dyn ContentSynthesizer>,
    stale_after_minutes: i64,
) -> ApiState {
    let processor = processor(store.clone(), catalog.clone(), synth);
    ApiState {
        store: store.clone(),
        catalog,
        processor: processor.clone(),
        reaper: Reaper::new(store.clone(), stale_after_minutes),
        resumer: Resumer::new(store, processor, Arc::new(ResumeGuard::new())),
        defaults: JobDefaults {
            batch_size: 5,
            delay_between_batches_ms: 0,
            max_retries: 3,
        },
    }
}
