use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use reviewflow::api::{self, ApiState, JobDefaults};
use reviewflow::catalog::HttpCatalogClient;
use reviewflow::config::Config;
use reviewflow::db;
use reviewflow::jobs::{BatchProcessor, PgJobStore, Reaper, ResumeGuard, Resumer, RetryPolicy};
use reviewflow::reviews::PgReviewStore;
use reviewflow::synth::{LlmSynthesizer, OpenAiGenerator};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cfg = Config::from_env()?;
    info!(
        api_addr = %cfg.api_addr,
        stale_after_minutes = cfg.stale_after_minutes,
        batch_size = cfg.default_batch_size,
        "reviewflow starting"
    );

    let pool = db::make_pool(&cfg.database_url).await?;
    db::ensure_schema(&pool).await?;

    let store = Arc::new(PgJobStore::new(pool.clone()));
    let catalog = Arc::new(HttpCatalogClient::new(
        &cfg.catalog_base_url,
        &cfg.catalog_client_id,
        &cfg.catalog_token,
    ));
    let generator = Arc::new(OpenAiGenerator::new(
        &cfg.openai_base_url,
        &cfg.openai_api_key,
        &cfg.openai_model,
    ));
    let reviews = Arc::new(PgReviewStore::new(pool));
    let synth = Arc::new(LlmSynthesizer::new(generator, reviews));

    let processor = BatchProcessor::new(
        store.clone(),
        catalog.clone(),
        synth,
        RetryPolicy::default(),
    );
    let reaper = Reaper::new(store.clone(), cfg.stale_after_minutes);
    let resumer = Resumer::new(
        store.clone(),
        processor.clone(),
        Arc::new(ResumeGuard::new()),
    );

    // Kick the crash-recovery sweep in the background; the guard also lets
    // request handlers trigger it without double-running.
    {
        let resumer = resumer.clone();
        tokio::spawn(async move {
            let resumed = resumer.resume_incomplete().await;
            if resumed > 0 {
                info!(resumed, "resumed jobs left over from a previous process");
            }
        });
    }

    let state = ApiState {
        store,
        catalog,
        processor,
        reaper,
        resumer,
        defaults: JobDefaults {
            batch_size: cfg.default_batch_size,
            delay_between_batches_ms: cfg.default_delay_between_batches_ms,
            max_retries: cfg.default_max_retries,
        },
    };
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(&cfg.api_addr).await?;
    info!("api listening on http://{}", cfg.api_addr);
    axum::serve(listener, app).await?;

    Ok(())
}
