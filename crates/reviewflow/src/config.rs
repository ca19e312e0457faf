/// Central runtime configuration, loaded from environment variables.
///
/// Every knob has a default so a bare `REVIEWFLOW_DATABASE_URL` plus the two
/// upstream credentials is enough to boot the server.
#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub api_addr: String,

    pub catalog_base_url: String,
    pub catalog_client_id: String,
    pub catalog_token: String,

    pub openai_base_url: String,
    pub openai_api_key: String,
    pub openai_model: String,

    /// Jobs stuck in `processing` longer than this are reaped as failed.
    pub stale_after_minutes: i64,

    pub default_batch_size: u32,
    pub default_delay_between_batches_ms: u64,
    pub default_max_retries: u32,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = std::env::var("REVIEWFLOW_DATABASE_URL")
            .or_else(|_| std::env::var("DATABASE_URL"))
            .map_err(|_| anyhow::anyhow!("REVIEWFLOW_DATABASE_URL is missing"))?;

        let api_addr =
            env_nonempty("REVIEWFLOW_API_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string());

        let catalog_base_url = env_nonempty("REVIEWFLOW_CATALOG_BASE_URL")
            .unwrap_or_else(|| "https://api.igdb.com/v4".to_string());
        let catalog_client_id = std::env::var("REVIEWFLOW_CATALOG_CLIENT_ID")
            .map_err(|_| anyhow::anyhow!("REVIEWFLOW_CATALOG_CLIENT_ID is missing"))?;
        let catalog_token = std::env::var("REVIEWFLOW_CATALOG_TOKEN")
            .map_err(|_| anyhow::anyhow!("REVIEWFLOW_CATALOG_TOKEN is missing"))?;

        let openai_base_url = env_nonempty("REVIEWFLOW_OPENAI_BASE_URL")
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());
        let openai_api_key = std::env::var("REVIEWFLOW_OPENAI_API_KEY")
            .or_else(|_| std::env::var("OPENAI_API_KEY"))
            .map_err(|_| anyhow::anyhow!("REVIEWFLOW_OPENAI_API_KEY is missing"))?;
        let openai_model =
            env_nonempty("REVIEWFLOW_OPENAI_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string());

        let stale_after_minutes = env_parse("REVIEWFLOW_STALE_AFTER_MINUTES").unwrap_or(30);

        let default_batch_size = env_parse("REVIEWFLOW_BATCH_SIZE").unwrap_or(5);
        let default_delay_between_batches_ms =
            env_parse("REVIEWFLOW_DELAY_BETWEEN_BATCHES_MS").unwrap_or(2_000);
        let default_max_retries = env_parse("REVIEWFLOW_MAX_RETRIES").unwrap_or(3);

        Ok(Self {
            database_url,
            api_addr,
            catalog_base_url,
            catalog_client_id,
            catalog_token,
            openai_base_url,
            openai_api_key,
            openai_model,
            stale_after_minutes,
            default_batch_size,
            default_delay_between_batches_ms,
            default_max_retries,
        })
    }
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_nonempty(key).and_then(|s| s.parse().ok())
}
