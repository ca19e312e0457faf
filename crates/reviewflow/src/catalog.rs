use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One catalog entry eligible for content synthesis. Ephemeral: never
/// persisted standalone, only fed to the batch processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub native_id: i64,
    pub display_name: String,
}

/// Query parameters forwarded to the upstream catalog. Stored verbatim inside
/// a job's config snapshot so a resume can re-derive the candidate set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogQuery {
    pub search: Option<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    pub min_rating: Option<f64>,
    pub limit: Option<u32>,
}

#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Fetch candidate items matching `query`. An empty list means "no items
    /// found" and is a terminal condition for the caller; an `Err` means the
    /// upstream was unreachable or rejected the query.
    async fn fetch_candidates(&self, query: &CatalogQuery) -> anyhow::Result<Vec<Candidate>>;
}

/// IGDB-style catalog client: POST an apicalypse query body, get back a JSON
/// array of `{id, name}` rows.
pub struct HttpCatalogClient {
    http: reqwest::Client,
    base_url: String,
    client_id: String,
    token: String,
}

#[derive(Deserialize)]
struct CatalogRow {
    id: i64,
    name: String,
}

impl HttpCatalogClient {
    pub fn new(base_url: &str, client_id: &str, token: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            client_id: client_id.to_string(),
            token: token.to_string(),
        }
    }

    fn query_body(query: &CatalogQuery) -> String {
        let mut body = String::from("fields id,name;");
        if let Some(search) = query.search.as_deref().filter(|s| !s.trim().is_empty()) {
            body.push_str(&format!(" search \"{}\";", search.replace('"', "")));
        }
        let mut clauses: Vec<String> = Vec::new();
        if !query.genres.is_empty() {
            let list = query
                .genres
                .iter()
                .map(|g| format!("\"{}\"", g.replace('"', "")))
                .collect::<Vec<_>>()
                .join(",");
            clauses.push(format!("genres.name = ({list})"));
        }
        if let Some(min_rating) = query.min_rating {
            clauses.push(format!("total_rating >= {min_rating}"));
        }
        if !clauses.is_empty() {
            body.push_str(&format!(" where {};", clauses.join(" & ")));
        }
        let limit = query.limit.unwrap_or(50).clamp(1, 500);
        body.push_str(&format!(" limit {limit};"));
        body
    }
}

#[async_trait]
impl CatalogClient for HttpCatalogClient {
    async fn fetch_candidates(&self, query: &CatalogQuery) -> anyhow::Result<Vec<Candidate>> {
        let url = format!("{}/games", self.base_url);
        let resp = self
            .http
            .post(&url)
            .header("Client-ID", &self.client_id)
            .bearer_auth(&self.token)
            .body(Self::query_body(query))
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("catalog request failed: {e}"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("catalog returned {status}: {text}");
        }

        let rows: Vec<CatalogRow> = resp
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("catalog returned malformed payload: {e}"))?;

        Ok(rows
            .into_iter()
            .map(|r| Candidate {
                native_id: r.id,
                display_name: r.name,
            })
            .collect())
    }
}
