use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::catalog::Candidate;
use crate::reviews::{NewReview, ReviewRef, ReviewStore};

/// Typed synthesis outcome taxonomy. `AlreadyExists` is never retried and
/// classifies the item as skipped; `Transient` is retried with backoff;
/// `Fatal` fails the item on the first attempt.
#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("already exists")]
    AlreadyExists,
    #[error("{0}")]
    Transient(String),
    #[error("{0}")]
    Fatal(String),
}

#[derive(Debug, Clone)]
pub struct SynthesisOptions {
    /// Publish status the produced review is created with ("draft",
    /// "published", ...).
    pub publish_status: String,
    /// When set, an item whose slug already has a review is reported as
    /// `AlreadyExists` instead of being regenerated.
    pub skip_existing: bool,
}

#[async_trait]
pub trait ContentSynthesizer: Send + Sync {
    /// Produce and persist one review for `item`, returning the stored
    /// reference on success.
    async fn synthesize(
        &self,
        item: &Candidate,
        opts: &SynthesisOptions,
    ) -> Result<ReviewRef, SynthesisError>;
}

/// Raw review content as produced by a generator, before persistence.
#[derive(Debug, Clone, Deserialize)]
pub struct ReviewDraft {
    pub title: String,
    pub body: String,
    pub score: f32,
    #[serde(default)]
    pub pros: Vec<String>,
    #[serde(default)]
    pub cons: Vec<String>,
}

#[async_trait]
pub trait ReviewGenerator: Send + Sync {
    async fn generate(&self, item: &Candidate) -> Result<ReviewDraft, SynthesisError>;
}

/// Default synthesizer: asks a generator for review content, then persists it
/// under a slug derived from the item name. The skip-existing check happens
/// before any generation work so skipped items cost a single lookup.
pub struct LlmSynthesizer {
    generator: Arc<dyn ReviewGenerator>,
    reviews: Arc<dyn ReviewStore>,
}

impl LlmSynthesizer {
    pub fn new(generator: Arc<dyn ReviewGenerator>, reviews: Arc<dyn ReviewStore>) -> Self {
        Self { generator, reviews }
    }
}

#[async_trait]
impl ContentSynthesizer for LlmSynthesizer {
    async fn synthesize(
        &self,
        item: &Candidate,
        opts: &SynthesisOptions,
    ) -> Result<ReviewRef, SynthesisError> {
        let slug = slugify(&item.display_name);

        if opts.skip_existing {
            let existing = self
                .reviews
                .find_by_slug(&slug)
                .await
                .map_err(|e| SynthesisError::Transient(format!("review lookup failed: {e}")))?;
            if existing.is_some() {
                return Err(SynthesisError::AlreadyExists);
            }
        }

        let draft = self.generator.generate(item).await?;

        let stored = self
            .reviews
            .insert(NewReview {
                catalog_id: item.native_id,
                title: draft.title,
                slug,
                body: draft.body,
                score: draft.score.clamp(0.0, 10.0),
                pros: draft.pros,
                cons: draft.cons,
                status: opts.publish_status.clone(),
            })
            .await
            .map_err(|e| SynthesisError::Transient(format!("review insert failed: {e}")))?;

        Ok(stored)
    }
}

/// OpenAI-style chat-completions generator. The model is instructed to answer
/// with a strict JSON object matching `ReviewDraft`.
pub struct OpenAiGenerator {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

impl OpenAiGenerator {
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl ReviewGenerator for OpenAiGenerator {
    async fn generate(&self, item: &Candidate) -> Result<ReviewDraft, SynthesisError> {
        let url = format!("{}/chat/completions", self.base_url);
        let prompt = format!(
            "Write a review of \"{}\". Respond with only a JSON object with keys \
             title (string), body (string, 300-500 words), score (number 0-10), \
             pros (array of strings), cons (array of strings).",
            item.display_name
        );

        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.model,
                "messages": [{"role": "user", "content": prompt}],
                "response_format": {"type": "json_object"},
            }))
            .send()
            .await
            .map_err(|e| SynthesisError::Transient(format!("generator request failed: {e}")))?;

        let status = resp.status();
        if status.is_server_error() || status.as_u16() == 429 {
            return Err(SynthesisError::Transient(format!(
                "generator returned {status}"
            )));
        }
        if !status.is_success() {
            return Err(SynthesisError::Fatal(format!(
                "generator rejected request: {status}"
            )));
        }

        let parsed: ChatResponse = resp
            .json()
            .await
            .map_err(|e| SynthesisError::Transient(format!("malformed generator payload: {e}")))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| SynthesisError::Transient("generator returned no choices".into()))?;

        serde_json::from_str(&content)
            .map_err(|e| SynthesisError::Transient(format!("generator emitted invalid JSON: {e}")))
    }
}

/// Lowercase, alphanumerics kept, everything else collapsed to single dashes.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_dash = true;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}
