use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use uuid::Uuid;

/// The slice of a persisted review the job pipeline cares about. The full
/// article lives with the review store; jobs only report id/title/slug.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewRef {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
}

#[derive(Debug, Clone)]
pub struct NewReview {
    pub catalog_id: i64,
    pub title: String,
    pub slug: String,
    pub body: String,
    pub score: f32,
    pub pros: Vec<String>,
    pub cons: Vec<String>,
    pub status: String,
}

#[async_trait]
pub trait ReviewStore: Send + Sync {
    async fn find_by_slug(&self, slug: &str) -> anyhow::Result<Option<Uuid>>;
    async fn insert(&self, review: NewReview) -> anyhow::Result<ReviewRef>;
}

#[derive(Clone)]
pub struct PgReviewStore {
    pool: PgPool,
}

impl PgReviewStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReviewStore for PgReviewStore {
    async fn find_by_slug(&self, slug: &str) -> anyhow::Result<Option<Uuid>> {
        let id: Option<Uuid> = sqlx::query("SELECT id FROM reviews WHERE slug = $1")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| row.get("id"));
        Ok(id)
    }

    async fn insert(&self, review: NewReview) -> anyhow::Result<ReviewRef> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO reviews (id, catalog_id, title, slug, body, score, pros, cons, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(id)
        .bind(review.catalog_id)
        .bind(&review.title)
        .bind(&review.slug)
        .bind(&review.body)
        .bind(review.score)
        .bind(serde_json::to_value(&review.pros)?)
        .bind(serde_json::to_value(&review.cons)?)
        .bind(&review.status)
        .execute(&self.pool)
        .await?;

        Ok(ReviewRef {
            id,
            title: review.title,
            slug: review.slug,
        })
    }
}

/// Slug-keyed in-memory store for tests and local development.
#[derive(Clone, Default)]
pub struct InMemoryReviewStore {
    inner: Arc<Mutex<HashMap<String, ReviewRef>>>,
}

impl InMemoryReviewStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ReviewStore for InMemoryReviewStore {
    async fn find_by_slug(&self, slug: &str) -> anyhow::Result<Option<Uuid>> {
        Ok(self.inner.lock().unwrap().get(slug).map(|r| r.id))
    }

    async fn insert(&self, review: NewReview) -> anyhow::Result<ReviewRef> {
        let mut inner = self.inner.lock().unwrap();
        if inner.contains_key(&review.slug) {
            anyhow::bail!("duplicate slug: {}", review.slug);
        }
        let stored = ReviewRef {
            id: Uuid::new_v4(),
            title: review.title,
            slug: review.slug.clone(),
        };
        inner.insert(review.slug, stored.clone());
        Ok(stored)
    }
}
