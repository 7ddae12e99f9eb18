// Postgres persistence for documents, aliases, and topic buckets.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{debug, warn};

use trendwire_common::{
    BucketDelta, CandidateKind, EntityAlias, EntityType, RawDocument, ResolutionMethod,
    SentimentCounts, SentimentLabel, TopicBucket,
};

use crate::error::{Result, StoreError};
use crate::traits::{AliasStore, DocumentSource, ScoreUpdate, TrendStore};

/// Attempts per bucket upsert before surfacing a conflict.
const MAX_UPSERT_ATTEMPTS: u32 = 5;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run the embedded SQL migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Insert documents as pending. Existing ids are left untouched.
    pub async fn ingest(&self, docs: &[RawDocument]) -> Result<u64> {
        let mut inserted = 0;
        for doc in docs {
            let result = sqlx::query(
                r#"
                INSERT INTO documents
                    (id, title, body, published_at, sentiment_score, sentiment_label, source)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(&doc.id)
            .bind(&doc.title)
            .bind(&doc.body)
            .bind(doc.published_at)
            .bind(doc.sentiment_score)
            .bind(doc.sentiment_label.map(|l| l.to_string()))
            .bind(&doc.source)
            .execute(&self.pool)
            .await?;
            inserted += result.rows_affected();
        }
        Ok(inserted)
    }

    async fn try_upsert_bucket(&self, delta: &BucketDelta) -> Result<TopicBucket> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO topic_buckets (topic_key, hour_timestamp, label, kind)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (topic_key, hour_timestamp) DO NOTHING
            "#,
        )
        .bind(&delta.topic_key)
        .bind(delta.hour)
        .bind(&delta.label)
        .bind(delta.kind.map(|k| k.to_string()))
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query_as::<_, BucketRow>(
            r#"
            SELECT * FROM topic_buckets
            WHERE topic_key = $1 AND hour_timestamp = $2
            FOR UPDATE
            "#,
        )
        .bind(&delta.topic_key)
        .bind(delta.hour)
        .fetch_one(&mut *tx)
        .await?;

        let mut bucket = TopicBucket::from(row);
        let added = bucket.absorb(delta);

        if added > 0 {
            sqlx::query(
                r#"
                UPDATE topic_buckets SET
                    label = $3,
                    kind = $4,
                    mention_count = $5,
                    article_ids = $6,
                    sample_article_ids = $7,
                    sample_titles = $8,
                    sources = $9,
                    keywords = $10,
                    sentiment_avg = $11,
                    sentiment_samples = $12,
                    sentiment_positive = $13,
                    sentiment_neutral = $14,
                    sentiment_negative = $15,
                    confidence = $16,
                    updated_at = now()
                WHERE topic_key = $1 AND hour_timestamp = $2
                "#,
            )
            .bind(&bucket.topic_key)
            .bind(bucket.hour_timestamp)
            .bind(&bucket.label)
            .bind(bucket.kind.map(|k| k.to_string()))
            .bind(bucket.mention_count)
            .bind(bucket.article_ids.iter().cloned().collect::<Vec<_>>())
            .bind(&bucket.sample_article_ids)
            .bind(&bucket.sample_titles)
            .bind(bucket.sources.iter().cloned().collect::<Vec<_>>())
            .bind(bucket.keywords.iter().cloned().collect::<Vec<_>>())
            .bind(bucket.sentiment_avg)
            .bind(bucket.sentiment_samples)
            .bind(bucket.sentiment_counts.positive)
            .bind(bucket.sentiment_counts.neutral)
            .bind(bucket.sentiment_counts.negative)
            .bind(bucket.confidence)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(key = %bucket.key(), added, mentions = bucket.mention_count, "Bucket merged");
        Ok(bucket)
    }
}

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

#[derive(Debug, sqlx::FromRow)]
struct BucketRow {
    topic_key: String,
    hour_timestamp: DateTime<Utc>,
    label: String,
    kind: Option<String>,
    mention_count: i64,
    article_ids: Vec<String>,
    sample_article_ids: Vec<String>,
    sample_titles: Vec<String>,
    sources: Vec<String>,
    keywords: Vec<String>,
    sentiment_avg: f64,
    sentiment_samples: i64,
    sentiment_positive: i64,
    sentiment_neutral: i64,
    sentiment_negative: i64,
    confidence: f64,
    velocity_score: f64,
    momentum_score: f64,
    velocity_zscore: f64,
}

impl From<BucketRow> for TopicBucket {
    fn from(row: BucketRow) -> Self {
        Self {
            topic_key: row.topic_key,
            hour_timestamp: row.hour_timestamp,
            label: row.label,
            kind: row.kind.as_deref().and_then(CandidateKind::parse),
            mention_count: row.mention_count,
            article_ids: row.article_ids.into_iter().collect::<BTreeSet<_>>(),
            sample_article_ids: row.sample_article_ids,
            sample_titles: row.sample_titles,
            sources: row.sources.into_iter().collect(),
            keywords: row.keywords.into_iter().collect(),
            sentiment_avg: row.sentiment_avg,
            sentiment_samples: row.sentiment_samples,
            sentiment_counts: SentimentCounts {
                positive: row.sentiment_positive,
                neutral: row.sentiment_neutral,
                negative: row.sentiment_negative,
            },
            confidence: row.confidence,
            velocity_score: row.velocity_score,
            momentum_score: row.momentum_score,
            velocity_zscore: row.velocity_zscore,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AliasRow {
    raw_name: String,
    canonical_name: String,
    entity_type: String,
    resolution_method: String,
    confidence_score: f64,
    usage_count: i64,
}

impl From<AliasRow> for EntityAlias {
    fn from(row: AliasRow) -> Self {
        Self {
            raw_name: row.raw_name,
            canonical_name: row.canonical_name,
            entity_type: EntityType::parse(&row.entity_type),
            resolution_method: ResolutionMethod::parse(&row.resolution_method)
                .unwrap_or(ResolutionMethod::Passthrough),
            confidence_score: row.confidence_score,
            usage_count: row.usage_count,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct DocumentRow {
    id: String,
    title: String,
    body: String,
    published_at: DateTime<Utc>,
    sentiment_score: Option<f64>,
    sentiment_label: Option<String>,
    source: Option<String>,
}

impl From<DocumentRow> for RawDocument {
    fn from(row: DocumentRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            body: row.body,
            published_at: row.published_at,
            sentiment_score: row.sentiment_score,
            sentiment_label: row.sentiment_label.as_deref().and_then(SentimentLabel::parse),
            source: row.source,
        }
    }
}

// ---------------------------------------------------------------------------
// Trait impls
// ---------------------------------------------------------------------------

#[async_trait]
impl AliasStore for PgStore {
    async fn lookup(&self, raw_name: &str) -> Result<Option<EntityAlias>> {
        let row = sqlx::query_as::<_, AliasRow>(
            r#"
            SELECT raw_name, canonical_name, entity_type, resolution_method,
                   confidence_score, usage_count
            FROM entity_aliases
            WHERE raw_name = $1
            "#,
        )
        .bind(raw_name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(EntityAlias::from))
    }

    async fn upsert(&self, alias: &EntityAlias) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO entity_aliases
                (raw_name, canonical_name, entity_type, resolution_method, method_rank, confidence_score)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (raw_name) DO UPDATE SET
                canonical_name = EXCLUDED.canonical_name,
                entity_type = EXCLUDED.entity_type,
                resolution_method = EXCLUDED.resolution_method,
                method_rank = EXCLUDED.method_rank,
                confidence_score = EXCLUDED.confidence_score,
                updated_at = now()
            WHERE EXCLUDED.method_rank > entity_aliases.method_rank
               OR (EXCLUDED.method_rank = entity_aliases.method_rank
                   AND EXCLUDED.confidence_score > entity_aliases.confidence_score)
            "#,
        )
        .bind(&alias.raw_name)
        .bind(&alias.canonical_name)
        .bind(alias.entity_type.as_str())
        .bind(alias.resolution_method.as_str())
        .bind(alias.resolution_method.precedence() as i16)
        .bind(alias.confidence_score.clamp(0.0, 1.0))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn increment_usage(&self, raw_name: &str) -> Result<()> {
        sqlx::query("UPDATE entity_aliases SET usage_count = usage_count + 1 WHERE raw_name = $1")
            .bind(raw_name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl TrendStore for PgStore {
    async fn upsert_bucket(&self, delta: &BucketDelta) -> Result<TopicBucket> {
        if delta.articles.is_empty() {
            return Err(StoreError::InvalidWrite(format!(
                "empty delta for {}",
                delta.key()
            )));
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_upsert_bucket(delta).await {
                Ok(bucket) => return Ok(bucket),
                Err(e) if e.is_retryable() && attempt < MAX_UPSERT_ATTEMPTS => {
                    warn!(key = %delta.key(), attempt, error = %e, "Bucket upsert conflict, retrying");
                    tokio::time::sleep(Duration::from_millis(25 * u64::from(attempt))).await;
                }
                Err(e) if e.is_retryable() => {
                    return Err(StoreError::Conflict {
                        key: delta.key(),
                        attempts: attempt,
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn get_bucket(
        &self,
        topic_key: &str,
        hour: DateTime<Utc>,
    ) -> Result<Option<TopicBucket>> {
        let row = sqlx::query_as::<_, BucketRow>(
            "SELECT * FROM topic_buckets WHERE topic_key = $1 AND hour_timestamp = $2",
        )
        .bind(topic_key)
        .bind(hour)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(TopicBucket::from))
    }

    async fn previous_buckets(
        &self,
        topic_key: &str,
        hour: DateTime<Utc>,
        n: usize,
    ) -> Result<Vec<TopicBucket>> {
        let rows = sqlx::query_as::<_, BucketRow>(
            r#"
            SELECT * FROM topic_buckets
            WHERE topic_key = $1 AND hour_timestamp < $2
            ORDER BY hour_timestamp DESC
            LIMIT $3
            "#,
        )
        .bind(topic_key)
        .bind(hour)
        .bind(n as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(TopicBucket::from).collect())
    }

    async fn buckets_since(&self, since: DateTime<Utc>) -> Result<Vec<TopicBucket>> {
        let rows = sqlx::query_as::<_, BucketRow>(
            r#"
            SELECT * FROM topic_buckets
            WHERE hour_timestamp >= $1
            ORDER BY hour_timestamp DESC, topic_key
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(TopicBucket::from).collect())
    }

    async fn update_scores(
        &self,
        topic_key: &str,
        hour: DateTime<Utc>,
        scores: ScoreUpdate,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE topic_buckets SET
                velocity_score = COALESCE($3, velocity_score),
                momentum_score = COALESCE($4, momentum_score),
                velocity_zscore = COALESCE($5, velocity_zscore),
                updated_at = now()
            WHERE topic_key = $1 AND hour_timestamp = $2
            "#,
        )
        .bind(topic_key)
        .bind(hour)
        .bind(scores.velocity)
        .bind(scores.momentum)
        .bind(scores.zscore)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl DocumentSource for PgStore {
    async fn pending(&self, limit: usize, stale_after: TimeDelta) -> Result<Vec<RawDocument>> {
        let rows = sqlx::query_as::<_, DocumentRow>(
            r#"
            UPDATE documents SET extraction_status = 'claimed', claimed_at = now()
            WHERE id IN (
                SELECT id FROM documents
                WHERE extraction_status = 'pending'
                   OR (extraction_status = 'claimed'
                       AND claimed_at < now() - make_interval(secs => $2))
                ORDER BY published_at, id
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, title, body, published_at, sentiment_score, sentiment_label, source
            "#,
        )
        .bind(limit as i64)
        .bind(stale_after.num_seconds() as f64)
        .fetch_all(&self.pool)
        .await?;

        let mut docs: Vec<RawDocument> = rows.into_iter().map(RawDocument::from).collect();
        docs.sort_by(|a, b| a.published_at.cmp(&b.published_at).then_with(|| a.id.cmp(&b.id)));
        Ok(docs)
    }

    async fn mark_extracted(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        sqlx::query(
            r#"
            UPDATE documents SET extraction_status = 'extracted', extracted_at = now()
            WHERE id = ANY($1)
            "#,
        )
        .bind(ids)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn release(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        sqlx::query(
            r#"
            UPDATE documents SET extraction_status = 'pending', claimed_at = NULL
            WHERE id = ANY($1) AND extraction_status = 'claimed'
            "#,
        )
        .bind(ids)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
