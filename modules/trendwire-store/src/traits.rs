// Store seams for the trend pipeline.
//
// AliasStore    — learned entity aliases, shared across runs.
// TrendStore    — per-topic hourly buckets; concurrent writers merge.
// DocumentSource — ingested documents and their extraction status.
//
// Postgres implementations back production; the memory implementations
// back tests and dry runs.

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};

use trendwire_common::{BucketDelta, EntityAlias, RawDocument, TopicBucket};

use crate::error::Result;
use crate::trending::select_trending;

// ---------------------------------------------------------------------------
// AliasStore
// ---------------------------------------------------------------------------

#[async_trait]
pub trait AliasStore: Send + Sync {
    /// Look up by normalized raw name.
    async fn lookup(&self, raw_name: &str) -> Result<Option<EntityAlias>>;

    /// Insert or replace an alias. An existing row is only replaced when the
    /// incoming alias outranks it. Returns whether the row was written.
    async fn upsert(&self, alias: &EntityAlias) -> Result<bool>;

    async fn increment_usage(&self, raw_name: &str) -> Result<()>;
}

// ---------------------------------------------------------------------------
// TrendStore
// ---------------------------------------------------------------------------

/// Score fields written by the velocity engine. `None` leaves a field as is.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScoreUpdate {
    pub velocity: Option<f64>,
    pub momentum: Option<f64>,
    pub zscore: Option<f64>,
}

impl ScoreUpdate {
    pub fn velocity(velocity: f64, momentum: f64) -> Self {
        Self {
            velocity: Some(velocity),
            momentum: Some(momentum),
            zscore: None,
        }
    }

    pub fn with_zscore(mut self, zscore: f64) -> Self {
        self.zscore = Some(zscore);
        self
    }
}

#[async_trait]
pub trait TrendStore: Send + Sync {
    /// Merge a delta into `(topic_key, hour)`, creating the bucket if absent.
    /// Articles already counted in the bucket are ignored. Returns the merged
    /// bucket.
    async fn upsert_bucket(&self, delta: &BucketDelta) -> Result<TopicBucket>;

    async fn get_bucket(&self, topic_key: &str, hour: DateTime<Utc>)
        -> Result<Option<TopicBucket>>;

    /// Up to `n` buckets for a key strictly before `hour`, newest first.
    async fn previous_buckets(
        &self,
        topic_key: &str,
        hour: DateTime<Utc>,
        n: usize,
    ) -> Result<Vec<TopicBucket>>;

    /// Every bucket with `hour_timestamp >= since`.
    async fn buckets_since(&self, since: DateTime<Utc>) -> Result<Vec<TopicBucket>>;

    /// Write score fields onto an existing bucket. Never creates a bucket;
    /// returns false when it does not exist.
    async fn update_scores(
        &self,
        topic_key: &str,
        hour: DateTime<Utc>,
        scores: ScoreUpdate,
    ) -> Result<bool>;

    /// Latest bucket per topic since `since`, at least `min_mentions`,
    /// ranked by velocity then mentions.
    async fn trending(
        &self,
        since: DateTime<Utc>,
        min_mentions: i64,
        limit: usize,
    ) -> Result<Vec<TopicBucket>> {
        let buckets = self.buckets_since(since).await?;
        Ok(select_trending(buckets, min_mentions, limit))
    }
}

// ---------------------------------------------------------------------------
// DocumentSource
// ---------------------------------------------------------------------------

#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Claim up to `limit` not-yet-extracted documents, oldest first.
    /// Claimed documents are not handed out again until released, unless the
    /// claim is older than `stale_after` (the claiming run died).
    async fn pending(&self, limit: usize, stale_after: TimeDelta) -> Result<Vec<RawDocument>>;

    async fn mark_extracted(&self, ids: &[String]) -> Result<()>;

    /// Return claimed documents to not-yet-extracted.
    async fn release(&self, ids: &[String]) -> Result<()>;
}
