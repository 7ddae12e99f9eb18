//! In-memory stores. Thread-safe via an interior Mutex; used by tests and
//! dry runs.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};

use trendwire_common::{BucketDelta, EntityAlias, RawDocument, TopicBucket};

use crate::error::{Result, StoreError};
use crate::traits::{AliasStore, DocumentSource, ScoreUpdate, TrendStore};

fn poisoned() -> StoreError {
    StoreError::Other(anyhow::anyhow!("memory store lock poisoned"))
}

// ---------------------------------------------------------------------------
// Aliases
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryAliasStore {
    aliases: Mutex<HashMap<String, EntityAlias>>,
}

impl MemoryAliasStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an alias without precedence checks.
    pub fn with_alias(self, alias: EntityAlias) -> Self {
        if let Ok(mut map) = self.aliases.lock() {
            map.insert(alias.raw_name.clone(), alias);
        }
        self
    }

    pub fn get(&self, raw_name: &str) -> Option<EntityAlias> {
        self.aliases.lock().ok()?.get(raw_name).cloned()
    }

    pub fn len(&self) -> usize {
        self.aliases.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AliasStore for MemoryAliasStore {
    async fn lookup(&self, raw_name: &str) -> Result<Option<EntityAlias>> {
        let map = self.aliases.lock().map_err(|_| poisoned())?;
        Ok(map.get(raw_name).cloned())
    }

    async fn upsert(&self, alias: &EntityAlias) -> Result<bool> {
        let mut map = self.aliases.lock().map_err(|_| poisoned())?;
        match map.get_mut(&alias.raw_name) {
            Some(existing) if !existing.yields_to(alias) => Ok(false),
            Some(existing) => {
                let usage = existing.usage_count;
                *existing = alias.clone();
                existing.usage_count = usage;
                Ok(true)
            }
            None => {
                map.insert(alias.raw_name.clone(), alias.clone());
                Ok(true)
            }
        }
    }

    async fn increment_usage(&self, raw_name: &str) -> Result<()> {
        let mut map = self.aliases.lock().map_err(|_| poisoned())?;
        if let Some(alias) = map.get_mut(raw_name) {
            alias.usage_count += 1;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Buckets
// ---------------------------------------------------------------------------

type BucketId = (String, DateTime<Utc>);

#[derive(Default)]
pub struct MemoryTrendStore {
    buckets: Mutex<BTreeMap<BucketId, TopicBucket>>,
}

impl MemoryTrendStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a bucket as-is, e.g. a prior hour's history.
    pub fn with_bucket(self, bucket: TopicBucket) -> Self {
        if let Ok(mut map) = self.buckets.lock() {
            map.insert((bucket.topic_key.clone(), bucket.hour_timestamp), bucket);
        }
        self
    }

    pub fn all(&self) -> Vec<TopicBucket> {
        self.buckets
            .lock()
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.lock().map(|m| m.len()).unwrap_or(0)
    }
}

#[async_trait]
impl TrendStore for MemoryTrendStore {
    async fn upsert_bucket(&self, delta: &BucketDelta) -> Result<TopicBucket> {
        if delta.articles.is_empty() {
            return Err(StoreError::InvalidWrite(format!(
                "empty delta for {}",
                delta.key()
            )));
        }
        let mut map = self.buckets.lock().map_err(|_| poisoned())?;
        let bucket = map
            .entry((delta.topic_key.clone(), delta.hour))
            .or_insert_with(|| TopicBucket::empty(delta.topic_key.clone(), delta.hour));
        bucket.absorb(delta);
        Ok(bucket.clone())
    }

    async fn get_bucket(
        &self,
        topic_key: &str,
        hour: DateTime<Utc>,
    ) -> Result<Option<TopicBucket>> {
        let map = self.buckets.lock().map_err(|_| poisoned())?;
        Ok(map.get(&(topic_key.to_string(), hour)).cloned())
    }

    async fn previous_buckets(
        &self,
        topic_key: &str,
        hour: DateTime<Utc>,
        n: usize,
    ) -> Result<Vec<TopicBucket>> {
        let map = self.buckets.lock().map_err(|_| poisoned())?;
        let mut out: Vec<TopicBucket> = map
            .values()
            .filter(|b| b.topic_key == topic_key && b.hour_timestamp < hour)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.hour_timestamp.cmp(&a.hour_timestamp));
        out.truncate(n);
        Ok(out)
    }

    async fn buckets_since(&self, since: DateTime<Utc>) -> Result<Vec<TopicBucket>> {
        let map = self.buckets.lock().map_err(|_| poisoned())?;
        Ok(map
            .values()
            .filter(|b| b.hour_timestamp >= since)
            .cloned()
            .collect())
    }

    async fn update_scores(
        &self,
        topic_key: &str,
        hour: DateTime<Utc>,
        scores: ScoreUpdate,
    ) -> Result<bool> {
        let mut map = self.buckets.lock().map_err(|_| poisoned())?;
        let Some(bucket) = map.get_mut(&(topic_key.to_string(), hour)) else {
            return Ok(false);
        };
        if let Some(v) = scores.velocity {
            bucket.velocity_score = v;
        }
        if let Some(m) = scores.momentum {
            bucket.momentum_score = m;
        }
        if let Some(z) = scores.zscore {
            bucket.velocity_zscore = z;
        }
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// Documents
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStatus {
    Pending,
    Claimed,
    Extracted,
}

struct DocumentEntry {
    doc: RawDocument,
    status: ExtractionStatus,
    claimed_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
pub struct MemoryDocumentSource {
    docs: Mutex<Vec<DocumentEntry>>,
}

impl MemoryDocumentSource {
    pub fn new(docs: Vec<RawDocument>) -> Self {
        Self {
            docs: Mutex::new(
                docs.into_iter()
                    .map(|doc| DocumentEntry {
                        doc,
                        status: ExtractionStatus::Pending,
                        claimed_at: None,
                    })
                    .collect(),
            ),
        }
    }

    pub fn status(&self, id: &str) -> Option<ExtractionStatus> {
        let docs = self.docs.lock().ok()?;
        docs.iter().find(|e| e.doc.id == id).map(|e| e.status)
    }

    pub fn count(&self, status: ExtractionStatus) -> usize {
        self.docs
            .lock()
            .map(|docs| docs.iter().filter(|e| e.status == status).count())
            .unwrap_or(0)
    }

    /// Put every document back to pending, as if freshly ingested.
    pub fn reset(&self) {
        if let Ok(mut docs) = self.docs.lock() {
            for entry in docs.iter_mut() {
                entry.status = ExtractionStatus::Pending;
                entry.claimed_at = None;
            }
        }
    }

    /// Move every outstanding claim `by` into the past, as if the claiming
    /// process had died that long ago.
    pub fn age_claims(&self, by: TimeDelta) {
        if let Ok(mut docs) = self.docs.lock() {
            for claimed_at in docs.iter_mut().filter_map(|e| e.claimed_at.as_mut()) {
                *claimed_at = *claimed_at - by;
            }
        }
    }

    fn set_status(&self, ids: &[String], from: &[ExtractionStatus], to: ExtractionStatus) -> Result<()> {
        let mut docs = self.docs.lock().map_err(|_| poisoned())?;
        for entry in docs.iter_mut() {
            if from.contains(&entry.status) && ids.iter().any(|id| *id == entry.doc.id) {
                entry.status = to;
                entry.claimed_at = None;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentSource for MemoryDocumentSource {
    async fn pending(&self, limit: usize, stale_after: TimeDelta) -> Result<Vec<RawDocument>> {
        let now = Utc::now();
        let stale_before = now - stale_after;
        let mut docs = self.docs.lock().map_err(|_| poisoned())?;
        let mut order: Vec<usize> = (0..docs.len())
            .filter(|&i| match docs[i].status {
                ExtractionStatus::Pending => true,
                ExtractionStatus::Claimed => docs[i].claimed_at.is_some_and(|t| t < stale_before),
                ExtractionStatus::Extracted => false,
            })
            .collect();
        order.sort_by(|&a, &b| {
            docs[a]
                .doc
                .published_at
                .cmp(&docs[b].doc.published_at)
                .then_with(|| docs[a].doc.id.cmp(&docs[b].doc.id))
        });
        order.truncate(limit);

        let mut claimed = Vec::with_capacity(order.len());
        for i in order {
            docs[i].status = ExtractionStatus::Claimed;
            docs[i].claimed_at = Some(now);
            claimed.push(docs[i].doc.clone());
        }
        Ok(claimed)
    }

    async fn mark_extracted(&self, ids: &[String]) -> Result<()> {
        self.set_status(
            ids,
            &[ExtractionStatus::Pending, ExtractionStatus::Claimed],
            ExtractionStatus::Extracted,
        )
    }

    async fn release(&self, ids: &[String]) -> Result<()> {
        self.set_status(ids, &[ExtractionStatus::Claimed], ExtractionStatus::Pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use trendwire_common::{ArticleContribution, EntityType, ResolutionMethod};

    fn hour(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, h, 0, 0).unwrap()
    }

    fn delta(key: &str, h: u32, ids: &[&str]) -> BucketDelta {
        BucketDelta {
            topic_key: key.to_string(),
            hour: hour(h),
            label: key.to_string(),
            kind: None,
            confidence: 0.5,
            keywords: vec![],
            articles: ids
                .iter()
                .map(|id| ArticleContribution {
                    article_id: id.to_string(),
                    title: format!("t-{id}"),
                    published_at: hour(h),
                    source: None,
                    sentiment_score: None,
                    sentiment_label: None,
                })
                .collect(),
        }
    }

    fn doc(id: &str, minute: u32) -> RawDocument {
        RawDocument {
            id: id.to_string(),
            title: id.to_string(),
            body: String::new(),
            published_at: Utc.with_ymd_and_hms(2026, 5, 1, 9, minute, 0).unwrap(),
            sentiment_score: None,
            sentiment_label: None,
            source: None,
        }
    }

    #[tokio::test]
    async fn alias_upsert_respects_precedence() {
        let store = MemoryAliasStore::new();
        let fuzzy = EntityAlias::new("potus", "President", EntityType::Person, ResolutionMethod::Fuzzy, 0.8);
        let kb = EntityAlias::new("potus", "POTUS", EntityType::Unknown, ResolutionMethod::KnowledgeBase, 0.85);

        assert!(store.upsert(&fuzzy).await.unwrap());
        store.increment_usage("potus").await.unwrap();
        assert!(!store.upsert(&kb).await.unwrap());

        let stored = store.lookup("potus").await.unwrap().unwrap();
        assert_eq!(stored.canonical_name, "President");
        assert_eq!(stored.usage_count, 1);
    }

    #[tokio::test]
    async fn concurrent_disjoint_writers_sum() {
        let store = std::sync::Arc::new(MemoryTrendStore::new());
        let a = {
            let store = store.clone();
            tokio::spawn(async move { store.upsert_bucket(&delta("k", 9, &["1", "2"])).await })
        };
        let b = {
            let store = store.clone();
            tokio::spawn(async move { store.upsert_bucket(&delta("k", 9, &["3"])).await })
        };
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        let bucket = store.get_bucket("k", hour(9)).await.unwrap().unwrap();
        assert_eq!(bucket.mention_count, 3);
    }

    #[tokio::test]
    async fn empty_delta_is_rejected() {
        let store = MemoryTrendStore::new();
        let err = store.upsert_bucket(&delta("k", 9, &[])).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidWrite(_)));
        assert_eq!(store.bucket_count(), 0);
    }

    #[tokio::test]
    async fn update_scores_never_creates() {
        let store = MemoryTrendStore::new();
        let written = store
            .update_scores("k", hour(9), ScoreUpdate::velocity(100.0, 0.0))
            .await
            .unwrap();
        assert!(!written);
        assert_eq!(store.bucket_count(), 0);
    }

    #[tokio::test]
    async fn previous_buckets_newest_first() {
        let store = MemoryTrendStore::new();
        for h in [6, 7, 8, 9] {
            store.upsert_bucket(&delta("k", h, &["x"])).await.unwrap();
        }
        let prev = store.previous_buckets("k", hour(9), 2).await.unwrap();
        let hours: Vec<_> = prev.iter().map(|b| b.hour_timestamp).collect();
        assert_eq!(hours, vec![hour(8), hour(7)]);
    }

    #[tokio::test]
    async fn documents_claim_release_and_extract() {
        let source = MemoryDocumentSource::new(vec![doc("b", 5), doc("a", 1), doc("c", 9)]);

        let claimed = source.pending(2, ttl()).await.unwrap();
        let ids: Vec<_> = claimed.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(source.pending(10, ttl()).await.unwrap().len(), 1);

        source.release(&["a".to_string()]).await.unwrap();
        source.mark_extracted(&["b".to_string()]).await.unwrap();
        assert_eq!(source.status("a"), Some(ExtractionStatus::Pending));
        assert_eq!(source.status("b"), Some(ExtractionStatus::Extracted));
        assert_eq!(source.count(ExtractionStatus::Claimed), 1);
    }

    fn ttl() -> TimeDelta {
        TimeDelta::hours(1)
    }

    #[tokio::test]
    async fn stale_claims_are_handed_out_again() {
        let source = MemoryDocumentSource::new(vec![doc("a", 1), doc("b", 5)]);
        assert_eq!(source.pending(10, ttl()).await.unwrap().len(), 2);
        assert!(source.pending(10, ttl()).await.unwrap().is_empty());

        source.age_claims(TimeDelta::minutes(30));
        assert!(source.pending(10, ttl()).await.unwrap().is_empty());

        source.age_claims(TimeDelta::minutes(31));
        let reclaimed = source.pending(10, ttl()).await.unwrap();
        let ids: Vec<_> = reclaimed.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(source.count(ExtractionStatus::Claimed), 2);

        // the fresh claim is not stale
        assert!(source.pending(10, ttl()).await.unwrap().is_empty());
    }
}
