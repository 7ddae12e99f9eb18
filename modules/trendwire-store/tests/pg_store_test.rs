//! Integration tests for PgStore against a throwaway Postgres container.
//! Run with `--features test-utils`; requires Docker.
#![cfg(feature = "test-utils")]

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use trendwire_common::{
    ArticleContribution, BucketDelta, CandidateKind, EntityAlias, EntityType, RawDocument,
    ResolutionMethod,
};
use trendwire_store::testutil::postgres_container;
use trendwire_store::{AliasStore, DocumentSource, ScoreUpdate, TrendStore};

fn hour(h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 1, h, 0, 0).unwrap()
}

fn delta(ids: &[&str]) -> BucketDelta {
    BucketDelta {
        topic_key: "senate passes border bill".to_string(),
        hour: hour(14),
        label: "Senate Passes Border Bill".to_string(),
        kind: Some(CandidateKind::EventPhrase),
        confidence: 0.8,
        keywords: vec!["senate".into(), "border".into()],
        articles: ids
            .iter()
            .map(|id| ArticleContribution {
                article_id: id.to_string(),
                title: format!("Senate passes border bill ({id})"),
                published_at: hour(14),
                source: Some(format!("outlet-{id}")),
                sentiment_score: Some(0.1),
                sentiment_label: None,
            })
            .collect(),
    }
}

#[tokio::test]
async fn bucket_upsert_is_idempotent_per_article() {
    let (_container, store) = postgres_container().await;

    store.upsert_bucket(&delta(&["a", "b"])).await.unwrap();
    store.upsert_bucket(&delta(&["a", "b"])).await.unwrap();

    let bucket = store
        .get_bucket("senate passes border bill", hour(14))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(bucket.mention_count, 2);
    assert_eq!(bucket.sample_titles.len(), 2);
    assert_eq!(bucket.kind, Some(CandidateKind::EventPhrase));
}

#[tokio::test]
async fn concurrent_writers_merge() {
    let (_container, store) = postgres_container().await;
    let store = Arc::new(store);

    let mut handles = Vec::new();
    for chunk in [["a", "b"], ["c", "d"], ["e", "f"], ["g", "h"]] {
        let store = store.clone();
        handles.push(tokio::spawn(async move { store.upsert_bucket(&delta(&chunk)).await }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let bucket = store
        .get_bucket("senate passes border bill", hour(14))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(bucket.mention_count, 8);
    assert_eq!(bucket.source_count(), 8);
}

#[tokio::test]
async fn scores_update_existing_rows_only() {
    let (_container, store) = postgres_container().await;
    store.upsert_bucket(&delta(&["a"])).await.unwrap();

    assert!(store
        .update_scores("senate passes border bill", hour(14), ScoreUpdate::velocity(100.0, 100.0))
        .await
        .unwrap());
    assert!(store
        .update_scores("senate passes border bill", hour(14), ScoreUpdate {
                zscore: Some(1.5),
                ..Default::default()
            })
        .await
        .unwrap());
    assert!(!store
        .update_scores("missing", hour(14), ScoreUpdate::velocity(1.0, 1.0))
        .await
        .unwrap());

    let bucket = store
        .get_bucket("senate passes border bill", hour(14))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(bucket.velocity_score, 100.0);
    assert_eq!(bucket.velocity_zscore, 1.5);
    assert!(store.get_bucket("missing", hour(14)).await.unwrap().is_none());
}

#[tokio::test]
async fn alias_upsert_never_downgrades() {
    let (_container, store) = postgres_container().await;

    let cached = EntityAlias::new("potus", "President of the United States", EntityType::Person, ResolutionMethod::Fuzzy, 0.95);
    let weaker = EntityAlias::new("potus", "POTUS", EntityType::Unknown, ResolutionMethod::KnowledgeBase, 0.99);

    assert!(store.upsert(&cached).await.unwrap());
    assert!(!store.upsert(&weaker).await.unwrap());
    store.increment_usage("potus").await.unwrap();

    let alias = store.lookup("potus").await.unwrap().unwrap();
    assert_eq!(alias.canonical_name, "President of the United States");
    assert_eq!(alias.resolution_method, ResolutionMethod::Fuzzy);
    assert_eq!(alias.usage_count, 1);
}

#[tokio::test]
async fn documents_are_claimed_once() {
    let (_container, store) = postgres_container().await;
    let docs: Vec<RawDocument> = (0..4)
        .map(|i| RawDocument {
            id: format!("doc-{i}"),
            title: format!("Title {i}"),
            body: String::new(),
            published_at: hour(10 + i),
            sentiment_score: None,
            sentiment_label: None,
            source: None,
        })
        .collect();
    assert_eq!(store.ingest(&docs).await.unwrap(), 4);
    assert_eq!(store.ingest(&docs).await.unwrap(), 0);

    let first = store.pending(3, TimeDelta::hours(1)).await.unwrap();
    assert_eq!(first.len(), 3);
    assert_eq!(first[0].id, "doc-0");
    assert_eq!(store.pending(10, TimeDelta::hours(1)).await.unwrap().len(), 1);

    store.release(&[first[0].id.clone()]).await.unwrap();
    store.mark_extracted(&[first[1].id.clone()]).await.unwrap();

    let again = store.pending(10, TimeDelta::hours(1)).await.unwrap();
    assert_eq!(again.len(), 1);
    assert_eq!(again[0].id, "doc-0");
}

#[tokio::test]
async fn stale_claims_are_reclaimed() {
    let (_container, store) = postgres_container().await;
    let docs: Vec<RawDocument> = (0..2)
        .map(|i| RawDocument {
            id: format!("doc-{i}"),
            title: format!("Title {i}"),
            body: String::new(),
            published_at: hour(10 + i),
            sentiment_score: None,
            sentiment_label: None,
            source: None,
        })
        .collect();
    store.ingest(&docs).await.unwrap();

    let ttl = TimeDelta::hours(1);
    assert_eq!(store.pending(10, ttl).await.unwrap().len(), 2);
    assert!(store.pending(10, ttl).await.unwrap().is_empty());

    // the claiming run died two hours ago
    sqlx::query("UPDATE documents SET claimed_at = now() - interval '2 hours' WHERE id = 'doc-1'")
        .execute(store.pool())
        .await
        .unwrap();

    let reclaimed = store.pending(10, ttl).await.unwrap();
    assert_eq!(reclaimed.len(), 1);
    assert_eq!(reclaimed[0].id, "doc-1");
    assert!(store.pending(10, ttl).await.unwrap().is_empty());
}
