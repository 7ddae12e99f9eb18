use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::debug;

use trendwire_store::{ScoreUpdate, StoreError, TrendStore};

/// Percent change against the preceding bucket. A first bucket with
/// mentions is 100; no mentions at all is 0.
pub fn velocity(current: i64, previous: i64) -> f64 {
    if previous > 0 {
        (current - previous) as f64 / previous as f64 * 100.0
    } else if current > 0 {
        100.0
    } else {
        0.0
    }
}

/// Previous buckets of the same topic that form its velocity baseline.
pub const BASELINE_BUCKETS: usize = 24;

/// Fewer baseline buckets than this and the z-score is 0.
pub const MIN_BASELINE: usize = 3;

/// Floor on the baseline spread, in velocity points, so a flat history does
/// not turn any change into an unbounded score.
pub const MIN_BASELINE_STDDEV: f64 = 10.0;

/// How far `value` sits above the topic's own history, in sample standard
/// deviations of `baseline`.
pub fn zscore(value: f64, baseline: &[f64]) -> f64 {
    let n = baseline.len();
    if n < MIN_BASELINE {
        return 0.0;
    }
    let mean = baseline.iter().sum::<f64>() / n as f64;
    let variance = baseline.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    (value - mean) / variance.sqrt().max(MIN_BASELINE_STDDEV)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VelocityScore {
    pub velocity: f64,
    pub momentum: f64,
    pub zscore: f64,
}

/// Scores buckets after aggregation. Only ever updates existing buckets.
pub struct VelocityEngine {
    store: Arc<dyn TrendStore>,
}

impl VelocityEngine {
    pub fn new(store: Arc<dyn TrendStore>) -> Self {
        Self { store }
    }

    /// Velocity, momentum and baseline z-score for `(topic_key, hour)`.
    /// `None` when the bucket does not exist.
    pub async fn score(
        &self,
        topic_key: &str,
        hour: DateTime<Utc>,
    ) -> Result<Option<VelocityScore>, StoreError> {
        let Some(current) = self.store.get_bucket(topic_key, hour).await? else {
            return Ok(None);
        };

        let one_back = hour - TimeDelta::hours(1);
        let two_back = hour - TimeDelta::hours(2);
        let previous = self
            .store
            .previous_buckets(topic_key, hour, BASELINE_BUCKETS)
            .await?;
        let count_at = |at: DateTime<Utc>| {
            previous
                .iter()
                .find(|b| b.hour_timestamp == at)
                .map(|b| b.mention_count)
        };

        let prev_count = count_at(one_back).unwrap_or(0);
        let velocity = velocity(current.mention_count, prev_count);
        let previous_velocity = match count_at(two_back) {
            Some(two_back_count) => self::velocity(prev_count, two_back_count),
            None => 0.0,
        };
        let baseline: Vec<f64> = previous.iter().map(|b| b.velocity_score).collect();
        let score = VelocityScore {
            velocity,
            momentum: velocity - previous_velocity,
            zscore: zscore(velocity, &baseline),
        };

        self.store
            .update_scores(
                topic_key,
                hour,
                ScoreUpdate::velocity(score.velocity, score.momentum).with_zscore(score.zscore),
            )
            .await?;
        debug!(
            topic_key,
            current = current.mention_count,
            previous = prev_count,
            velocity = score.velocity,
            momentum = score.momentum,
            zscore = score.zscore,
            "Scored bucket"
        );
        Ok(Some(score))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use trendwire_common::TopicBucket;
    use trendwire_store::MemoryTrendStore;

    fn hour(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, h, 0, 0).unwrap()
    }

    fn bucket(key: &str, h: u32, mentions: i64) -> TopicBucket {
        let mut b = TopicBucket::empty(key, hour(h));
        b.mention_count = mentions;
        b
    }

    #[test]
    fn velocity_boundaries() {
        assert_eq!(velocity(5, 0), 100.0);
        assert_eq!(velocity(0, 0), 0.0);
        assert_eq!(velocity(15, 10), 50.0);
        assert_eq!(velocity(5, 10), -50.0);
    }

    #[test]
    fn zscore_needs_a_baseline() {
        assert_eq!(zscore(500.0, &[]), 0.0);
        assert_eq!(zscore(500.0, &[10.0, 20.0]), 0.0);
        // flat history: spread floored at 10 points
        assert_eq!(zscore(30.0, &[0.0, 0.0, 0.0]), 3.0);
        // sample std of [0, 10, 20] is 10
        assert!((zscore(40.0, &[0.0, 10.0, 20.0]) - 3.0).abs() < 1e-9);
        assert!(zscore(-20.0, &[0.0, 10.0, 20.0]) < 0.0);
    }

    #[tokio::test]
    async fn momentum_against_previous_measurement() {
        let store = Arc::new(
            MemoryTrendStore::new()
                .with_bucket(bucket("k", 12, 4))
                .with_bucket(bucket("k", 13, 10))
                .with_bucket(bucket("k", 14, 15)),
        );
        let engine = VelocityEngine::new(store.clone());

        let score = engine.score("k", hour(14)).await.unwrap().unwrap();
        assert_eq!(score.velocity, 50.0);
        // previous velocity: 4 -> 10 = 150
        assert_eq!(score.momentum, -100.0);

        let stored = store.get_bucket("k", hour(14)).await.unwrap().unwrap();
        assert_eq!(stored.velocity_score, 50.0);
        assert_eq!(stored.momentum_score, -100.0);
    }

    #[tokio::test]
    async fn gap_hour_counts_as_zero() {
        let store = Arc::new(
            MemoryTrendStore::new()
                .with_bucket(bucket("k", 11, 8))
                .with_bucket(bucket("k", 14, 5)),
        );
        let engine = VelocityEngine::new(store);

        let score = engine.score("k", hour(14)).await.unwrap().unwrap();
        assert_eq!(score.velocity, 100.0);
        assert_eq!(score.momentum, 100.0);
    }

    #[tokio::test]
    async fn missing_bucket_is_not_created() {
        let store = Arc::new(MemoryTrendStore::new());
        let engine = VelocityEngine::new(store.clone());
        assert!(engine.score("k", hour(14)).await.unwrap().is_none());
        assert_eq!(store.bucket_count(), 0);
    }

    #[tokio::test]
    async fn spike_scores_against_own_history() {
        // steady coverage for five hours, then a 10x jump; nothing else trends
        let mut store = MemoryTrendStore::new();
        for h in 8..13 {
            let mut b = bucket("fed", h, 10);
            b.velocity_score = 0.0;
            store = store.with_bucket(b);
        }
        store = store.with_bucket(bucket("fed", 13, 100));
        let store = Arc::new(store);
        let engine = VelocityEngine::new(store.clone());

        let score = engine.score("fed", hour(13)).await.unwrap().unwrap();
        assert_eq!(score.velocity, 900.0);
        assert!(score.zscore > 2.0);

        let stored = store.get_bucket("fed", hour(13)).await.unwrap().unwrap();
        assert_eq!(stored.velocity_zscore, score.zscore);
    }

    #[tokio::test]
    async fn steady_coverage_stays_below_threshold() {
        let mut store = MemoryTrendStore::new();
        for (h, v) in [(8, 10.0), (9, -10.0), (10, 5.0), (11, 0.0)] {
            let mut b = bucket("fed", h, 10);
            b.velocity_score = v;
            store = store.with_bucket(b);
        }
        store = store.with_bucket(bucket("fed", 12, 11));
        let engine = VelocityEngine::new(Arc::new(store));

        let score = engine.score("fed", hour(12)).await.unwrap().unwrap();
        assert!((score.velocity - 10.0).abs() < 1e-9);
        assert!(score.zscore < 2.0);
    }
}
