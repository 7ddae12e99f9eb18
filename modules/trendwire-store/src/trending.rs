use std::cmp::Ordering;
use std::collections::HashMap;

use trendwire_common::TopicBucket;

/// Reduce a window of buckets to the trending view: the latest bucket per
/// topic with at least `min_mentions`, ordered by velocity, then mentions,
/// then topic key for a stable tie-break.
pub fn select_trending(
    buckets: Vec<TopicBucket>,
    min_mentions: i64,
    limit: usize,
) -> Vec<TopicBucket> {
    let mut latest: HashMap<String, TopicBucket> = HashMap::new();
    for bucket in buckets {
        match latest.get(&bucket.topic_key) {
            Some(existing) if existing.hour_timestamp >= bucket.hour_timestamp => {}
            _ => {
                latest.insert(bucket.topic_key.clone(), bucket);
            }
        }
    }

    let mut ranked: Vec<TopicBucket> = latest
        .into_values()
        .filter(|b| b.mention_count >= min_mentions)
        .collect();

    ranked.sort_by(|a, b| {
        b.velocity_score
            .partial_cmp(&a.velocity_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.mention_count.cmp(&a.mention_count))
            .then_with(|| a.topic_key.cmp(&b.topic_key))
    });
    ranked.truncate(limit);
    ranked
}
