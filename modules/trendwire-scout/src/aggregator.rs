use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};

use trendwire_common::text::topic_key;
use trendwire_common::{ArticleContribution, BucketDelta, CandidateKind, RawDocument, MAX_KEYWORDS};

/// Headline shorthand folded into one spelling so variants share a bucket.
const TOPIC_VARIANTS: &[(&str, &str)] = &[
    ("potus", "president"),
    ("scotus", "supreme court"),
    ("govt", "government"),
    ("gov", "governor"),
    ("sen", "senator"),
    ("rep", "representative"),
    ("intl", "international"),
    ("vs", "versus"),
    ("v", "versus"),
    ("usa", "us"),
    ("uk", "united kingdom"),
    ("eu", "european union"),
];

/// Aggregation key for a canonical topic: [`topic_key`] plus word-level
/// variant folding.
pub fn canonical_topic_key(canonical: &str) -> String {
    let spaced = canonical.replace('&', " and ");
    topic_key(&spaced)
        .split(' ')
        .map(|word| {
            TOPIC_VARIANTS
                .iter()
                .find(|(from, _)| *from == word)
                .map(|(_, to)| *to)
                .unwrap_or(word)
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// A validated, canonicalized candidate ready to aggregate.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTopic {
    pub key: String,
    pub label: String,
    pub kind: Option<CandidateKind>,
    pub confidence: f64,
    pub keywords: Vec<String>,
}

struct PendingBucket {
    delta: BucketDelta,
    counted: HashSet<String>,
}

/// Collects per-(topic, hour) contributions for one run.
///
/// A document counts at most once per topic no matter how many candidates
/// resolve to that topic. Contributions are emitted oldest-first so sample
/// lists keep the earliest coverage.
#[derive(Default)]
pub struct TopicAggregator {
    buckets: BTreeMap<(String, DateTime<Utc>), PendingBucket>,
}

impl TopicAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `doc` is about `topic`. Returns false when this document
    /// was already counted for the topic.
    pub fn add(&mut self, doc: &RawDocument, topic: &ResolvedTopic) -> bool {
        if topic.key.is_empty() {
            return false;
        }
        let hour = doc.hour_bucket();
        let pending = self
            .buckets
            .entry((topic.key.clone(), hour))
            .or_insert_with(|| PendingBucket {
                delta: BucketDelta {
                    topic_key: topic.key.clone(),
                    hour,
                    label: topic.label.clone(),
                    kind: topic.kind,
                    confidence: 0.0,
                    keywords: Vec::new(),
                    articles: Vec::new(),
                },
                counted: HashSet::new(),
            });

        let delta = &mut pending.delta;
        delta.confidence = delta.confidence.max(topic.confidence);
        if delta.kind.is_none() {
            delta.kind = topic.kind;
        }
        for keyword in &topic.keywords {
            if delta.keywords.len() >= MAX_KEYWORDS {
                break;
            }
            if !delta.keywords.contains(keyword) {
                delta.keywords.push(keyword.clone());
            }
        }

        if !pending.counted.insert(doc.id.clone()) {
            return false;
        }
        pending.delta.articles.push(ArticleContribution::from(doc));
        true
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Every non-empty delta, articles ordered by (published_at, id).
    pub fn into_deltas(self) -> Vec<BucketDelta> {
        self.buckets
            .into_values()
            .map(|p| p.delta)
            .filter(|d| !d.articles.is_empty())
            .map(|mut d| {
                d.articles.sort_by(|a, b| {
                    a.published_at
                        .cmp(&b.published_at)
                        .then_with(|| a.article_id.cmp(&b.article_id))
                });
                d
            })
            .collect()
    }
}
