use std::collections::HashSet;

use trendwire_common::text::topic_key;
use trendwire_common::TopicBucket;

use crate::types::{AuditFinding, CheckStatus};

const AGENT: &str = "evergreen";

/// Names that are always in the news. They should only trend on an
/// unusually sharp spike.
const EVERGREEN: &[&str] = &[
    "trump", "donald trump", "biden", "joe biden", "kamala harris", "elon musk", "musk",
    "taylor swift", "white house", "congress", "supreme court", "federal reserve", "the fed",
    "fed", "nato", "united nations", "european union", "china", "russia", "ukraine", "israel",
    "gaza", "iran", "united states", "apple", "google", "alphabet", "amazon", "tesla",
    "microsoft", "meta", "openai", "ai", "artificial intelligence", "bitcoin", "inflation",
    "economy", "stock market", "climate change", "election",
];

pub struct EvergreenList {
    keys: HashSet<String>,
}

impl EvergreenList {
    pub fn new(extra: &[String]) -> Self {
        let keys = EVERGREEN
            .iter()
            .map(|s| s.to_string())
            .chain(extra.iter().map(|s| topic_key(s)))
            .filter(|k| !k.is_empty())
            .collect();
        Self { keys }
    }

    pub fn contains(&self, bucket: &TopicBucket) -> bool {
        self.keys.contains(&bucket.topic_key) || self.keys.contains(&topic_key(&bucket.label))
    }
}

/// Evergreen topics trending without a spike over their own velocity history.
pub fn is_low_velocity(bucket: &TopicBucket, zscore_threshold: f64) -> bool {
    bucket.velocity_zscore < zscore_threshold
}

pub fn check_evergreen(
    trending: &[TopicBucket],
    list: &EvergreenList,
    zscore_threshold: f64,
) -> Vec<AuditFinding> {
    let evergreen: Vec<&TopicBucket> = trending.iter().filter(|b| list.contains(b)).collect();
    let flagged = evergreen
        .iter()
        .filter(|b| is_low_velocity(b, zscore_threshold))
        .count();
    let single_word = evergreen.iter().filter(|b| b.is_single_word()).count();

    let single_status = if single_word == 0 {
        CheckStatus::Pass
    } else {
        CheckStatus::Fail
    };
    vec![
        AuditFinding::new(
            AGENT,
            "evergreen",
            "low_velocity_evergreen",
            flagged as f64,
            CheckStatus::at_most(flagged as f64, 0.0, 3.0),
        )
        .recommend("Evergreen names trending on baseline coverage; require a velocity spike"),
        AuditFinding::new(
            AGENT,
            "evergreen",
            "single_word_evergreen",
            single_word as f64,
            single_status,
        )
        .recommend("Bare evergreen names in the trending set; prefer the event phrase"),
    ]
}
