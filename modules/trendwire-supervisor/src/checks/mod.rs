pub mod duplicates;
pub mod evergreen;
pub mod labels;

use trendwire_common::text::word_count;
use trendwire_common::{CandidateKind, TopicBucket};

/// Tagged event phrase, or an untagged multi-word label.
pub fn is_event_phrase(bucket: &TopicBucket) -> bool {
    match bucket.kind {
        Some(CandidateKind::EventPhrase) => true,
        Some(_) => false,
        None => word_count(&bucket.label) >= 2,
    }
}

/// Fraction of `items` matching `pred`; 0 for an empty slice.
pub(crate) fn rate<T>(items: &[T], pred: impl Fn(&T) -> bool) -> f64 {
    if items.is_empty() {
        return 0.0;
    }
    items.iter().filter(|i| pred(*i)).count() as f64 / items.len() as f64
}

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::{DateTime, TimeZone, Utc};
    use trendwire_common::{CandidateKind, TopicBucket};

    pub fn hour() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 14, 0, 0).unwrap()
    }

    pub fn bucket(label: &str, kind: Option<CandidateKind>, sources: usize) -> TopicBucket {
        let mut b = TopicBucket::empty(trendwire_common::text::topic_key(label), hour());
        b.label = label.to_string();
        b.kind = kind;
        b.mention_count = 5;
        b.confidence = 0.8;
        b.sources = (0..sources).map(|i| format!("outlet-{i}")).collect();
        b
    }
}
