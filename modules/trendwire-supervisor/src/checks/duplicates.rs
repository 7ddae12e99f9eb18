use std::collections::{BTreeSet, HashMap};

use trendwire_common::text::{topic_key, words_lower};
use trendwire_common::TopicBucket;

use crate::types::{AuditFinding, CheckStatus};

const AGENT: &str = "duplicates";

/// Words longer than two characters, lowercased.
fn significant_words(label: &str) -> BTreeSet<String> {
    words_lower(label)
        .into_iter()
        .filter(|w| w.chars().count() > 2)
        .collect()
}

pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

pub fn is_near_duplicate(a: &str, b: &str, threshold: f64) -> bool {
    topic_key(a) != topic_key(b) && jaccard(&significant_words(a), &significant_words(b)) > threshold
}

/// Exact duplicate labels (after normalization) and near-duplicate pairs.
pub fn check_duplicates(trending: &[TopicBucket], threshold: f64) -> Vec<AuditFinding> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    for bucket in trending {
        *seen.entry(topic_key(&bucket.label)).or_default() += 1;
    }
    let exact: usize = seen.values().filter(|n| **n > 1).map(|n| n - 1).sum();

    let normalized: Vec<String> = trending.iter().map(|b| topic_key(&b.label)).collect();
    let words: Vec<BTreeSet<String>> = trending.iter().map(|b| significant_words(&b.label)).collect();
    let mut near = 0usize;
    for i in 0..trending.len() {
        for j in (i + 1)..trending.len() {
            if normalized[i] != normalized[j] && jaccard(&words[i], &words[j]) > threshold {
                near += 1;
            }
        }
    }

    let exact_status = if exact == 0 {
        CheckStatus::Pass
    } else {
        CheckStatus::Fail
    };
    vec![
        AuditFinding::new(AGENT, "duplicates", "exact_duplicates", exact as f64, exact_status)
            .recommend("Identical labels stored under different keys; check topic normalization"),
        AuditFinding::new(
            AGENT,
            "duplicates",
            "near_duplicate_pairs",
            near as f64,
            CheckStatus::at_most(near as f64, 5.0, 15.0),
        )
        .recommend("Near-duplicate topics are splitting mentions; extend the variant table"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::fixtures::bucket;
    use trendwire_common::CandidateKind;

    #[test]
    fn near_duplicate_pairs() {
        assert!(is_near_duplicate(
            "Senate Passes Border Bill",
            "Senate Passes Border Funding Bill",
            0.6
        ));
        assert!(!is_near_duplicate("Senate Passes Border Bill", "House Rejects Tax Cut", 0.6));
        // exact (normalized) matches are not counted as near
        assert!(!is_near_duplicate("Senate Passes Border Bill", "senate passes border bill.", 0.6));
    }

    #[test]
    fn exact_duplicates_fail() {
        let mut a = bucket("Fed Holds Rates", Some(CandidateKind::EventPhrase), 3);
        a.topic_key = "fed holds rates".into();
        let mut b = bucket("Fed holds rates.", Some(CandidateKind::EventPhrase), 3);
        b.topic_key = "fed hold rates".into();

        let findings = check_duplicates(&[a, b], 0.6);
        assert_eq!(findings[0].value, 1.0);
        assert_eq!(findings[0].status, CheckStatus::Fail);
        assert_eq!(findings[1].value, 0.0);
    }

    #[test]
    fn many_near_duplicates_escalate() {
        let trending: Vec<_> = (0..7)
            .map(|i| {
                bucket(
                    &format!("Senate Passes Border Bill Version{i}"),
                    Some(CandidateKind::EventPhrase),
                    3,
                )
            })
            .collect();
        // 21 pairs, each sharing 4 of 6 words
        let findings = check_duplicates(&trending, 0.6);
        assert_eq!(findings[1].value, 21.0);
        assert_eq!(findings[1].status, CheckStatus::Fail);
    }
}
