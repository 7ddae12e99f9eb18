use trendwire_common::TopicBucket;

use crate::types::{AuditFinding, CheckStatus};

use super::{is_event_phrase, rate};

const AGENT: &str = "label_quality";

/// Distinct sources needed for a topic to count as corroborated.
pub const MIN_CORROBORATING_SOURCES: usize = 3;

/// Label-shape and corroboration metrics over the trending set.
pub fn check_labels(trending: &[TopicBucket]) -> Vec<AuditFinding> {
    let event_rate = rate(trending, is_event_phrase);
    let single_rate = rate(trending, TopicBucket::is_single_word);
    let corroborated = rate(trending, |b| b.source_count() >= MIN_CORROBORATING_SOURCES);
    let avg_confidence = if trending.is_empty() {
        0.0
    } else {
        trending.iter().map(|b| b.confidence).sum::<f64>() / trending.len() as f64
    };

    vec![
        AuditFinding::new(
            AGENT,
            "labels",
            "event_phrase_rate",
            event_rate,
            CheckStatus::at_least(event_rate, 0.5, 0.3),
        )
        .recommend("Too many bare entity labels; tighten the event-phrase prompt"),
        AuditFinding::new(
            AGENT,
            "labels",
            "single_word_rate",
            single_rate,
            CheckStatus::at_most(single_rate, 0.15, 0.25),
        )
        .recommend("Single-word topics are trending; check the extraction profile"),
        AuditFinding::new(
            AGENT,
            "corroboration",
            "source_corroboration_rate",
            corroborated,
            CheckStatus::at_least(corroborated, 0.5, 0.25),
        )
        .recommend("Most trending topics rest on fewer than 3 sources"),
        AuditFinding::new(
            AGENT,
            "confidence",
            "avg_confidence",
            avg_confidence,
            CheckStatus::at_least(avg_confidence, 0.7, 0.5),
        )
        .recommend("Low average confidence; review resolution and relevance scores"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::fixtures::bucket;
    use trendwire_common::CandidateKind;

    fn status(findings: &[AuditFinding], metric: &str) -> CheckStatus {
        findings
            .iter()
            .find(|f| f.metric == metric)
            .map(|f| f.status)
            .unwrap()
    }

    #[test]
    fn healthy_event_phrases_pass() {
        let trending = vec![
            bucket("Senate Passes Border Bill", Some(CandidateKind::EventPhrase), 4),
            bucket("Fed Holds Rates Steady", Some(CandidateKind::EventPhrase), 3),
        ];
        let findings = check_labels(&trending);
        assert!(findings.iter().all(|f| f.status == CheckStatus::Pass));
    }

    #[test]
    fn bare_entities_fail_label_checks() {
        let trending = vec![
            bucket("Trump", Some(CandidateKind::Person), 1),
            bucket("Gaza", Some(CandidateKind::Location), 1),
            bucket("Senate Passes Border Bill", Some(CandidateKind::EventPhrase), 1),
        ];
        let findings = check_labels(&trending);
        assert_eq!(status(&findings, "event_phrase_rate"), CheckStatus::Warn);
        assert_eq!(status(&findings, "single_word_rate"), CheckStatus::Fail);
        assert_eq!(status(&findings, "source_corroboration_rate"), CheckStatus::Fail);
    }
}
