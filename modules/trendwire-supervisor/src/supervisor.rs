use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{info, warn};

use trendwire_common::config::AuditConfig;
use trendwire_common::{PipelineError, TopicBucket};
use trendwire_store::{StoreError, TrendStore};

use crate::checks::duplicates::check_duplicates;
use crate::checks::evergreen::{check_evergreen, is_low_velocity, EvergreenList};
use crate::checks::is_event_phrase;
use crate::checks::labels::{check_labels, MIN_CORROBORATING_SOURCES};
use crate::types::{AuditFinding, AuditReport, CheckStatus, IssueType, SampleRecord};

/// Read-only quality audit over recently trending buckets.
pub struct QualityAuditor {
    store: Arc<dyn TrendStore>,
    config: AuditConfig,
    evergreen: EvergreenList,
}

impl QualityAuditor {
    pub fn new(store: Arc<dyn TrendStore>, config: AuditConfig) -> Self {
        let evergreen = EvergreenList::new(&config.evergreen_extra);
        Self {
            store,
            config,
            evergreen,
        }
    }

    pub async fn audit(&self) -> Result<AuditReport, StoreError> {
        self.audit_at(Utc::now()).await
    }

    /// Audit the window ending at `now`. Only store failures are errors; an
    /// empty window is reported as a failing finding.
    pub async fn audit_at(&self, now: DateTime<Utc>) -> Result<AuditReport, StoreError> {
        let window_start = now - TimeDelta::hours(self.config.window_hours);
        let trending = self
            .store
            .trending(window_start, self.config.min_mentions, self.config.max_trending)
            .await?;
        info!(
            window_hours = self.config.window_hours,
            trending = trending.len(),
            "Auditing trending set"
        );

        if trending.is_empty() {
            let reason = PipelineError::AuditDataUnavailable(format!(
                "no buckets with at least {} mentions since {}",
                self.config.min_mentions,
                window_start.format("%Y-%m-%dT%H:%M:%SZ")
            ));
            warn!(error = %reason, "Nothing to audit");
            let findings = vec![AuditFinding::new(
                "supervisor",
                "coverage",
                "records_in_window",
                0.0,
                CheckStatus::Fail,
            )
            .recommend(reason.to_string())];
            return Ok(AuditReport {
                window_start,
                window_end: now,
                trending_count: 0,
                health_score: AuditReport::compute_health(&findings),
                findings,
                samples: Vec::new(),
            });
        }

        let mut findings = check_labels(&trending);
        findings.extend(check_duplicates(&trending, self.config.near_duplicate_threshold));
        findings.extend(check_evergreen(
            &trending,
            &self.evergreen,
            self.config.evergreen_zscore_threshold,
        ));

        let samples: Vec<SampleRecord> = trending
            .iter()
            .filter_map(|b| self.sample(b))
            .take(self.config.sample_limit)
            .collect();

        let report = AuditReport {
            window_start,
            window_end: now,
            trending_count: trending.len(),
            health_score: AuditReport::compute_health(&findings),
            findings,
            samples,
        };
        info!("Audit complete. {report}");
        Ok(report)
    }

    fn sample(&self, bucket: &TopicBucket) -> Option<SampleRecord> {
        let mut issue_types = Vec::new();
        if bucket.is_single_word() {
            issue_types.push(IssueType::SingleWord);
        }
        if !is_event_phrase(bucket) {
            issue_types.push(IssueType::NotEventPhrase);
        }
        if bucket.source_count() < MIN_CORROBORATING_SOURCES {
            issue_types.push(IssueType::LowSourceCount);
        }
        if self.evergreen.contains(bucket)
            && is_low_velocity(bucket, self.config.evergreen_zscore_threshold)
        {
            issue_types.push(IssueType::LowVelocity);
        }
        if issue_types.is_empty() {
            return None;
        }
        Some(SampleRecord {
            topic_key: bucket.topic_key.clone(),
            label: bucket.label.clone(),
            hour_timestamp: bucket.hour_timestamp,
            mention_count: bucket.mention_count,
            source_count: bucket.source_count(),
            velocity_score: bucket.velocity_score,
            velocity_zscore: bucket.velocity_zscore,
            issue_types,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use trendwire_common::CandidateKind;
    use trendwire_store::MemoryTrendStore;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 18, 0, 0).unwrap()
    }

    fn bucket(label: &str, kind: CandidateKind, hour: u32, mentions: i64) -> TopicBucket {
        let hour = Utc.with_ymd_and_hms(2026, 5, 1, hour, 0, 0).unwrap();
        let mut b = TopicBucket::empty(trendwire_common::text::topic_key(label), hour);
        b.label = label.to_string();
        b.kind = Some(kind);
        b.mention_count = mentions;
        b.confidence = 0.8;
        b.sources = (0..mentions).map(|i| format!("outlet-{i}")).collect();
        b
    }

    #[tokio::test]
    async fn empty_window_is_a_fail_finding() {
        let mut old = bucket("Senate Passes Border Bill", CandidateKind::EventPhrase, 1, 9);
        old.hour_timestamp = now() - TimeDelta::days(3);
        let store = Arc::new(MemoryTrendStore::new().with_bucket(old));
        let auditor = QualityAuditor::new(store, AuditConfig::default());

        let report = auditor.audit_at(now()).await.unwrap();
        assert_eq!(report.findings.len(), 1);
        assert_eq!(report.findings[0].metric, "records_in_window");
        assert_eq!(report.findings[0].status, CheckStatus::Fail);
        assert_eq!(report.health_score, 0.0);
    }

    #[tokio::test]
    async fn samples_carry_issue_types() {
        let mut gaza = bucket("Gaza", CandidateKind::Location, 17, 2);
        gaza.velocity_zscore = 0.5;
        let store = Arc::new(
            MemoryTrendStore::new()
                .with_bucket(bucket("Senate Passes Border Bill", CandidateKind::EventPhrase, 17, 6))
                .with_bucket(gaza),
        );
        let auditor = QualityAuditor::new(store, AuditConfig::default());

        let report = auditor.audit_at(now()).await.unwrap();
        assert_eq!(report.trending_count, 2);
        assert_eq!(report.samples.len(), 1);
        assert_eq!(
            report.samples[0].issue_types,
            vec![
                IssueType::SingleWord,
                IssueType::NotEventPhrase,
                IssueType::LowSourceCount,
                IssueType::LowVelocity,
            ]
        );
        assert_eq!(
            report.finding("single_word_evergreen").map(|f| f.status),
            Some(CheckStatus::Fail)
        );
    }

    #[tokio::test]
    async fn below_min_mentions_is_not_trending() {
        let store = Arc::new(MemoryTrendStore::new().with_bucket(bucket(
            "Senate Passes Border Bill",
            CandidateKind::EventPhrase,
            17,
            1,
        )));
        let auditor = QualityAuditor::new(store, AuditConfig::default());
        let report = auditor.audit_at(now()).await.unwrap();
        assert_eq!(report.trending_count, 0);
    }
}
