use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

impl CheckStatus {
    /// Higher-is-better metric.
    pub fn at_least(value: f64, pass: f64, warn: f64) -> Self {
        if value >= pass {
            Self::Pass
        } else if value >= warn {
            Self::Warn
        } else {
            Self::Fail
        }
    }

    /// Lower-is-better metric.
    pub fn at_most(value: f64, pass: f64, warn: f64) -> Self {
        if value <= pass {
            Self::Pass
        } else if value <= warn {
            Self::Warn
        } else {
            Self::Fail
        }
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass => write!(f, "PASS"),
            Self::Warn => write!(f, "WARN"),
            Self::Fail => write!(f, "FAIL"),
        }
    }
}

/// One measured metric from one check.
#[derive(Debug, Clone, Serialize)]
pub struct AuditFinding {
    pub agent: &'static str,
    pub category: &'static str,
    pub metric: &'static str,
    pub value: f64,
    pub status: CheckStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
}

impl AuditFinding {
    pub fn new(
        agent: &'static str,
        category: &'static str,
        metric: &'static str,
        value: f64,
        status: CheckStatus,
    ) -> Self {
        Self {
            agent,
            category,
            metric,
            value,
            status,
            recommendation: None,
        }
    }

    /// Attach a recommendation unless the finding passed.
    pub fn recommend(mut self, text: impl Into<String>) -> Self {
        if self.status != CheckStatus::Pass {
            self.recommendation = Some(text.into());
        }
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueType {
    SingleWord,
    NotEventPhrase,
    LowSourceCount,
    LowVelocity,
}

impl fmt::Display for IssueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SingleWord => write!(f, "SINGLE_WORD"),
            Self::NotEventPhrase => write!(f, "NOT_EVENT_PHRASE"),
            Self::LowSourceCount => write!(f, "LOW_SOURCE_COUNT"),
            Self::LowVelocity => write!(f, "LOW_VELOCITY"),
        }
    }
}

/// A trending record with at least one problem.
#[derive(Debug, Clone, Serialize)]
pub struct SampleRecord {
    pub topic_key: String,
    pub label: String,
    pub hour_timestamp: DateTime<Utc>,
    pub mention_count: i64,
    pub source_count: usize,
    pub velocity_score: f64,
    pub velocity_zscore: f64,
    pub issue_types: Vec<IssueType>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditReport {
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub trending_count: usize,
    pub health_score: f64,
    pub findings: Vec<AuditFinding>,
    pub samples: Vec<SampleRecord>,
}

impl AuditReport {
    /// `100 × (pass + 0.5·warn) / total`; 0 with no findings.
    pub fn compute_health(findings: &[AuditFinding]) -> f64 {
        if findings.is_empty() {
            return 0.0;
        }
        let pass = findings.iter().filter(|f| f.status == CheckStatus::Pass).count() as f64;
        let warn = findings.iter().filter(|f| f.status == CheckStatus::Warn).count() as f64;
        100.0 * (pass + 0.5 * warn) / findings.len() as f64
    }

    pub fn count(&self, status: CheckStatus) -> usize {
        self.findings.iter().filter(|f| f.status == status).count()
    }

    pub fn finding(&self, metric: &str) -> Option<&AuditFinding> {
        self.findings.iter().find(|f| f.metric == metric)
    }
}

impl fmt::Display for AuditReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "health={:.1} trending={} pass={} warn={} fail={} samples={}",
            self.health_score,
            self.trending_count,
            self.count(CheckStatus::Pass),
            self.count(CheckStatus::Warn),
            self.count(CheckStatus::Fail),
            self.samples.len(),
        )
    }
}
