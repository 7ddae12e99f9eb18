use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::text;

/// Sample list caps on a topic bucket.
pub const MAX_SAMPLE_TITLES: usize = 5;
pub const MAX_SAMPLE_ARTICLE_IDS: usize = 20;
pub const MAX_KEYWORDS: usize = 10;
pub const MAX_SOURCES: usize = 50;

// =============================================================================
// Documents
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Neutral,
    Negative,
}

impl SentimentLabel {
    /// Bucket a score in [-1, 1]; the neutral band is ±0.05.
    pub fn from_score(score: f64) -> Self {
        if score > 0.05 {
            Self::Positive
        } else if score < -0.05 {
            Self::Negative
        } else {
            Self::Neutral
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "positive" | "pos" => Some(Self::Positive),
            "neutral" | "neu" | "mixed" => Some(Self::Neutral),
            "negative" | "neg" => Some(Self::Negative),
            _ => None,
        }
    }
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Positive => write!(f, "positive"),
            Self::Neutral => write!(f, "neutral"),
            Self::Negative => write!(f, "negative"),
        }
    }
}

/// An ingested article or post. Immutable once ingested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDocument {
    pub id: String,
    pub title: String,
    pub body: String,
    pub published_at: DateTime<Utc>,
    pub sentiment_score: Option<f64>,
    pub sentiment_label: Option<SentimentLabel>,
    /// Publisher or account name, used for source corroboration.
    #[serde(default)]
    pub source: Option<String>,
}

impl RawDocument {
    pub fn hour_bucket(&self) -> DateTime<Utc> {
        text::hour_bucket(self.published_at)
    }

    /// Lowercased title + body, the haystack for candidate→document matching.
    pub fn search_text(&self) -> String {
        format!("{} {}", self.title, self.body).to_lowercase()
    }

    /// Label if present, otherwise derived from the score.
    pub fn effective_sentiment_label(&self) -> Option<SentimentLabel> {
        self.sentiment_label
            .or_else(|| self.sentiment_score.map(SentimentLabel::from_score))
    }
}

// =============================================================================
// Candidates
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateKind {
    EventPhrase,
    Person,
    Org,
    Location,
}

impl CandidateKind {
    /// Lenient parse of the model's `type` field.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "event_phrase" | "event" | "eventphrase" => Some(Self::EventPhrase),
            "person" | "people" => Some(Self::Person),
            "org" | "organization" | "organisation" | "company" | "agency" => Some(Self::Org),
            "location" | "place" | "country" | "city" => Some(Self::Location),
            _ => None,
        }
    }

    pub fn is_entity(&self) -> bool {
        !matches!(self, Self::EventPhrase)
    }
}

impl fmt::Display for CandidateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EventPhrase => write!(f, "event_phrase"),
            Self::Person => write!(f, "person"),
            Self::Org => write!(f, "org"),
            Self::Location => write!(f, "location"),
        }
    }
}

/// A phrase proposed by the extractor. Ephemeral; never persisted directly.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub phrase: String,
    pub keywords: BTreeSet<String>,
    pub relevance: f64,
    /// `None` when the model did not tag the candidate.
    pub kind: Option<CandidateKind>,
}

// =============================================================================
// Entity resolution
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Person,
    Organization,
    Location,
    Unknown,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Person => "person",
            Self::Organization => "organization",
            Self::Location => "location",
            Self::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "person" => Self::Person,
            "organization" => Self::Organization,
            "location" => Self::Location,
            _ => Self::Unknown,
        }
    }
}

impl From<CandidateKind> for EntityType {
    fn from(kind: CandidateKind) -> Self {
        match kind {
            CandidateKind::Person => Self::Person,
            CandidateKind::Org => Self::Organization,
            CandidateKind::Location => Self::Location,
            CandidateKind::EventPhrase => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionMethod {
    Cache,
    Fuzzy,
    KnowledgeBase,
    Passthrough,
    Invalid,
}

impl ResolutionMethod {
    /// Fixed precedence: Cache > Fuzzy > KnowledgeBase > Passthrough > Invalid.
    pub fn precedence(&self) -> u8 {
        match self {
            Self::Cache => 4,
            Self::Fuzzy => 3,
            Self::KnowledgeBase => 2,
            Self::Passthrough => 1,
            Self::Invalid => 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::Fuzzy => "fuzzy",
            Self::KnowledgeBase => "knowledge_base",
            Self::Passthrough => "passthrough",
            Self::Invalid => "invalid",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "cache" => Some(Self::Cache),
            "fuzzy" => Some(Self::Fuzzy),
            "knowledge_base" => Some(Self::KnowledgeBase),
            "passthrough" => Some(Self::Passthrough),
            "invalid" => Some(Self::Invalid),
            _ => None,
        }
    }
}

impl fmt::Display for ResolutionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of resolving one string.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub canonical: String,
    pub entity_type: EntityType,
    pub method: ResolutionMethod,
    pub confidence: f64,
}

impl Resolution {
    pub fn is_valid(&self) -> bool {
        self.method != ResolutionMethod::Invalid
    }
}

/// One row of the alias dictionary, keyed by normalized `raw_name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityAlias {
    pub raw_name: String,
    pub canonical_name: String,
    pub entity_type: EntityType,
    /// How the alias was first learned. A cache hit reports `Cache` to the
    /// caller but the stored row keeps its original method.
    pub resolution_method: ResolutionMethod,
    pub confidence_score: f64,
    pub usage_count: i64,
}

impl EntityAlias {
    pub fn new(
        raw_name: impl Into<String>,
        canonical_name: impl Into<String>,
        entity_type: EntityType,
        resolution_method: ResolutionMethod,
        confidence_score: f64,
    ) -> Self {
        Self {
            raw_name: raw_name.into(),
            canonical_name: canonical_name.into(),
            entity_type,
            resolution_method,
            confidence_score: confidence_score.clamp(0.0, 1.0),
            usage_count: 0,
        }
    }

    /// Whether `incoming` may replace this row. Higher-precedence methods win;
    /// within a method, only strictly higher confidence wins.
    pub fn yields_to(&self, incoming: &EntityAlias) -> bool {
        let (mine, theirs) = (
            self.resolution_method.precedence(),
            incoming.resolution_method.precedence(),
        );
        theirs > mine || (theirs == mine && incoming.confidence_score > self.confidence_score)
    }
}

// =============================================================================
// Topic buckets
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentimentCounts {
    pub positive: i64,
    pub neutral: i64,
    pub negative: i64,
}

impl SentimentCounts {
    pub fn record(&mut self, label: SentimentLabel) {
        match label {
            SentimentLabel::Positive => self.positive += 1,
            SentimentLabel::Neutral => self.neutral += 1,
            SentimentLabel::Negative => self.negative += 1,
        }
    }

    pub fn total(&self) -> i64 {
        self.positive + self.neutral + self.negative
    }
}

/// One document's contribution to a topic bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleContribution {
    pub article_id: String,
    pub title: String,
    pub published_at: DateTime<Utc>,
    pub source: Option<String>,
    pub sentiment_score: Option<f64>,
    pub sentiment_label: Option<SentimentLabel>,
}

impl From<&RawDocument> for ArticleContribution {
    fn from(doc: &RawDocument) -> Self {
        Self {
            article_id: doc.id.clone(),
            title: doc.title.clone(),
            published_at: doc.published_at,
            source: doc.source.clone(),
            sentiment_score: doc.sentiment_score,
            sentiment_label: doc.effective_sentiment_label(),
        }
    }
}

/// Everything one writer wants merged into `(topic_key, hour)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketDelta {
    pub topic_key: String,
    pub hour: DateTime<Utc>,
    pub label: String,
    pub kind: Option<CandidateKind>,
    pub confidence: f64,
    pub keywords: Vec<String>,
    /// Ordered oldest-first; sample lists keep the first arrivals.
    pub articles: Vec<ArticleContribution>,
}

impl BucketDelta {
    pub fn key(&self) -> String {
        bucket_key(&self.topic_key, self.hour)
    }
}

pub fn bucket_key(topic_key: &str, hour: DateTime<Utc>) -> String {
    format!("{topic_key}@{}", hour.format("%Y-%m-%dT%H:00Z"))
}

/// Per-topic, per-hour aggregate. Unique by `(topic_key, hour_timestamp)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicBucket {
    pub topic_key: String,
    pub hour_timestamp: DateTime<Utc>,
    pub label: String,
    pub kind: Option<CandidateKind>,
    pub mention_count: i64,
    /// Every counted article. Backs at-most-once counting; not capped.
    pub article_ids: BTreeSet<String>,
    pub sample_article_ids: Vec<String>,
    pub sample_titles: Vec<String>,
    pub sources: BTreeSet<String>,
    pub keywords: BTreeSet<String>,
    pub sentiment_avg: f64,
    pub sentiment_samples: i64,
    pub sentiment_counts: SentimentCounts,
    pub confidence: f64,
    pub velocity_score: f64,
    pub momentum_score: f64,
    pub velocity_zscore: f64,
}

impl TopicBucket {
    pub fn empty(topic_key: impl Into<String>, hour: DateTime<Utc>) -> Self {
        Self {
            topic_key: topic_key.into(),
            hour_timestamp: hour,
            label: String::new(),
            kind: None,
            mention_count: 0,
            article_ids: BTreeSet::new(),
            sample_article_ids: Vec::new(),
            sample_titles: Vec::new(),
            sources: BTreeSet::new(),
            keywords: BTreeSet::new(),
            sentiment_avg: 0.0,
            sentiment_samples: 0,
            sentiment_counts: SentimentCounts::default(),
            confidence: 0.0,
            velocity_score: 0.0,
            momentum_score: 0.0,
            velocity_zscore: 0.0,
        }
    }

    pub fn from_delta(delta: &BucketDelta) -> Self {
        let mut bucket = Self::empty(delta.topic_key.clone(), delta.hour);
        bucket.absorb(delta);
        bucket
    }

    pub fn key(&self) -> String {
        bucket_key(&self.topic_key, self.hour_timestamp)
    }

    /// Merge a writer's delta. Articles already counted are ignored, so
    /// replaying a delta is a no-op. Returns the number of newly counted
    /// articles.
    pub fn absorb(&mut self, delta: &BucketDelta) -> i64 {
        if self.label.is_empty() {
            self.label = delta.label.clone();
        }
        if self.kind.is_none() {
            self.kind = delta.kind;
        }
        self.confidence = self.confidence.max(delta.confidence.clamp(0.0, 1.0));

        for keyword in &delta.keywords {
            if self.keywords.len() >= MAX_KEYWORDS {
                break;
            }
            let keyword = keyword.trim().to_lowercase();
            if !keyword.is_empty() {
                self.keywords.insert(keyword);
            }
        }

        let mut added = 0;
        for article in &delta.articles {
            if !self.article_ids.insert(article.article_id.clone()) {
                continue;
            }
            added += 1;

            if self.sample_article_ids.len() < MAX_SAMPLE_ARTICLE_IDS {
                self.sample_article_ids.push(article.article_id.clone());
            }
            if self.sample_titles.len() < MAX_SAMPLE_TITLES {
                self.sample_titles.push(article.title.clone());
            }
            if let Some(source) = article.source.as_deref().map(str::trim) {
                if !source.is_empty() && self.sources.len() < MAX_SOURCES {
                    self.sources.insert(source.to_string());
                }
            }
            if let Some(score) = article.sentiment_score {
                let n = self.sentiment_samples as f64;
                self.sentiment_avg = (self.sentiment_avg * n + score) / (n + 1.0);
                self.sentiment_samples += 1;
            }
            let label = article
                .sentiment_label
                .or_else(|| article.sentiment_score.map(SentimentLabel::from_score));
            if let Some(label) = label {
                self.sentiment_counts.record(label);
            }
        }

        self.mention_count = self.article_ids.len() as i64;
        added
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    pub fn is_single_word(&self) -> bool {
        text::word_count(&self.label) <= 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn hour() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 14, 0, 0).unwrap()
    }

    fn article(id: &str, score: Option<f64>) -> ArticleContribution {
        ArticleContribution {
            article_id: id.to_string(),
            title: format!("Title {id}"),
            published_at: hour(),
            source: Some(format!("outlet-{id}")),
            sentiment_score: score,
            sentiment_label: None,
        }
    }

    fn delta(ids: &[&str]) -> BucketDelta {
        BucketDelta {
            topic_key: "senate passes border bill".to_string(),
            hour: hour(),
            label: "Senate Passes Border Bill".to_string(),
            kind: Some(CandidateKind::EventPhrase),
            confidence: 0.5,
            keywords: vec!["senate".into(), "border".into()],
            articles: ids.iter().map(|id| article(id, Some(0.4))).collect(),
        }
    }

    #[test]
    fn absorb_is_idempotent_per_article() {
        let mut bucket = TopicBucket::from_delta(&delta(&["a", "b"]));
        assert_eq!(bucket.mention_count, 2);

        let added = bucket.absorb(&delta(&["a", "b"]));
        assert_eq!(added, 0);
        assert_eq!(bucket.mention_count, 2);
        assert_eq!(bucket.sample_titles.len(), 2);
        assert_eq!(bucket.sentiment_samples, 2);
    }

    #[test]
    fn absorb_sums_disjoint_writers() {
        let mut bucket = TopicBucket::from_delta(&delta(&["a", "b"]));
        bucket.absorb(&delta(&["c"]));
        assert_eq!(bucket.mention_count, 3);
        assert_eq!(bucket.source_count(), 3);
    }

    #[test]
    fn sample_lists_keep_first_arrivals() {
        let ids: Vec<String> = (0..30).map(|i| format!("doc-{i:02}")).collect();
        let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        let bucket = TopicBucket::from_delta(&delta(&refs));

        assert_eq!(bucket.mention_count, 30);
        assert_eq!(bucket.sample_titles.len(), MAX_SAMPLE_TITLES);
        assert_eq!(bucket.sample_article_ids.len(), MAX_SAMPLE_ARTICLE_IDS);
        assert_eq!(bucket.sample_article_ids[0], "doc-00");
        assert_eq!(bucket.sample_titles[4], "Title doc-04");
    }

    #[test]
    fn keywords_are_capped() {
        let mut d = delta(&["a"]);
        d.keywords = (0..25).map(|i| format!("kw{i}")).collect();
        let bucket = TopicBucket::from_delta(&d);
        assert_eq!(bucket.keywords.len(), MAX_KEYWORDS);
    }

    #[test]
    fn sentiment_average_is_running_mean() {
        let mut d = delta(&[]);
        d.articles = vec![article("a", Some(0.5)), article("b", Some(-0.1)), article("c", None)];
        let bucket = TopicBucket::from_delta(&d);
        assert!((bucket.sentiment_avg - 0.2).abs() < 1e-9);
        assert_eq!(bucket.sentiment_samples, 2);
        assert_eq!(bucket.sentiment_counts.positive, 1);
        assert_eq!(bucket.sentiment_counts.negative, 1);
        assert_eq!(bucket.sentiment_counts.total(), 2);
    }

    #[test]
    fn confidence_keeps_maximum() {
        let mut bucket = TopicBucket::from_delta(&delta(&["a"]));
        let mut higher = delta(&["b"]);
        higher.confidence = 0.9;
        bucket.absorb(&higher);
        let mut lower = delta(&["c"]);
        lower.confidence = 0.2;
        bucket.absorb(&lower);
        assert!((bucket.confidence - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn alias_precedence_never_downgrades() {
        let cached = EntityAlias::new("trump", "Donald Trump", EntityType::Person, ResolutionMethod::Fuzzy, 0.95);
        let kb = EntityAlias::new("trump", "Trump", EntityType::Unknown, ResolutionMethod::KnowledgeBase, 0.99);
        assert!(!cached.yields_to(&kb));

        let better_fuzzy = EntityAlias::new("trump", "Donald Trump", EntityType::Person, ResolutionMethod::Fuzzy, 0.97);
        assert!(cached.yields_to(&better_fuzzy));
    }

    #[test]
    fn alias_confidence_is_clamped() {
        let alias = EntityAlias::new("x", "X", EntityType::Unknown, ResolutionMethod::Fuzzy, 1.7);
        assert_eq!(alias.confidence_score, 1.0);
    }

    #[test]
    fn candidate_kind_parse_is_lenient() {
        assert_eq!(CandidateKind::parse("Event Phrase"), Some(CandidateKind::EventPhrase));
        assert_eq!(CandidateKind::parse("organization"), Some(CandidateKind::Org));
        assert_eq!(CandidateKind::parse("thing"), None);
    }

    #[test]
    fn sentiment_label_from_score() {
        assert_eq!(SentimentLabel::from_score(0.3), SentimentLabel::Positive);
        assert_eq!(SentimentLabel::from_score(0.0), SentimentLabel::Neutral);
        assert_eq!(SentimentLabel::from_score(-0.6), SentimentLabel::Negative);
    }
}
