// Test mocks for the trend pipeline.
//
// Two mocks matching the two external seams:
// - MockExtractor (TopicExtractionPort): doc id → candidates
// - MockKnowledgeBase (KnowledgeBase): name → entry
//
// Plus helpers for constructing documents and candidates.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use trendwire_common::{Candidate, CandidateKind, PipelineError, RawDocument};

use crate::extractor::TopicExtractionPort;
use crate::knowledge_base::{KbEntry, KnowledgeBase};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// 2026-05-01 at `hour:minute` UTC.
pub fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 1, hour, minute, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

pub fn doc(id: &str, title: &str, body: &str, published_at: DateTime<Utc>) -> RawDocument {
    RawDocument {
        id: id.to_string(),
        title: title.to_string(),
        body: body.to_string(),
        published_at,
        sentiment_score: Some(0.1),
        sentiment_label: None,
        source: Some(format!("source-{id}")),
    }
}

pub fn candidate(phrase: &str, keywords: &[&str], kind: Option<CandidateKind>) -> Candidate {
    Candidate {
        phrase: phrase.to_string(),
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
        relevance: 0.9,
        kind,
    }
}

// ---------------------------------------------------------------------------
// MockExtractor
// ---------------------------------------------------------------------------

/// Returns the union of candidates registered for the batch's documents.
/// Builder pattern: `.on_doc()`, `.with_default()`, `.failing_for()`.
pub struct MockExtractor {
    by_doc: HashMap<String, Vec<Candidate>>,
    default_candidates: Vec<Candidate>,
    failing: HashSet<String>,
    delay: Option<Duration>,
    calls: AtomicU32,
    seen: Mutex<Vec<usize>>,
}

impl MockExtractor {
    pub fn new() -> Self {
        Self {
            by_doc: HashMap::new(),
            default_candidates: Vec::new(),
            failing: HashSet::new(),
            delay: None,
            calls: AtomicU32::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn on_doc(mut self, id: &str, candidates: Vec<Candidate>) -> Self {
        self.by_doc.insert(id.to_string(), candidates);
        self
    }

    /// Returned for every batch in addition to per-doc candidates.
    pub fn with_default(mut self, candidates: Vec<Candidate>) -> Self {
        self.default_candidates = candidates;
        self
    }

    /// Any batch containing this doc fails with an extraction-call error.
    pub fn failing_for(mut self, id: &str) -> Self {
        self.failing.insert(id.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Sizes of the batches received, in call order.
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.seen.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl Default for MockExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TopicExtractionPort for MockExtractor {
    async fn extract(&self, batch: &[RawDocument]) -> Result<Vec<Candidate>, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(batch.len());
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(doc) = batch.iter().find(|d| self.failing.contains(&d.id)) {
            return Err(PipelineError::ExtractionCall(format!(
                "MockExtractor: forced failure for {}",
                doc.id
            )));
        }

        let mut out: Vec<Candidate> = Vec::new();
        let registered = batch.iter().filter_map(|d| self.by_doc.get(&d.id)).flatten();
        for c in registered.chain(self.default_candidates.iter()) {
            if !out.iter().any(|o| o.phrase == c.phrase) {
                out.push(c.clone());
            }
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// MockKnowledgeBase
// ---------------------------------------------------------------------------

/// Name → entry. Unregistered names return `Ok(None)`.
pub struct MockKnowledgeBase {
    entries: HashMap<String, KbEntry>,
    failing: bool,
    calls: AtomicU32,
}

impl MockKnowledgeBase {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            failing: false,
            calls: AtomicU32::new(0),
        }
    }

    pub fn on_name(mut self, name: &str, label: &str, description: &str) -> Self {
        self.entries.insert(
            name.to_lowercase(),
            KbEntry {
                label: label.to_string(),
                description: Some(description.to_string()),
            },
        );
        self
    }

    /// Every lookup errors.
    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockKnowledgeBase {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KnowledgeBase for MockKnowledgeBase {
    async fn lookup(&self, name: &str) -> Result<Option<KbEntry>, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            return Err(PipelineError::ResolutionLookup {
                entity: name.to_string(),
                message: "MockKnowledgeBase: unavailable".to_string(),
            });
        }
        Ok(self.entries.get(&name.to_lowercase()).cloned())
    }
}
