use std::collections::BTreeSet;
use std::sync::Arc;

use ai_client::util::strip_code_blocks;
use ai_client::TextModel;
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use trendwire_common::config::ExtractionMode;
use trendwire_common::text::{collapse_whitespace, words_lower};
use trendwire_common::{Candidate, CandidateKind, PipelineError, RawDocument};

use crate::lexicon;

// =============================================================================
// Wire format
// =============================================================================

/// What the model returns for each proposed topic.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ExtractedTopic {
    /// 2-6 word event phrase in Title Case, e.g. "Senate Passes Border Bill"
    pub topic: String,
    /// Lowercase words likely to appear in articles about this topic
    #[serde(default)]
    pub keywords: Vec<String>,
    /// 0.0-1.0 confidence that this is a distinct, newsworthy topic
    #[serde(default = "default_relevance")]
    pub relevance: f64,
    /// "event_phrase", "person", "org", or "location"
    #[serde(default, rename = "type", alias = "kind")]
    pub kind: Option<String>,
}

fn default_relevance() -> f64 {
    0.5
}

impl ExtractedTopic {
    fn into_candidate(self) -> Candidate {
        Candidate {
            phrase: collapse_whitespace(self.topic.trim()),
            keywords: self
                .keywords
                .iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
            relevance: if self.relevance.is_finite() {
                self.relevance.clamp(0.0, 1.0)
            } else {
                0.5
            },
            kind: self.kind.as_deref().and_then(CandidateKind::parse),
        }
    }
}

// =============================================================================
// Profiles
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationRules {
    pub min_words: usize,
    pub max_words: usize,
    /// Untagged candidates must carry an action verb, event noun, or
    /// inflected content word.
    pub require_action_signal: bool,
}

/// Prompt template plus validation rules. Event-phrase and entity-only
/// extraction are two instances of this, not two extractors.
#[derive(Debug, Clone)]
pub struct ExtractionProfile {
    pub name: &'static str,
    pub system_prompt: String,
    pub rules: ValidationRules,
}

const EVENT_PHRASE_PROMPT: &str = r#"You identify what news coverage is about right now.

Read the numbered documents and return the distinct topics they cover.

## What to return
- Prefer EVENT PHRASES: 2-6 words, Subject-Verb-Object, Title Case. "Senate Passes Border Bill", "Fed Holds Rates Steady", "Storm Knocks Out Texas Power".
- Name an entity alone only when the coverage has no identifiable event.
- Never return publishers or outlets, vague categories ("Immigration Policy", "The Economy"), dates, or single generic words.
- Merge documents about the same occurrence into one topic.

## Fields
- topic: the phrase
- keywords: 3-6 lowercase words that would appear in an article about it
- relevance: 0.0-1.0
- type: "event_phrase", "person", "org", or "location"

Respond with a JSON array only. No prose."#;

const ENTITY_PROMPT: &str = r#"You identify who and what news coverage is about right now.

Read the numbered documents and return the people, organizations, and places they are about.

## What to return
- Full proper names in Title Case: "Jerome Powell", "Federal Reserve", "Gaza".
- Never return publishers or outlets, dates, or generic words.
- One entry per entity even if many documents mention it.

## Fields
- topic: the entity name
- keywords: 3-6 lowercase words that would appear in an article about it
- relevance: 0.0-1.0
- type: "person", "org", or "location"

Respond with a JSON array only. No prose."#;

impl ExtractionProfile {
    pub fn event_phrases() -> Self {
        Self {
            name: "event_phrases",
            system_prompt: EVENT_PHRASE_PROMPT.to_string(),
            rules: ValidationRules {
                min_words: 2,
                max_words: 6,
                require_action_signal: true,
            },
        }
    }

    pub fn entities() -> Self {
        Self {
            name: "entities",
            system_prompt: ENTITY_PROMPT.to_string(),
            rules: ValidationRules {
                min_words: 1,
                max_words: 6,
                require_action_signal: false,
            },
        }
    }

    pub fn for_mode(mode: ExtractionMode) -> Self {
        match mode {
            ExtractionMode::EventPhrases => Self::event_phrases(),
            ExtractionMode::Entities => Self::entities(),
        }
    }
}

// =============================================================================
// Validation
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Rejection {
    WordCount,
    NotCapitalized,
    Publisher,
    AllStopwords,
    GenericCategory,
    NoActionSignal,
}

impl Rejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WordCount => "word_count",
            Self::NotCapitalized => "not_capitalized",
            Self::Publisher => "publisher",
            Self::AllStopwords => "all_stopwords",
            Self::GenericCategory => "generic_category",
            Self::NoActionSignal => "no_action_signal",
        }
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// First rule the candidate breaks, if any.
pub fn validate(candidate: &Candidate, rules: &ValidationRules) -> Result<(), Rejection> {
    let phrase = candidate.phrase.trim();
    let words = words_lower(phrase);

    if words.len() < rules.min_words || words.len() > rules.max_words {
        return Err(Rejection::WordCount);
    }
    if !phrase.chars().next().is_some_and(char::is_uppercase) {
        return Err(Rejection::NotCapitalized);
    }
    if lexicon::publisher_in(&phrase.to_lowercase()).is_some() {
        return Err(Rejection::Publisher);
    }
    if words.iter().all(|w| lexicon::is_stopword(w)) {
        return Err(Rejection::AllStopwords);
    }
    if lexicon::GENERIC_CATEGORY_RE.is_match(phrase) {
        return Err(Rejection::GenericCategory);
    }
    if rules.require_action_signal
        && candidate.kind != Some(CandidateKind::EventPhrase)
        && !has_action_signal(&words)
    {
        return Err(Rejection::NoActionSignal);
    }
    Ok(())
}

fn has_action_signal(words: &[String]) -> bool {
    words.iter().any(|w| {
        lexicon::is_action_word(w)
            || (w.chars().count() > 3
                && !lexicon::is_stopword(w)
                && (w.ends_with('s') || w.ends_with("ed") || w.ends_with("ing")))
    })
}

// =============================================================================
// Prompt / parse
// =============================================================================

fn truncate_chars(s: &str, limit: usize) -> &str {
    match s.char_indices().nth(limit) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}

/// User prompt for one batch: every document's title and truncated body,
/// then the output schema.
pub fn build_prompt(docs: &[RawDocument], body_char_limit: usize) -> String {
    let mut prompt = String::from("Documents:\n");
    for (i, doc) in docs.iter().enumerate() {
        let body = collapse_whitespace(truncate_chars(&doc.body, body_char_limit));
        prompt.push_str(&format!(
            "\n[{}] {}\nPublished: {}\n{}\n",
            i + 1,
            doc.title.trim(),
            doc.published_at.format("%Y-%m-%d %H:%M UTC"),
            body
        ));
    }

    let schema = schemars::schema_for!(Vec<ExtractedTopic>);
    let schema = serde_json::to_string(&schema).unwrap_or_default();
    prompt.push_str(&format!("\nOutput JSON schema:\n{schema}\n"));
    prompt
}

const WRAPPER_KEYS: &[&str] = &["topics", "candidates", "results"];

/// Parse a model response into candidates.
///
/// Accepts a JSON array, an object wrapping an array under a known key, or a
/// single candidate object. Code fences and leading prose are tolerated.
pub fn parse_candidates(raw: &str) -> Result<Vec<Candidate>, PipelineError> {
    let body = strip_code_blocks(raw);
    let value = parse_json_lenient(body).ok_or_else(|| {
        PipelineError::ExtractionParse(format!(
            "no JSON value in response: {}",
            truncate_chars(body, 120)
        ))
    })?;

    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => {
            let wrapped = WRAPPER_KEYS
                .iter()
                .find(|k| map.get(**k).is_some_and(Value::is_array))
                .and_then(|k| map.remove(*k));
            match wrapped {
                Some(Value::Array(items)) => items,
                _ => vec![Value::Object(map)],
            }
        }
        other => {
            return Err(PipelineError::ExtractionParse(format!(
                "expected array or object, got {other}"
            )))
        }
    };

    let mut candidates = Vec::with_capacity(items.len());
    for item in items {
        let topic = match item {
            Value::String(topic) => ExtractedTopic {
                topic,
                keywords: Vec::new(),
                relevance: default_relevance(),
                kind: None,
            },
            other => match serde_json::from_value::<ExtractedTopic>(other) {
                Ok(t) => t,
                Err(e) => {
                    debug!(error = %e, "Skipping malformed candidate");
                    continue;
                }
            },
        };
        candidates.push(topic.into_candidate());
    }
    Ok(candidates)
}

fn parse_json_lenient(body: &str) -> Option<Value> {
    if let Ok(v) = serde_json::from_str(body) {
        return Some(v);
    }
    // Prose around the payload: try the widest bracketed span.
    for (open, close) in [('[', ']'), ('{', '}')] {
        if let (Some(start), Some(end)) = (body.find(open), body.rfind(close)) {
            if start < end {
                if let Ok(v) = serde_json::from_str(&body[start..=end]) {
                    return Some(v);
                }
            }
        }
    }
    None
}

/// Whether a document is about a candidate: at least two keywords occur in
/// the lowercased title+body, or every phrase word does. Matching is on whole
/// words; a multi-word keyword must appear as a contiguous run.
pub fn matches_document(candidate: &Candidate, search_text: &str) -> bool {
    let haystack = words_lower(search_text);
    let keyword_hits = candidate
        .keywords
        .iter()
        .filter(|k| contains_run(&haystack, &words_lower(k)))
        .count();
    if keyword_hits >= 2 {
        return true;
    }
    let words = words_lower(&candidate.phrase);
    !words.is_empty() && words.iter().all(|w| haystack.iter().any(|h| word_eq(h, w)))
}

fn contains_run(haystack: &[String], needle: &[String]) -> bool {
    !needle.is_empty()
        && haystack
            .windows(needle.len())
            .any(|window| window.iter().zip(needle).all(|(h, n)| word_eq(h, n)))
}

/// "biden's" still mentions "biden".
fn word_eq(token: &str, word: &str) -> bool {
    token == word
        || token
            .strip_suffix("'s")
            .or_else(|| token.strip_suffix("’s"))
            .is_some_and(|stem| stem == word)
}

// =============================================================================
// Port
// =============================================================================

/// Turns a batch of documents into raw candidates. Validation is applied by
/// the caller so rejections can be tallied per rule.
#[async_trait]
pub trait TopicExtractionPort: Send + Sync {
    async fn extract(&self, batch: &[RawDocument]) -> Result<Vec<Candidate>, PipelineError>;
}

pub struct LlmTopicExtractor {
    model: Arc<dyn TextModel>,
    model_name: String,
    profile: ExtractionProfile,
    body_char_limit: usize,
}

impl LlmTopicExtractor {
    pub fn new(
        model: Arc<dyn TextModel>,
        model_name: impl Into<String>,
        profile: ExtractionProfile,
        body_char_limit: usize,
    ) -> Self {
        Self {
            model,
            model_name: model_name.into(),
            profile,
            body_char_limit,
        }
    }

    pub fn profile(&self) -> &ExtractionProfile {
        &self.profile
    }
}

#[async_trait]
impl TopicExtractionPort for LlmTopicExtractor {
    async fn extract(&self, batch: &[RawDocument]) -> Result<Vec<Candidate>, PipelineError> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        let user_prompt = build_prompt(batch, self.body_char_limit);
        let raw = self
            .model
            .complete(&self.model_name, &self.profile.system_prompt, &user_prompt)
            .await
            .map_err(|e| PipelineError::ExtractionCall(e.to_string()))?;

        let candidates = parse_candidates(&raw)?;
        info!(
            profile = self.profile.name,
            docs = batch.len(),
            candidates = candidates.len(),
            "Extracted candidates"
        );
        Ok(candidates)
    }
}
