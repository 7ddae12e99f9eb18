use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, TimeDelta, Utc};
use futures::stream::{self, StreamExt};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use typed_builder::TypedBuilder;

use trendwire_common::{Candidate, PipelineConfig, PipelineError, RawDocument, ResolutionMethod};
use trendwire_store::{AliasStore, DocumentSource, StoreError, TrendStore};

use crate::aggregator::{canonical_topic_key, ResolvedTopic, TopicAggregator};
use crate::canonicalizer::Canonicalizer;
use crate::extractor::{matches_document, validate, ExtractionProfile, TopicExtractionPort, ValidationRules};
use crate::knowledge_base::KnowledgeBase;
use crate::stats::RunStats;
use crate::velocity::VelocityEngine;

/// Long-lived dependencies for trend runs.
#[derive(Clone, TypedBuilder)]
pub struct ScoutDeps {
    pub documents: Arc<dyn DocumentSource>,
    pub trends: Arc<dyn TrendStore>,
    pub aliases: Arc<dyn AliasStore>,
    pub extractor: Arc<dyn TopicExtractionPort>,
    #[builder(default)]
    pub knowledge_base: Option<Arc<dyn KnowledgeBase>>,
    #[builder(default)]
    pub config: PipelineConfig,
}

enum BatchOutcome {
    Extracted(Vec<Candidate>),
    Failed(PipelineError),
    Skipped,
}

struct BatchResult {
    index: usize,
    docs: Vec<RawDocument>,
    outcome: BatchOutcome,
}

/// One run: claim pending documents, extract, canonicalize, aggregate into
/// hourly buckets, then score velocity.
pub struct TrendScout {
    deps: ScoutDeps,
    rules: ValidationRules,
    velocity: VelocityEngine,
}

impl TrendScout {
    pub fn new(deps: ScoutDeps) -> Self {
        let rules = ExtractionProfile::for_mode(deps.config.extraction.mode).rules;
        let velocity = VelocityEngine::new(deps.trends.clone());
        Self {
            deps,
            rules,
            velocity,
        }
    }

    pub async fn run(&self) -> Result<RunStats> {
        let extraction = &self.deps.config.extraction;
        let docs = self
            .deps
            .documents
            .pending(
                extraction.max_documents,
                TimeDelta::seconds(extraction.claim_ttl_secs as i64),
            )
            .await
            .context("Failed to claim pending documents")?;
        if docs.is_empty() {
            info!("No pending documents");
            return Ok(RunStats::default());
        }
        info!(documents = docs.len(), "Claimed pending documents");

        let claimed: Vec<String> = docs.iter().map(|d| d.id.clone()).collect();
        let canonicalizer = self.build_canonicalizer();
        let result = self.run_inner(docs, &canonicalizer).await;

        // Alias write-backs are joined on every exit path.
        let writes = canonicalizer.finish().await;

        match result {
            Ok(mut stats) => {
                stats.cache_writes_failed = writes.failed;
                info!("{stats}");
                Ok(stats)
            }
            Err(e) => {
                // Hand everything back if the run died before settling documents.
                if let Err(release_err) = self.deps.documents.release(&claimed).await {
                    error!("Failed to release claimed documents: {release_err}");
                }
                Err(e)
            }
        }
    }

    async fn run_inner(
        &self,
        docs: Vec<RawDocument>,
        canonicalizer: &Canonicalizer,
    ) -> Result<RunStats> {
        let mut stats = RunStats::default();
        let extraction = &self.deps.config.extraction;
        let batch_size = extraction.effective_batch_size();
        let call_timeout = Duration::from_secs(extraction.call_timeout_secs);
        let deadline = extraction
            .soft_deadline_secs
            .map(|secs| Instant::now() + Duration::from_secs(secs));

        let batches: Vec<Vec<RawDocument>> = docs.chunks(batch_size).map(<[_]>::to_vec).collect();
        info!(
            batches = batches.len(),
            batch_size,
            concurrency = extraction.concurrency,
            "Starting extraction"
        );

        // 1. Extraction (bounded concurrency, each call raced against a timeout)
        let mut results: Vec<BatchResult> = stream::iter(batches.into_iter().enumerate().map(
            |(index, docs)| async move {
                if deadline.is_some_and(|d| Instant::now() >= d) {
                    return BatchResult {
                        index,
                        docs,
                        outcome: BatchOutcome::Skipped,
                    };
                }
                let outcome =
                    match tokio::time::timeout(call_timeout, self.deps.extractor.extract(&docs)).await {
                        Ok(Ok(candidates)) => BatchOutcome::Extracted(candidates),
                        Ok(Err(e)) => BatchOutcome::Failed(e),
                        Err(_) => BatchOutcome::Failed(PipelineError::ExtractionCall(format!(
                            "timed out after {}s",
                            call_timeout.as_secs()
                        ))),
                    };
                BatchResult {
                    index,
                    docs,
                    outcome,
                }
            },
        ))
        .buffer_unordered(extraction.concurrency.max(1))
        .collect()
        .await;
        results.sort_by_key(|r| r.index);

        // 2. Validate, canonicalize, aggregate (sequential)
        let mut aggregator = TopicAggregator::new();
        let mut extracted_ids: Vec<String> = Vec::new();
        let mut release_ids: Vec<String> = Vec::new();

        for BatchResult {
            index,
            docs,
            outcome,
        } in results
        {
            let start = index * batch_size;
            let range = format!("{}..{}", start, start + docs.len());
            let ids = docs.iter().map(|d| d.id.clone());
            match outcome {
                BatchOutcome::Skipped => {
                    stats.batches_skipped += 1;
                    debug!(batch = %range, "Soft deadline reached, batch not started");
                    release_ids.extend(ids);
                }
                BatchOutcome::Failed(e) => {
                    stats.batches_submitted += 1;
                    stats.batches_failed += 1;
                    warn!(batch = %range, kind = e.kind(), error = %e, "Extraction failed, skipping batch");
                    stats.non_fatal_errors.push(format!("batch {range}: {e}"));
                    release_ids.extend(ids);
                }
                BatchOutcome::Extracted(candidates) => {
                    stats.batches_submitted += 1;
                    stats.articles_analyzed += docs.len() as u32;
                    self.aggregate_batch(&docs, candidates, canonicalizer, &mut aggregator, &mut stats)
                        .await
                        .with_context(|| format!("Alias lookup failed in batch {range}"))?;
                    extracted_ids.extend(ids);
                }
            }
        }
        stats.kb_lookups = canonicalizer.kb_lookups();
        stats.kb_failures = canonicalizer.kb_failures();

        // 3. Persist buckets
        let mut stored: BTreeSet<(String, DateTime<Utc>)> = BTreeSet::new();
        let mut conflicted: HashSet<String> = HashSet::new();
        for delta in aggregator.into_deltas() {
            match self.deps.trends.upsert_bucket(&delta).await {
                Ok(bucket) => {
                    stats.topics_stored += 1;
                    debug!(
                        topic_key = bucket.topic_key.as_str(),
                        mentions = bucket.mention_count,
                        "Stored bucket"
                    );
                    stored.insert((bucket.topic_key, bucket.hour_timestamp));
                }
                Err(e @ (StoreError::Conflict { .. } | StoreError::InvalidWrite(_))) => {
                    let key = delta.key();
                    warn!(bucket = key.as_str(), error = %e, "Bucket upsert failed, releasing its documents");
                    stats
                        .non_fatal_errors
                        .push(PipelineError::from(e).to_string());
                    conflicted.extend(delta.articles.iter().map(|a| a.article_id.clone()));
                }
                Err(e) => return Err(e).with_context(|| format!("Failed to upsert {}", delta.key())),
            }
        }

        // 4. Velocity, momentum, baseline z-score
        self.score(&stored, &mut stats).await?;

        // 5. Settle documents
        let (requeue, done): (Vec<String>, Vec<String>) =
            extracted_ids.into_iter().partition(|id| conflicted.contains(id));
        release_ids.extend(requeue);
        self.deps
            .documents
            .mark_extracted(&done)
            .await
            .context("Failed to mark documents extracted")?;
        if !release_ids.is_empty() {
            self.deps
                .documents
                .release(&release_ids)
                .await
                .context("Failed to release documents")?;
        }
        stats.documents_released = release_ids.len() as u32;
        Ok(stats)
    }

    async fn aggregate_batch(
        &self,
        docs: &[RawDocument],
        candidates: Vec<Candidate>,
        canonicalizer: &Canonicalizer,
        aggregator: &mut TopicAggregator,
        stats: &mut RunStats,
    ) -> Result<(), StoreError> {
        let haystacks: Vec<String> = docs.iter().map(RawDocument::search_text).collect();

        for candidate in candidates {
            stats.topics_extracted += 1;
            if let Err(rule) = validate(&candidate, &self.rules) {
                debug!(phrase = candidate.phrase.as_str(), %rule, "Rejected candidate");
                stats.record_rejection(rule);
                continue;
            }

            let resolution = canonicalizer.resolve(&candidate.phrase, candidate.kind).await?;
            stats.record_resolution(resolution.method);
            let key = canonical_topic_key(&resolution.canonical);
            if !resolution.is_valid() || key.is_empty() {
                stats.candidates_invalid += 1;
                continue;
            }

            // Passthrough carries no resolution evidence; use the model's relevance.
            let confidence = match resolution.method {
                ResolutionMethod::Passthrough => candidate.relevance,
                _ => resolution.confidence,
            };
            let topic = ResolvedTopic {
                key,
                label: resolution.canonical,
                kind: candidate.kind,
                confidence,
                keywords: candidate.keywords.iter().cloned().collect(),
            };

            let mut matched = 0;
            for (doc, haystack) in docs.iter().zip(&haystacks) {
                if matches_document(&candidate, haystack) {
                    matched += 1;
                    aggregator.add(doc, &topic);
                }
            }
            if matched == 0 {
                stats.candidates_unmatched += 1;
                debug!(phrase = candidate.phrase.as_str(), "Candidate matched no documents");
            }
        }
        Ok(())
    }

    async fn score(
        &self,
        stored: &BTreeSet<(String, DateTime<Utc>)>,
        stats: &mut RunStats,
    ) -> Result<()> {
        for (key, hour) in stored {
            if self.velocity.score(key, *hour).await?.is_some() {
                stats.buckets_scored += 1;
            }
            // A later bucket already on file was measured against the old count.
            let next = *hour + TimeDelta::hours(1);
            if !stored.contains(&(key.clone(), next))
                && self.velocity.score(key, next).await?.is_some()
            {
                stats.buckets_scored += 1;
            }
        }
        Ok(())
    }

    /// Fresh per run so the knowledge-base budget resets.
    fn build_canonicalizer(&self) -> Canonicalizer {
        let canonicalizer =
            Canonicalizer::new(self.deps.aliases.clone(), self.deps.config.canonicalizer.clone());
        match &self.deps.knowledge_base {
            Some(kb) => canonicalizer.with_knowledge_base(kb.clone()),
            None => canonicalizer,
        }
    }
}
