use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use trendwire_common::config::CanonicalizerConfig;
use trendwire_common::text::{collapse_whitespace, is_numeral, normalize_entity};
use trendwire_common::{CandidateKind, EntityAlias, EntityType, Resolution, ResolutionMethod};
use trendwire_store::{AliasStore, StoreError};

use crate::dictionary::EntityDictionary;
use crate::knowledge_base::KnowledgeBase;
use crate::lexicon::INVALID_ENTITY_SET;

const PASSTHROUGH_CONFIDENCE: f64 = 0.5;

/// Outcome of joining the background write set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub completed: u32,
    pub failed: u32,
}

struct KbGate {
    lookups: u32,
    last_call: Option<Instant>,
}

/// Resolves free-form strings to canonical entities.
///
/// Resolution order: validity gate, alias cache, fuzzy dictionary match,
/// knowledge base, passthrough. Cache write-backs and usage increments run
/// as background tasks; call [`Canonicalizer::finish`] before the run ends.
pub struct Canonicalizer {
    aliases: Arc<dyn AliasStore>,
    dictionary: EntityDictionary,
    kb: Option<Arc<dyn KnowledgeBase>>,
    kb_gate: tokio::sync::Mutex<KbGate>,
    config: CanonicalizerConfig,
    writes: Mutex<JoinSet<Result<(), StoreError>>>,
    kb_lookups: AtomicU32,
    kb_failures: AtomicU32,
}

impl Canonicalizer {
    pub fn new(aliases: Arc<dyn AliasStore>, config: CanonicalizerConfig) -> Self {
        Self {
            aliases,
            dictionary: EntityDictionary::default(),
            kb: None,
            kb_gate: tokio::sync::Mutex::new(KbGate {
                lookups: 0,
                last_call: None,
            }),
            config,
            writes: Mutex::new(JoinSet::new()),
            kb_lookups: AtomicU32::new(0),
            kb_failures: AtomicU32::new(0),
        }
    }

    pub fn with_dictionary(mut self, dictionary: EntityDictionary) -> Self {
        self.dictionary = dictionary;
        self
    }

    /// Attach a knowledge base. Only consulted when enabled in config.
    pub fn with_knowledge_base(mut self, kb: Arc<dyn KnowledgeBase>) -> Self {
        self.kb = Some(kb);
        self
    }

    pub fn kb_lookups(&self) -> u32 {
        self.kb_lookups.load(Ordering::Relaxed)
    }

    pub fn kb_failures(&self) -> u32 {
        self.kb_failures.load(Ordering::Relaxed)
    }

    /// Resolve one string. `kind` gates the knowledge-base step: only entity
    /// kinds are looked up. Only alias-store read failures are returned as
    /// errors; everything else degrades.
    pub async fn resolve(
        &self,
        raw: &str,
        kind: Option<CandidateKind>,
    ) -> Result<Resolution, StoreError> {
        let key = normalize_entity(raw);

        if is_invalid(&key) {
            debug!(raw, "Invalid entity");
            return Ok(Resolution {
                canonical: collapse_whitespace(raw.trim()),
                entity_type: EntityType::Unknown,
                method: ResolutionMethod::Invalid,
                confidence: 0.0,
            });
        }

        // 1. Cache
        if let Some(alias) = self.aliases.lookup(&key).await? {
            let store = self.aliases.clone();
            let usage_key = key.clone();
            self.spawn_write(async move { store.increment_usage(&usage_key).await });
            return Ok(Resolution {
                canonical: alias.canonical_name,
                entity_type: alias.entity_type,
                method: ResolutionMethod::Cache,
                confidence: alias.confidence_score,
            });
        }

        // 2. Fuzzy dictionary
        if let Some(hit) = self.dictionary.best_match(&key) {
            if hit.distance < self.config.fuzzy_threshold {
                let confidence = (1.0 - hit.distance).clamp(0.0, 1.0);
                self.write_back(EntityAlias::new(
                    key.clone(),
                    hit.canonical.clone(),
                    hit.entity_type,
                    ResolutionMethod::Fuzzy,
                    confidence,
                ));
                return Ok(Resolution {
                    canonical: hit.canonical,
                    entity_type: hit.entity_type,
                    method: ResolutionMethod::Fuzzy,
                    confidence,
                });
            }
        }

        // 3. Knowledge base
        if kind.is_some_and(|k| k.is_entity()) {
            if let Some(resolution) = self.knowledge_base(raw, &key).await {
                return Ok(resolution);
            }
        }

        // 4. Passthrough
        Ok(Resolution {
            canonical: collapse_whitespace(raw.trim()),
            entity_type: EntityType::Unknown,
            method: ResolutionMethod::Passthrough,
            confidence: PASSTHROUGH_CONFIDENCE,
        })
    }

    /// Serialized, rate-limited, capped per run. `None` means fall through.
    async fn knowledge_base(&self, raw: &str, key: &str) -> Option<Resolution> {
        let settings = &self.config.knowledge_base;
        if !settings.enabled {
            return None;
        }
        let kb = self.kb.as_ref()?;

        let mut gate = self.kb_gate.lock().await;
        if gate.lookups >= settings.max_lookups_per_run {
            debug!(raw, "Knowledge base budget exhausted");
            return None;
        }
        if let Some(last) = gate.last_call {
            let delay = Duration::from_millis(settings.delay_ms);
            tokio::time::sleep_until(last + delay).await;
        }
        gate.lookups += 1;
        self.kb_lookups.fetch_add(1, Ordering::Relaxed);

        let result = kb.lookup(raw.trim()).await;
        gate.last_call = Some(Instant::now());
        drop(gate);

        match result {
            Ok(Some(entry)) => {
                let entity_type = entry.entity_type();
                let confidence = settings.confidence.clamp(0.0, 1.0);
                self.write_back(EntityAlias::new(
                    key,
                    entry.label.clone(),
                    entity_type,
                    ResolutionMethod::KnowledgeBase,
                    confidence,
                ));
                Some(Resolution {
                    canonical: entry.label,
                    entity_type,
                    method: ResolutionMethod::KnowledgeBase,
                    confidence,
                })
            }
            Ok(None) => None,
            Err(e) => {
                self.kb_failures.fetch_add(1, Ordering::Relaxed);
                warn!(entity = raw, error = %e, "Knowledge base lookup failed, passing through");
                None
            }
        }
    }

    fn write_back(&self, alias: EntityAlias) {
        let store = self.aliases.clone();
        self.spawn_write(async move { store.upsert(&alias).await.map(|_| ()) });
    }

    fn spawn_write<F>(&self, fut: F)
    where
        F: std::future::Future<Output = Result<(), StoreError>> + Send + 'static,
    {
        match self.writes.lock() {
            Ok(mut set) => {
                set.spawn(fut);
            }
            Err(_) => warn!("Write set lock poisoned, dropping alias write"),
        }
    }

    /// Join every outstanding background write. Failures are logged and
    /// counted, not retried.
    pub async fn finish(&self) -> WriteSummary {
        let mut set = match self.writes.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(_) => return WriteSummary::default(),
        };

        let mut summary = WriteSummary::default();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Ok(())) => summary.completed += 1,
                Ok(Err(e)) => {
                    summary.failed += 1;
                    warn!(error = %e, "Alias cache write failed");
                }
                Err(e) => {
                    summary.failed += 1;
                    warn!(error = %e, "Alias cache write task panicked");
                }
            }
        }
        if summary.completed + summary.failed > 0 {
            info!(
                completed = summary.completed,
                failed = summary.failed,
                "Alias cache writes joined"
            );
        }
        summary
    }
}

/// Too short, a bare number, or a calendar/news filler word.
fn is_invalid(key: &str) -> bool {
    key.chars().count() < 2 || is_numeral(key) || INVALID_ENTITY_SET.contains(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockKnowledgeBase;
    use trendwire_common::config::KnowledgeBaseConfig;
    use trendwire_store::MemoryAliasStore;

    fn config(kb_enabled: bool) -> CanonicalizerConfig {
        CanonicalizerConfig {
            fuzzy_threshold: 0.3,
            knowledge_base: KnowledgeBaseConfig {
                enabled: kb_enabled,
                max_lookups_per_run: 2,
                delay_ms: 10,
                confidence: 0.85,
            },
        }
    }

    #[tokio::test]
    async fn invalid_inputs_stop_early() {
        let canon = Canonicalizer::new(Arc::new(MemoryAliasStore::new()), config(false));
        for raw in ["2024", "x", "Monday", "#News", "1,000"] {
            let r = canon.resolve(raw, None).await.unwrap();
            assert_eq!(r.method, ResolutionMethod::Invalid, "{raw}");
            assert_eq!(r.confidence, 0.0);
        }
    }

    #[tokio::test]
    async fn cache_beats_fuzzy_and_is_returned_unchanged() {
        let store = Arc::new(MemoryAliasStore::new().with_alias(EntityAlias::new(
            "netanyahoo",
            "Bibi",
            EntityType::Person,
            ResolutionMethod::Fuzzy,
            0.95,
        )));
        let canon = Canonicalizer::new(store.clone(), config(false));

        let r = canon.resolve("Netanyahoo", None).await.unwrap();
        assert_eq!(r.method, ResolutionMethod::Cache);
        assert_eq!(r.canonical, "Bibi");
        assert_eq!(r.confidence, 0.95);

        let summary = canon.finish().await;
        assert_eq!(summary.completed, 1);
        assert_eq!(store.get("netanyahoo").unwrap().usage_count, 1);
    }

    #[tokio::test]
    async fn fuzzy_match_is_written_back() {
        let store = Arc::new(MemoryAliasStore::new());
        let canon = Canonicalizer::new(store.clone(), config(false));

        let r = canon.resolve("#Zelenskyy", None).await.unwrap();
        assert_eq!(r.method, ResolutionMethod::Fuzzy);
        assert_eq!(r.canonical, "Volodymyr Zelensky");
        assert_eq!(r.entity_type, EntityType::Person);
        assert_eq!(r.confidence, 1.0);

        canon.finish().await;
        let alias = store.get("zelenskyy").unwrap();
        assert_eq!(alias.resolution_method, ResolutionMethod::Fuzzy);

        // second resolve now hits the cache
        let again = canon.resolve("zelenskyy", None).await.unwrap();
        assert_eq!(again.method, ResolutionMethod::Cache);
    }

    #[tokio::test]
    async fn passthrough_keeps_original_and_is_not_cached() {
        let store = Arc::new(MemoryAliasStore::new());
        let canon = Canonicalizer::new(store.clone(), config(false));

        let r = canon
            .resolve("  Senate Passes Border Bill ", Some(CandidateKind::EventPhrase))
            .await
            .unwrap();
        assert_eq!(r.method, ResolutionMethod::Passthrough);
        assert_eq!(r.canonical, "Senate Passes Border Bill");
        assert_eq!(r.confidence, 0.5);

        canon.finish().await;
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn knowledge_base_only_for_entities_and_capped() {
        let kb = Arc::new(
            MockKnowledgeBase::new()
                .on_name("Acme Robotics", "Acme Robotics Inc.", "American robotics company"),
        );
        let store = Arc::new(MemoryAliasStore::new());
        let canon = Canonicalizer::new(store.clone(), config(true)).with_knowledge_base(kb.clone());

        // event phrases never reach the knowledge base
        let r = canon.resolve("Acme Robotics", Some(CandidateKind::EventPhrase)).await.unwrap();
        assert_eq!(r.method, ResolutionMethod::Passthrough);
        assert_eq!(kb.calls(), 0);

        let r = canon.resolve("Acme Robotics", Some(CandidateKind::Org)).await.unwrap();
        assert_eq!(r.method, ResolutionMethod::KnowledgeBase);
        assert_eq!(r.canonical, "Acme Robotics Inc.");
        assert_eq!(r.entity_type, EntityType::Organization);
        assert_eq!(r.confidence, 0.85);

        canon.resolve("Unknown Thing One", Some(CandidateKind::Org)).await.unwrap();
        canon.resolve("Unknown Thing Two", Some(CandidateKind::Org)).await.unwrap();
        assert_eq!(kb.calls(), 2);
        assert_eq!(canon.kb_lookups(), 2);

        canon.finish().await;
        assert_eq!(
            store.get("acme robotics").unwrap().resolution_method,
            ResolutionMethod::KnowledgeBase
        );
    }

    #[tokio::test]
    async fn knowledge_base_failure_degrades_to_passthrough() {
        let kb = Arc::new(MockKnowledgeBase::new().failing());
        let canon = Canonicalizer::new(Arc::new(MemoryAliasStore::new()), config(true))
            .with_knowledge_base(kb);

        let r = canon.resolve("Acme Robotics", Some(CandidateKind::Org)).await.unwrap();
        assert_eq!(r.method, ResolutionMethod::Passthrough);
        assert_eq!(canon.kb_failures(), 1);
    }

    #[tokio::test]
    async fn disabled_knowledge_base_is_never_called() {
        let kb = Arc::new(MockKnowledgeBase::new());
        let canon = Canonicalizer::new(Arc::new(MemoryAliasStore::new()), config(false))
            .with_knowledge_base(kb.clone());

        canon.resolve("Acme Robotics", Some(CandidateKind::Org)).await.unwrap();
        assert_eq!(kb.calls(), 0);
    }
}
