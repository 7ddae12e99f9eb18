use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Secrets and env-specific values. Tunables live in the TOML
/// [`PipelineConfig`].
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub anthropic_api_key: Option<String>,
    /// Path to the pipeline TOML, from `TRENDWIRE_CONFIG`.
    pub config_path: Option<PathBuf>,
    /// Overrides `canonicalizer.knowledge_base.enabled` when set.
    pub wikidata_enabled: Option<bool>,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: non_empty_var("DATABASE_URL"),
            anthropic_api_key: non_empty_var("ANTHROPIC_API_KEY"),
            config_path: non_empty_var("TRENDWIRE_CONFIG").map(PathBuf::from),
            wikidata_enabled: non_empty_var("WIKIDATA_ENABLED").map(|v| parse_flag(&v)),
        };

        config.log_redacted();
        config
    }

    pub fn require_database_url(&self) -> Result<&str> {
        self.database_url
            .as_deref()
            .context("DATABASE_URL environment variable is required")
    }

    pub fn require_anthropic_api_key(&self) -> Result<&str> {
        self.anthropic_api_key
            .as_deref()
            .context("ANTHROPIC_API_KEY environment variable is required")
    }

    /// Load the pipeline config from `TRENDWIRE_CONFIG` (or defaults) and
    /// apply env overrides.
    pub fn pipeline(&self) -> Result<PipelineConfig> {
        let mut pipeline = match &self.config_path {
            Some(path) => load_config(path)?,
            None => PipelineConfig::default(),
        };
        if let Some(enabled) = self.wikidata_enabled {
            pipeline.canonicalizer.knowledge_base.enabled = enabled;
        }
        Ok(pipeline)
    }

    fn log_redacted(&self) {
        fn preview_opt(val: &Option<String>) -> String {
            match val {
                Some(v) => {
                    let n = v.char_indices().nth(5).map(|(i, _)| i).unwrap_or(v.len());
                    format!("{}...({} chars)", &v[..n], v.len())
                }
                None => "<not set>".to_string(),
            }
        }

        tracing::info!("Config loaded:");
        tracing::info!("  DATABASE_URL: {}", preview_opt(&self.database_url));
        tracing::info!("  ANTHROPIC_API_KEY: {}", preview_opt(&self.anthropic_api_key));
        tracing::info!(
            "  TRENDWIRE_CONFIG: {}",
            self.config_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "<defaults>".to_string())
        );
        if let Some(enabled) = self.wikidata_enabled {
            tracing::info!("  WIKIDATA_ENABLED: {enabled}");
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_flag(v: &str) -> bool {
    matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

// =============================================================================
// Pipeline tunables (TOML)
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub extraction: ExtractionConfig,
    pub canonicalizer: CanonicalizerConfig,
    pub audit: AuditConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMode {
    /// Verb-centered event phrases; single words rejected.
    #[default]
    EventPhrases,
    /// Bare entity names allowed; no action-signal rule.
    Entities,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExtractionConfig {
    pub model: String,
    pub mode: ExtractionMode,
    pub batch_size: usize,
    pub body_char_limit: usize,
    pub concurrency: usize,
    pub call_timeout_secs: u64,
    /// No new batches start once this many seconds have elapsed.
    pub soft_deadline_secs: Option<u64>,
    /// Upper bound on documents pulled from the source per run.
    pub max_documents: usize,
    /// Claims older than this are handed out again; the claiming run is
    /// presumed dead. Must exceed the longest run.
    pub claim_ttl_secs: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            model: "claude-haiku-4-5-20251001".to_string(),
            mode: ExtractionMode::EventPhrases,
            batch_size: 15,
            body_char_limit: 500,
            concurrency: 3,
            call_timeout_secs: 30,
            soft_deadline_secs: None,
            max_documents: 500,
            claim_ttl_secs: 3600,
        }
    }
}

impl ExtractionConfig {
    /// Batch size clamped to the supported 10..=20 range.
    pub fn effective_batch_size(&self) -> usize {
        self.batch_size.clamp(10, 20)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CanonicalizerConfig {
    /// Maximum normalized edit distance accepted as a fuzzy match.
    pub fuzzy_threshold: f64,
    pub knowledge_base: KnowledgeBaseConfig,
}

impl Default for CanonicalizerConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: 0.3,
            knowledge_base: KnowledgeBaseConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KnowledgeBaseConfig {
    pub enabled: bool,
    pub max_lookups_per_run: u32,
    pub delay_ms: u64,
    pub confidence: f64,
}

impl Default for KnowledgeBaseConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_lookups_per_run: 10,
            delay_ms: 250,
            confidence: 0.85,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuditConfig {
    pub window_hours: i64,
    pub min_mentions: i64,
    pub max_trending: usize,
    pub near_duplicate_threshold: f64,
    pub evergreen_zscore_threshold: f64,
    pub sample_limit: usize,
    /// Extra evergreen names on top of the built-in list.
    pub evergreen_extra: Vec<String>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            window_hours: 24,
            min_mentions: 2,
            max_trending: 50,
            near_duplicate_threshold: 0.6,
            evergreen_zscore_threshold: 2.0,
            sample_limit: 15,
            evergreen_extra: Vec::new(),
        }
    }
}

/// Load and parse a pipeline TOML file. Missing sections and fields take
/// their defaults.
pub fn load_config(path: &Path) -> Result<PipelineConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config: PipelineConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
    Ok(config)
}
