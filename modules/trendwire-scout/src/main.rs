use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{TimeDelta, Utc};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ai_client::Claude;
use trendwire_common::{Config, PipelineConfig, RawDocument};
use trendwire_scout::extractor::{ExtractionProfile, LlmTopicExtractor};
use trendwire_scout::knowledge_base::KnowledgeBase;
use trendwire_scout::{ScoutDeps, TrendScout};
use trendwire_store::{
    MemoryAliasStore, MemoryDocumentSource, MemoryTrendStore, PgStore, TrendStore,
};
use wikidata_client::WikidataClient;

#[derive(Parser)]
#[command(name = "scout", about = "Extract trending topics from pending documents")]
struct Cli {
    /// JSONL file of documents. Ingested as pending before the run.
    #[arg(long)]
    input: Option<PathBuf>,

    /// Run against in-memory stores seeded from --input; nothing is persisted.
    #[arg(long, requires = "input")]
    dry_run: bool,

    /// Apply database migrations and exit.
    #[arg(long)]
    migrate: bool,

    /// Print the top N trending topics after the run.
    #[arg(long)]
    print_trending: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("trendwire=info".parse()?))
        .init();

    let cli = Cli::parse();
    info!("Trendwire scout starting...");

    let config = Config::from_env();
    let pipeline = config.pipeline()?;

    if cli.dry_run {
        let docs = match &cli.input {
            Some(path) => read_documents(path)?,
            None => Vec::new(),
        };
        let trends = Arc::new(MemoryTrendStore::new());
        let deps = ScoutDeps::builder()
            .documents(Arc::new(MemoryDocumentSource::new(docs)))
            .trends(trends.clone())
            .aliases(Arc::new(MemoryAliasStore::new()))
            .extractor(build_extractor(&config, &pipeline)?)
            .knowledge_base(build_knowledge_base(&pipeline))
            .config(pipeline.clone())
            .build();

        let stats = TrendScout::new(deps).run().await?;
        println!("{stats}");
        if let Some(limit) = cli.print_trending {
            print_trending(trends.as_ref(), &pipeline, limit).await?;
        }
        return Ok(());
    }

    let store = PgStore::connect(config.require_database_url()?)
        .await
        .context("Failed to connect to Postgres")?;
    store.migrate().await.context("Failed to run migrations")?;
    if cli.migrate {
        info!("Migrations applied");
        return Ok(());
    }

    if let Some(path) = &cli.input {
        let docs = read_documents(path)?;
        let inserted = store.ingest(&docs).await?;
        info!(read = docs.len(), inserted, "Ingested documents");
    }

    let store = Arc::new(store);
    let deps = ScoutDeps::builder()
        .documents(store.clone())
        .trends(store.clone())
        .aliases(store.clone())
        .extractor(build_extractor(&config, &pipeline)?)
        .knowledge_base(build_knowledge_base(&pipeline))
        .config(pipeline.clone())
        .build();

    let stats = TrendScout::new(deps).run().await?;
    println!("{stats}");
    if let Some(limit) = cli.print_trending {
        print_trending(store.as_ref(), &pipeline, limit).await?;
    }
    Ok(())
}

fn build_extractor(
    config: &Config,
    pipeline: &PipelineConfig,
) -> Result<Arc<LlmTopicExtractor>> {
    let extraction = &pipeline.extraction;
    let claude = Claude::new(config.require_anthropic_api_key()?, extraction.model.as_str())
        .with_timeout(Duration::from_secs(extraction.call_timeout_secs));
    Ok(Arc::new(LlmTopicExtractor::new(
        Arc::new(claude),
        extraction.model.as_str(),
        ExtractionProfile::for_mode(extraction.mode),
        extraction.body_char_limit,
    )))
}

fn build_knowledge_base(pipeline: &PipelineConfig) -> Option<Arc<dyn KnowledgeBase>> {
    if pipeline.canonicalizer.knowledge_base.enabled {
        info!("Wikidata lookups enabled");
        Some(Arc::new(WikidataClient::new()))
    } else {
        None
    }
}

fn read_documents(path: &Path) -> Result<Vec<RawDocument>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let mut docs = Vec::new();
    for (lineno, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<RawDocument>(line) {
            Ok(doc) => docs.push(doc),
            Err(e) => warn!(line = lineno + 1, error = %e, "Skipping malformed document"),
        }
    }
    Ok(docs)
}

async fn print_trending(store: &dyn TrendStore, pipeline: &PipelineConfig, limit: usize) -> Result<()> {
    let since = Utc::now() - TimeDelta::hours(pipeline.audit.window_hours);
    let trending = store
        .trending(since, pipeline.audit.min_mentions, limit)
        .await?;
    println!("\n=== Trending ===");
    for (rank, bucket) in trending.iter().enumerate() {
        println!(
            "{:>3}. {:<40} mentions={:<4} velocity={:>7.1} z={:>5.2} sources={}",
            rank + 1,
            bucket.label,
            bucket.mention_count,
            bucket.velocity_score,
            bucket.velocity_zscore,
            bucket.source_count()
        );
    }
    Ok(())
}
