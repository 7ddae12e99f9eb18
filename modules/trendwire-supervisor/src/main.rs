use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use trendwire_common::Config;
use trendwire_store::PgStore;
use trendwire_supervisor::{CheckStatus, QualityAuditor};

#[derive(Parser)]
#[command(name = "supervisor", about = "Audit the quality of the trending set")]
struct Cli {
    /// Override the audit window.
    #[arg(long)]
    window_hours: Option<i64>,

    /// Exit non-zero when any finding fails.
    #[arg(long)]
    strict: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("trendwire=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    info!("Trendwire supervisor starting...");

    let config = Config::from_env();
    let mut audit = config.pipeline()?.audit;
    if let Some(hours) = cli.window_hours {
        audit.window_hours = hours;
    }

    let store = PgStore::connect(config.require_database_url()?)
        .await
        .context("Failed to connect to Postgres")?;

    let auditor = QualityAuditor::new(Arc::new(store), audit);
    let report = auditor.audit().await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if cli.strict && report.count(CheckStatus::Fail) > 0 {
        anyhow::bail!("{} failing findings", report.count(CheckStatus::Fail));
    }
    Ok(())
}
