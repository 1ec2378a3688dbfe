//! Runs the analysis pipeline on a local statement file and prints the
//! report as JSON.
//!
//! Usage: `analyze_file <path> [industry]`
//!
//! Narrative providers are configured from the same environment variables as
//! the server; no database is needed.

use anyhow::Context;
use sme_health_api::analysis::AnalysisEngine;
use sme_health_api::config::NarrativeConfig;
use sme_health_api::narrative::ProviderChain;
use std::path::Path;

const DEFAULT_INDUSTRY: &str = "General";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sme_health_api=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut args = std::env::args().skip(1);
    let path = args
        .next()
        .context("Usage: analyze_file <path> [industry]")?;
    let industry = args.next().unwrap_or_else(|| DEFAULT_INDUSTRY.to_string());

    let file_name = Path::new(&path)
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("Invalid file path: {}", path))?
        .to_string();
    let bytes = tokio::fs::read(&path)
        .await
        .with_context(|| format!("Failed to read {}", path))?;

    dotenvy::dotenv().ok();
    let config = NarrativeConfig::from_env()?;
    let engine = AnalysisEngine::new(ProviderChain::from_config(&config));

    let report = engine
        .analyze(&file_name, &bytes, &industry)
        .await
        .with_context(|| format!("Failed to analyze {}", file_name))?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
