//! varanno - Variant effect annotation tool

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use tracing::info;
use varanno_annotate::{
    AnnotationClient, AnnotatorConfig, EnrichmentJob, JsonFileStore, VariantFormat, VariantQuery,
};
use varanno_common::logging::{init_logging, LogConfig, LogLevel};

#[derive(Parser, Debug)]
#[command(name = "varanno")]
#[command(author, version, about = "Variant effect annotation tool")]
#[command(arg_required_else_help = true)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Classify variant strings and print their canonical keys
    Detect {
        #[arg(required = true)]
        variants: Vec<String>,
    },

    /// Annotate variants and print the results as JSON
    Annotate {
        #[arg(required = true)]
        variants: Vec<String>,
    },

    /// Annotate every variant in a file, saving results to a store
    Enrich {
        /// File with one variant per line ('#' starts a comment)
        #[arg(short, long)]
        input: PathBuf,

        /// JSON store of annotation results
        #[arg(short, long, default_value = "./varanno-store.json")]
        store: PathBuf,

        /// Maximum number of variants to attempt
        #[arg(short, long)]
        limit: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // Environment variables take precedence over flags
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("varanno")
        .build()
        .merge_env()?;

    let _guard = init_logging(&log_config)?;

    match cli.command {
        Command::Detect { variants } => detect(&variants),
        Command::Annotate { variants } => annotate(&variants).await,
        Command::Enrich {
            input,
            store,
            limit,
        } => enrich(&input, &store, limit).await,
    }
}

fn detect(variants: &[String]) -> Result<()> {
    for raw in variants {
        let query = VariantQuery::parse(raw);
        match query.canonical_key() {
            Some(key) => println!("{}\t{}\t{}", raw, query.format(), key),
            None => println!("{}\t{}", raw, VariantFormat::Invalid),
        }
    }
    Ok(())
}

async fn annotate(variants: &[String]) -> Result<()> {
    let config = AnnotatorConfig::load()?;
    let client = AnnotationClient::from_config(&config)?;

    let results = client.annotate_many(variants).await;
    let mut failed = 0usize;

    let output: Vec<serde_json::Value> = variants
        .iter()
        .zip(results)
        .map(|(raw, outcome)| match outcome {
            Ok(result) => json!({
                "variant": raw,
                "damaging": result.impact.is_damaging(),
                "result": result,
            }),
            Err(e) => {
                failed += 1;
                json!({ "variant": raw, "error": { "kind": e.kind(), "message": e.to_string() } })
            },
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&output)?);

    if failed > 0 {
        anyhow::bail!("{} of {} variants could not be annotated", failed, variants.len());
    }
    Ok(())
}

async fn enrich(input: &Path, store_path: &Path, limit: Option<usize>) -> Result<()> {
    let config = AnnotatorConfig::load()?;

    let content = tokio::fs::read_to_string(input)
        .await
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let variants = read_variant_lines(&content);

    let store = JsonFileStore::open(store_path)
        .await
        .with_context(|| format!("Failed to open store {}", store_path.display()))?;

    info!(
        input = %input.display(),
        store = %store_path.display(),
        variants = variants.len(),
        "Starting enrichment"
    );

    let progress = ProgressBar::new(variants.len() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta})")?
            .progress_chars("#>-"),
    );
    progress.set_message("Annotating variants");

    let client = AnnotationClient::from_config(&config)?;
    let bar = progress.clone();
    let job = EnrichmentJob::new(client, Arc::new(store))
        .with_retry_policy(config.retry_policy())
        .with_concurrency(config.enrich_concurrency)
        .on_progress(move |_| bar.inc(1));

    let stats = job.enrich(&variants, limit).await;
    progress.finish_and_clear();

    println!("{}", serde_json::to_string_pretty(&stats)?);

    if let Some(e) = &stats.store_error {
        anyhow::bail!("Results could not be written to {}: {}", store_path.display(), e);
    }
    Ok(())
}

fn read_variant_lines(content: &str) -> Vec<&str> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect()
}
