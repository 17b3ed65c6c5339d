//! tillcache maintenance CLI.
//!
//! A thin operator front-end over the cache library: ingest a JSON catalog
//! file, look up or search records, run an optimizer pass, or print
//! metrics. Results go to stdout as JSON; logging goes to stderr.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tillcache_core::{CacheConfig, ProductCache, ProductSnapshot};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "tillcache", about = "Adaptive offline product cache maintenance tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Ingest a JSON array of product snapshots from a file.
    Ingest {
        /// Path to a JSON file containing an array of product snapshots.
        file: PathBuf,
        /// Ingestion priority (1-5); higher resists eviction longer.
        #[arg(long, default_value_t = 1)]
        priority: u8,
    },
    /// Look up a single record by product id.
    Lookup { id: String },
    /// Relevance-ranked substring search over name, code, and category.
    Search {
        query: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Show the most eviction-resistant records.
    Top {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Run one eviction and priority-refresh pass.
    Optimize,
    /// Print a freshly computed metrics snapshot.
    Metrics,
    /// Remove every cached record and index entry.
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = CacheConfig::load().context("failed to load configuration")?;
    let cache = ProductCache::new(config);
    if let Err(e) = cache.initialize().await {
        tracing::warn!(error = %e, "cache initialization failed; commands will see an empty cache");
    }

    match cli.command {
        Command::Ingest { file, priority } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let snapshots: Vec<ProductSnapshot> = serde_json::from_str(&raw)
                .context("catalog file must be a JSON array of products")?;
            let applied = cache.ingest(&snapshots, priority).await?;
            print_json(&json!({ "applied": applied }))?;
        }
        Command::Lookup { id } => {
            let record = cache.lookup(&id).await?;
            print_json(&record)?;
        }
        Command::Search { query, limit } => {
            let results = cache.search(&query, limit).await?;
            print_json(&results)?;
        }
        Command::Top { limit } => {
            let results = cache.high_priority_records(limit).await?;
            print_json(&results)?;
        }
        Command::Optimize => {
            let report = cache.optimize().await?;
            print_json(&report)?;
        }
        Command::Metrics => {
            let metrics = cache.metrics().await?;
            print_json(&metrics)?;
        }
        Command::Clear => {
            let removed = cache.clear().await?;
            print_json(&json!({ "removed": removed }))?;
        }
    }

    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
