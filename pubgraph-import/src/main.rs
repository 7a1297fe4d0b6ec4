//! pubgraph bulk importer
//!
//! Reads a JSON manifest of fields and Pubs and writes it into a store in
//! one atomic batch.
//!
//! Usage:
//!   pubgraph-import --db pubs.db --manifest import.json
//!
//! Either every Pub in the manifest is written or none is.

use anyhow::{Context, Result};
use clap::Parser;
use pubgraph_import::{Manifest, run_import};
use pubgraph_ops::EngineConfig;
use pubgraph_storage::PubStore;
use std::path::PathBuf;
use tracing::{Level, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "pubgraph-import")]
#[command(about = "Import Pubs and their relations from a JSON manifest")]
struct Args {
    /// SQLite database file; created if missing
    #[arg(short, long, default_value = "pubgraph.db")]
    db: PathBuf,

    /// Manifest to import
    #[arg(short, long)]
    manifest: PathBuf,

    /// Engine configuration (JSON); defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Batch items prepared concurrently; overrides the config file
    #[arg(long)]
    concurrency: Option<usize>,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let mut config = load_config(args.config.as_ref())?;
    if let Some(concurrency) = args.concurrency {
        config.batch_concurrency = concurrency;
    }

    let manifest = Manifest::from_path(&args.manifest)
        .with_context(|| format!("Failed to load manifest {:?}", args.manifest))?;
    let store = PubStore::open(&args.db)
        .with_context(|| format!("Failed to open store {:?}", args.db))?;
    info!(
        "Importing {} pubs into {:?} (concurrency {})",
        manifest.pubs.len(),
        args.db,
        config.batch_concurrency
    );

    let report = run_import(&store, &manifest, &config)
        .await
        .context("Import failed")?;

    println!("Fields created: {}", report.fields_created);
    println!("Pubs written:   {} ({} new)", report.pubs.len(), report.pubs_created);
    for (key, id) in &report.pubs {
        println!("  {key} -> {id}");
    }
    Ok(())
}

/// `RUST_LOG` wins when set; otherwise `--verbose` picks DEBUG over INFO.
fn init_logging(verbose: bool) {
    let builder = FmtSubscriber::builder().with_target(false).compact();
    match EnvFilter::try_from_default_env() {
        Ok(filter) => builder.with_env_filter(filter).init(),
        Err(_) => {
            let level = if verbose { Level::DEBUG } else { Level::INFO };
            builder.with_max_level(level).init();
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<EngineConfig> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {:?}", path))?;
    serde_json::from_str(&raw).context("Failed to parse engine config")
}
