//! boostindex CLI — inspect and manage a Boost PoW index database.
//!
//! # Commands
//! ```bash
//! boostindex status  --db boost.db
//! boostindex job     <txid> <vout> --db boost.db
//! boostindex jobs    --content <txid> --spent false --limit 20 --db boost.db
//! boostindex content <txid> --db boost.db
//! boostindex ingest  events.jsonl --db boost.db --config boostindex.json
//! boostindex reset   --db boost.db
//! boostindex info
//! ```
//!
//! `--db` falls back to `BOOSTINDEX_DB`, then to `db` in the config file.

mod file_feed;
mod logging;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

use boostindex_bsv::IndexerBuilder;
use boostindex_core::checkpoint::CheckpointStore;
use boostindex_core::indexer::IndexerConfig;
use boostindex_core::store::{IndexQuery, IndexStore};
use boostindex_core::types::JobFilter;
use boostindex_storage::SqliteStorage;

use crate::file_feed::FileFeed;
use crate::logging::{init_tracing, LogConfig};

#[derive(Parser)]
#[command(
    name = "boostindex",
    about = "Reorg-safe Boost PoW indexer for Bitcoin SV",
    long_about = "
Inspect and manage a Boost PoW index database, or index a recorded
chain event stream into it.

ENVIRONMENT VARIABLES:
  BOOSTINDEX_DB   Index database path (when --db is not given)
  RUST_LOG        Log filter, overrides the config file
",
    version
)]
struct Cli {
    /// SQLite index database
    #[arg(long, global = true, env = "BOOSTINDEX_DB")]
    db: Option<String>,

    /// JSON config file (`db`, `indexer`, `log`)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show cursor and row counts
    Status,

    /// Show one job and the proofs spending it
    Job {
        /// Job transaction id
        txid: String,
        /// Job output index
        vout: u32,
    },

    /// List jobs
    Jobs {
        /// Only jobs targeting this content txid
        #[arg(long)]
        content: Option<String>,
        #[arg(long)]
        category: Option<u32>,
        /// Tag, hex encoded
        #[arg(long)]
        tag: Option<String>,
        /// Only spent (`true`) or unspent (`false`) jobs
        #[arg(long)]
        spent: Option<bool>,
        #[arg(long, default_value_t = 100)]
        limit: usize,
    },

    /// Show a content row with its jobs and proofs
    Content {
        /// Content transaction id
        txid: String,
    },

    /// Index a recorded chain event stream (one JSON event per line)
    Ingest {
        /// Path to the .jsonl recording
        events: PathBuf,
    },

    /// Delete the cursor and every indexed row
    Reset,

    /// Show default configuration
    Info,
}

/// Contents of the optional `--config` JSON file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct CliConfig {
    db: Option<String>,
    indexer: IndexerConfig,
    log: LogConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Info = cli.command {
        cmd_info();
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => CliConfig::default(),
    };
    init_tracing(&config.log);

    let db = resolve_db(cli.db, &config)?;
    let store = Arc::new(SqliteStorage::open(&db).await.with_context(|| format!("opening {db}"))?);

    match cli.command {
        Commands::Status => cmd_status(&store, &config.indexer).await,
        Commands::Job { txid, vout } => cmd_job(&store, &txid, vout).await,
        Commands::Jobs {
            content,
            category,
            tag,
            spent,
            limit,
        } => {
            let filter = JobFilter {
                content,
                category,
                tag,
                spent,
                limit: Some(limit),
            };
            cmd_jobs(&store, &filter).await
        }
        Commands::Content { txid } => cmd_content(&store, &txid).await,
        Commands::Ingest { events } => cmd_ingest(store, config.indexer, &events).await,
        Commands::Reset => cmd_reset(&store, &config.indexer).await,
        Commands::Info => Ok(()),
    }
}

/// `--db` / `BOOSTINDEX_DB` first, then the config file.
fn resolve_db(flag: Option<String>, config: &CliConfig) -> anyhow::Result<String> {
    flag.or_else(|| config.db.clone())
        .ok_or_else(|| anyhow!("no database: pass --db <path> or set BOOSTINDEX_DB"))
}

fn cmd_info() {
    let cfg = IndexerConfig::default();
    println!("Boostindex v{}", env!("CARGO_PKG_VERSION"));
    println!("  Chain: {} (indexer id \"{}\")", cfg.chain, cfg.id);
    println!("  Default start height: {}", cfg.start_height);
    println!("  Reorg tracker window: {} blocks", cfg.tracker_window);
    println!("  Checkpoint interval: every {} block(s)", cfg.checkpoint_interval);
    println!("  Invalidation policy: {:?}", cfg.invalidation);
    println!(
        "  Storage retries: {} (backoff {}..{} ms)",
        cfg.retry.max_retries, cfg.retry.initial_backoff_ms, cfg.retry.max_backoff_ms
    );
    println!("  Storage backends: memory, SQLite");
}

// ─── Database commands ────────────────────────────────────────────────────────

fn load_config(path: &Path) -> anyhow::Result<CliConfig> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn cmd_status(store: &SqliteStorage, cfg: &IndexerConfig) -> anyhow::Result<()> {
    let checkpoint = store.load(&cfg.chain, &cfg.id).await?;
    let stats = store.stats().await?;
    let updated = checkpoint
        .as_ref()
        .and_then(|cp| chrono::DateTime::from_timestamp(cp.updated_at, 0))
        .map(|t| t.to_rfc3339());
    print_json(&serde_json::json!({
        "chain": cfg.chain,
        "indexer": cfg.id,
        "cursor": checkpoint.as_ref().map(|cp| cp.cursor()),
        "checkpoint_updated": updated,
        "stats": stats,
    }))
}

async fn cmd_job(store: &SqliteStorage, txid: &str, vout: u32) -> anyhow::Result<()> {
    let job = store
        .get_job(txid, vout)
        .await?
        .ok_or_else(|| anyhow!("job {txid}:{vout} not found"))?;
    let proofs = store.proofs_for_job(txid, vout).await?;
    print_json(&serde_json::json!({ "job": job, "proofs": proofs }))
}

async fn cmd_jobs(store: &SqliteStorage, filter: &JobFilter) -> anyhow::Result<()> {
    let total = store.count_jobs(filter).await?;
    let jobs = store.list_jobs(filter).await?;
    print_json(&serde_json::json!({ "total": total, "jobs": jobs }))
}

async fn cmd_content(store: &SqliteStorage, txid: &str) -> anyhow::Result<()> {
    let view = store
        .content_view(txid)
        .await?
        .ok_or_else(|| anyhow!("content {txid} not found"))?;
    print_json(&view)
}

async fn cmd_ingest(store: Arc<SqliteStorage>, cfg: IndexerConfig, path: &Path) -> anyhow::Result<()> {
    let feed = FileFeed::load(path)?;
    tracing::info!(events = feed.len(), file = %path.display(), "ingesting recorded events");

    let store: Arc<dyn IndexStore> = store;
    let mut index_loop = IndexerBuilder::from_config(cfg).build(store, feed);
    index_loop.run().await?;

    print_json(&serde_json::json!({
        "cursor": index_loop.cursor(),
        "state": index_loop.state().to_string(),
        "stats": index_loop.stats(),
        "replays_requested": index_loop.feed().replays,
    }))
}

async fn cmd_reset(store: &SqliteStorage, cfg: &IndexerConfig) -> anyhow::Result<()> {
    store.delete(&cfg.chain, &cfg.id).await?;
    store.clear().await?;
    println!("reset {}/{}: cursor and index rows deleted", cfg.chain, cfg.id);
    Ok(())
}
