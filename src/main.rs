//! # Photo Curator CLI (`pcur`)
//!
//! The `pcur` binary is the operator interface for the curation engine. It
//! provides commands for store initialization, embedding import, one-shot
//! consensus curation, and starting the HTTP API.
//!
//! ## Usage
//!
//! ```bash
//! pcur --config ./config/pcur.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `pcur init` | Create the SQLite schema for every configured store |
//! | `pcur import <file>` | Load image embeddings from a JSONL file |
//! | `pcur stats` | Show image count and dimensionality of a store |
//! | `pcur curate` | Run consensus curation and print the ranked selection |
//! | `pcur serve` | Start the curation HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the stores
//! pcur init --config ./config/pcur.toml
//!
//! # Import embeddings produced by the model service
//! pcur import embeddings.jsonl --config ./config/pcur.toml
//!
//! # Pick 50 representatives with 10-iteration FPS consensus
//! pcur curate --target 50 --iterations 10 --method fps
//!
//! # Re-run around a locked set, and see what would graduate at 80%
//! pcur curate --target 20 --exclude 3,17,41 --lock-threshold 80
//!
//! # Start the HTTP API for the gallery frontend
//! pcur serve --config ./config/pcur.toml
//! ```

mod config;
mod consensus;
mod db;
mod jobs;
mod migrate;
mod models;
mod progress;
mod selector;
mod server;
mod session;
mod store;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::DEFAULT_STORE;
use crate::consensus::CurationPlan;
use crate::models::SelectionMethod;
use crate::progress::ProgressMode;
use crate::session::CurationSession;
use crate::store::EmbeddingStore;

/// Photo Curator CLI: consensus-based dataset curation over image
/// embedding collections.
#[derive(Parser)]
#[command(
    name = "pcur",
    about = "Photo Curator: consensus-based dataset curation for photo embedding collections",
    version,
    long_about = "Photo Curator selects a representative subset of a photo collection from its \
    image embeddings, running randomized FPS or K-Means selection across many seeded iterations \
    and ranking items by how often they are chosen. Operators can lock high-confidence items and \
    re-run curation on the remainder."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/pcur.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema for every configured store.
    ///
    /// Idempotent; running it multiple times is safe.
    Init,

    /// Import image embeddings from a JSONL file.
    ///
    /// Each line is `{"filename", "subfolder", "filepath", "embedding"}`.
    /// Replaces the store's current contents; indices are assigned in file
    /// order starting at 0. All embeddings must share one dimensionality.
    Import {
        /// Path to the JSONL file.
        file: PathBuf,

        /// Store to import into.
        #[arg(long, default_value = DEFAULT_STORE)]
        store: String,
    },

    /// Show image count and dimensionality of a store.
    Stats {
        /// Store to inspect.
        #[arg(long, default_value = DEFAULT_STORE)]
        store: String,
    },

    /// Run consensus curation and print the ranked selection.
    ///
    /// Runs the selector across seeded iterations, prints the winning
    /// indices (highest consensus frequency first) and the full frequency
    /// table for every item chosen at least once.
    Curate {
        /// Number of images to select.
        #[arg(long)]
        target: usize,

        /// Consensus iterations (clamped to the configured maximum).
        #[arg(long)]
        iterations: Option<u32>,

        /// Selection method: `fps` or `kmeans`.
        #[arg(long, default_value = "fps")]
        method: String,

        /// Item indices to exclude (the current lock set).
        #[arg(long, value_delimiter = ',')]
        exclude: Vec<usize>,

        /// Report which items a lock-by-threshold at this percentage would
        /// graduate out of further contention.
        #[arg(long)]
        lock_threshold: Option<f64>,

        /// Store to curate.
        #[arg(long, default_value = DEFAULT_STORE)]
        store: String,

        /// Progress output: `off`, `human`, or `json` (default: human when
        /// stderr is a TTY).
        #[arg(long)]
        progress: Option<String>,
    },

    /// Start the curation HTTP server.
    ///
    /// Binds to the address configured in `[server].bind` and serves the
    /// JSON API used by the gallery frontend.
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Stores initialized successfully.");
        }
        Commands::Import { file, store } => {
            store::run_import(&cfg, &store, &file).await?;
        }
        Commands::Stats { store } => {
            store::run_stats(&cfg, &store).await?;
        }
        Commands::Curate {
            target,
            iterations,
            method,
            exclude,
            lock_threshold,
            store,
            progress,
        } => {
            run_curate(
                &cfg,
                &store,
                target,
                iterations,
                &method,
                exclude,
                lock_threshold,
                progress,
            )
            .await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn run_curate(
    cfg: &config::Config,
    store_name: &str,
    target: usize,
    iterations: Option<u32>,
    method: &str,
    exclude: Vec<usize>,
    lock_threshold: Option<f64>,
    progress: Option<String>,
) -> Result<()> {
    if target == 0 {
        anyhow::bail!("--target must be > 0");
    }
    let method: SelectionMethod = method.parse()?;
    let iterations = iterations
        .unwrap_or(cfg.curation.default_iterations)
        .min(cfg.curation.max_iterations);

    let mode = match progress.as_deref() {
        None => ProgressMode::default_for_tty(),
        Some("off") => ProgressMode::Off,
        Some("human") => ProgressMode::Human,
        Some("json") => ProgressMode::Json,
        Some(other) => anyhow::bail!("Unknown progress mode: {}. Use off, human, or json.", other),
    };
    let reporter = mode.reporter();

    let pool = db::connect(cfg, store_name).await?;
    let snapshot = store::load_store(&pool).await?;
    pool.close().await;

    if snapshot.is_empty() {
        anyhow::bail!("Store '{}' is empty. Run `pcur import` first.", store_name);
    }

    let mut session = CurationSession::from_locked(exclude);
    let mut plan = CurationPlan::new(target, iterations, method);
    plan.kmeans_max_iter = cfg.curation.kmeans_max_iter;

    let outcome = consensus::curate(&snapshot, session.excluded(), &plan, reporter.as_ref(), None)?;

    println!(
        "curate {}: {} of {} images over {} iterations",
        method.as_str(),
        outcome.count,
        snapshot.len(),
        outcome.iterations
    );
    if outcome.count < outcome.target_count {
        println!(
            "  (candidate pool smaller than target {}; clipped)",
            outcome.target_count
        );
    }
    println!();

    for (i, record) in outcome.analysis_results.iter().enumerate() {
        let marker = if i < outcome.count { "*" } else { " " };
        println!(
            "{} {:>3}. [{:>5.1}%] #{:<6} {}",
            marker,
            i + 1,
            record.frequency,
            record.index,
            record.filepath
        );
    }

    if let Some(threshold) = lock_threshold {
        let newly = session.lock_by_threshold(&outcome.analysis_results, threshold);
        println!();
        println!(
            "lock threshold {:.0}%: {} item(s) would graduate (locked set grows to {})",
            threshold,
            newly,
            session.len()
        );
        if newly > 0 {
            println!("  locked: {:?}", session.sorted());
        }
    }

    Ok(())
}
