//! # Loremaster CLI (`lore`)
//!
//! ## Usage
//!
//! ```bash
//! lore --config ./config/lore.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `lore init` | Create the SQLite database and run schema migrations |
//! | `lore sync` | Sync the Notion database into the collection |
//! | `lore ask "<question>"` | Answer a question from the stored lore |
//! | `lore last-session` | Retell the most recent session |
//! | `lore stats` | Show record counts for the collection |

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use loremaster::sync::SyncMode;
use loremaster::{compose, config, logging, migrate, reply, stats, sync};

/// Loremaster: campaign-lore sync and retrieval.
#[derive(Parser)]
#[command(
    name = "lore",
    about = "Loremaster — campaign-lore sync and retrieval over a Notion workspace",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/lore.toml")]
    config: PathBuf,

    /// Log at debug level (overridden by `RUST_LOG`).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent; running it multiple times is safe.
    Init,

    /// Sync the Notion database into the vector collection.
    ///
    /// Incremental by default: only new and newer documents are embedded.
    Sync {
        /// Reload every document instead of diffing.
        #[arg(long)]
        full: bool,

        /// Drop the collection before loading. Implies `--full`.
        #[arg(long)]
        reset: bool,

        /// Fetch and diff only; report what would be written.
        #[arg(long)]
        dry_run: bool,
    },

    /// Ask the loremaster a question.
    Ask {
        /// The question.
        question: String,
    },

    /// Retell what happened in the most recent session.
    LastSession {
        /// Number of earlier sessions to include as background.
        #[arg(long)]
        previous: Option<usize>,
    },

    /// Show record counts for the configured collection.
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let cfg = config::load_config(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg)
                .await
                .context("initializing database")?;
            println!("Database initialized successfully.");
        }
        Commands::Sync {
            full,
            reset,
            dry_run,
        } => {
            let mode = if full || reset {
                SyncMode::Full { reset }
            } else {
                SyncMode::Incremental
            };
            let report = sync::run_sync(&cfg, mode, dry_run)
                .await
                .context("sync failed")?;

            let label = match mode {
                SyncMode::Full { reset: true } => "full, reset",
                SyncMode::Full { reset: false } => "full",
                SyncMode::Incremental => "incremental",
            };
            if report.dry_run {
                println!("sync notion ({}, dry-run)", label);
            } else {
                println!("sync notion ({})", label);
            }
            println!("  fetched: {} documents", report.fetched);
            println!("  new: {}", report.new);
            println!("  updated: {}", report.updated);
            println!("  unchanged: {}", report.unchanged);
            println!("  records deleted: {}", report.deleted);
            if report.dry_run {
                println!("  estimated chunk records: {}", report.chunk_records);
                println!("  estimated document records: {}", report.document_records);
            } else {
                println!("  chunk records written: {}", report.chunk_records);
                println!("  document records written: {}", report.document_records);
            }
            println!("ok");
        }
        Commands::Ask { question } => {
            let answer = compose::run_ask(&cfg, &question)
                .await
                .context("answering question")?;
            println!(
                "{}",
                reply::format_reply(&answer, cfg.generation.max_message_length)
            );
        }
        Commands::LastSession { previous } => {
            let story = compose::run_last_session(&cfg, previous)
                .await
                .context("retelling last session")?;
            for message in reply::split_for_delivery(&story, cfg.generation.max_message_length) {
                println!("{}", message);
            }
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await.context("reading stats")?;
        }
    }

    Ok(())
}
