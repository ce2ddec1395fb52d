//! # Topic Harvest CLI (`harvest`)
//!
//! ## Usage
//!
//! ```bash
//! harvest --config ./config/harvest.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `harvest run` | Run (or resume) today's collection; the default |
//! | `harvest init` | Create the SQLite database and run schema migrations |
//! | `harvest status` | Show the checkpoint of the current run |
//! | `harvest stats` | Show recent runs and per-topic counts |
//! | `harvest reset-locks` | Release stale identity locks in the pool |
//!
//! Exit status is 0 on success, 1 on failure and 130 when interrupted with
//! Ctrl-C. An interrupted or failed run resumes on the next invocation the
//! same day.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use topic_harvest::config::{self, Config, LoggingConfig};
use topic_harvest::pipeline::{Pipeline, RunOutcome};
use topic_harvest::source::SourcePool;
use topic_harvest::source_http::HttpSourcePool;
use topic_harvest::store::SqliteItemStore;
use topic_harvest::{logging, migrate, stats, status, HarvestError};

/// Topic Harvest: resumable, rate-limit-aware collection of social posts.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/harvest.example.toml` for a full example.
#[derive(Parser)]
#[command(name = "harvest", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(
        long,
        global = true,
        env = "HARVEST_CONFIG",
        default_value = "./config/harvest.toml"
    )]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch topics, expand reply threads and store the results.
    ///
    /// Resumes today's run from its checkpoint if one exists.
    Run,

    /// Initialize the database schema. Idempotent.
    Init,

    /// Print the pipeline checkpoint.
    Status,

    /// Show recent runs from the database.
    Stats {
        /// Number of runs to show.
        #[arg(long, default_value_t = 10)]
        limit: i64,
    },

    /// Ask the pool gateway to release identity locks left by a killed run.
    ResetLocks,
}

const EXIT_INTERRUPTED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let cfg = match config::load_config(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            logging::init(&LoggingConfig::default());
            error!(error = %e, "configuration error");
            return ExitCode::FAILURE;
        }
    };
    logging::init(&cfg.logging);

    let command = cli.command.unwrap_or(Commands::Run);
    match dispatch(command, cfg).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "command failed");
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(command: Commands, cfg: Config) -> anyhow::Result<ExitCode> {
    match command {
        Commands::Run => return run_pipeline(cfg).await,
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Status => status::run_status(&cfg)?,
        Commands::Stats { limit } => stats::run_stats(&cfg, limit).await?,
        Commands::ResetLocks => {
            let pool = HttpSourcePool::new(&cfg.source)?;
            pool.reset_locks().await?;
            println!("Identity locks released on {}.", pool.name());
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn run_pipeline(cfg: Config) -> anyhow::Result<ExitCode> {
    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });

    let pool: Arc<dyn SourcePool> = Arc::new(HttpSourcePool::new(&cfg.source)?);
    let store = SqliteItemStore::connect(&cfg.db.path).await?;
    let mut pipeline = Pipeline::new(cfg, pool, Box::new(store))?;

    match pipeline.run(&cancel).await {
        Ok(RunOutcome::Completed(report)) => {
            println!("Pipeline complete");
            println!("  Run:             {}", report.run_id);
            println!("  Items collected: {}", report.items_collected);
            println!("  Replies:         {}", report.replies_collected);
            println!("  Items in DB:     {}", report.run_item_count);
            println!("  Fetch time:      {:.1}s", report.fetch_elapsed.as_secs_f64());
            println!("  Store time:      {:.1}s", report.store_elapsed.as_secs_f64());
            Ok(ExitCode::SUCCESS)
        }
        Ok(RunOutcome::Failed { stage, error }) => {
            eprintln!("Pipeline failed during {:?}: {}", stage, error);
            eprintln!("Progress saved; run again to resume.");
            Ok(ExitCode::FAILURE)
        }
        Err(HarvestError::Interrupted) => {
            info!("interrupted by operator");
            eprintln!("Interrupted; progress saved to checkpoint. Run again to resume.");
            Ok(ExitCode::from(EXIT_INTERRUPTED))
        }
        Err(e) => Err(e.into()),
    }
}
