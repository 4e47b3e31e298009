// Command line entry point: ingest a crawl export, inspect stored jobs

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gig_finder::types::config::parse_run_date;
use gig_finder::{CrawlRun, JobSource, JobStore, JsonLinesSource, RetryingStore, RunConfig, SqliteStore};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(
    name = "gig-finder",
    about = "Upsert scraped job postings with change history"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest a JSON lines crawl export, then close jobs it no longer lists
    Ingest {
        /// Crawl export, one JSON object per line
        file: PathBuf,

        /// Run date (YYYY-MM-DD); overrides GIG_RUN_DATE
        #[arg(long)]
        run_date: Option<String>,

        /// Skip closing jobs missing from this crawl
        #[arg(long)]
        skip_sweep: bool,

        /// Fail on the first malformed line instead of skipping it
        #[arg(long)]
        strict: bool,
    },

    /// Print a stored job as JSON
    Show {
        /// Absolute job id (base URL + path)
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,gig_finder=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    // Load configuration
    let mut config = RunConfig::from_env().context("Failed to load configuration")?;

    tracing::info!(collection = %config.collection, "Connecting to database...");
    let store = SqliteStore::from_env(&config.collection)
        .await
        .context("Failed to open job store")?;
    let store = RetryingStore::with_defaults(store);
    tracing::info!("Database connected");

    match cli.command {
        Command::Ingest {
            file,
            run_date,
            skip_sweep,
            strict,
        } => {
            if let Some(date) = run_date {
                config.run_date = parse_run_date(&date).context("Invalid --run-date")?;
            }

            let mut source = JsonLinesSource::new(file.clone());
            if strict {
                source = source.strict();
            }

            let run = CrawlRun::new(&store, &config);
            let report = if skip_sweep {
                tracing::info!("Sweep disabled for this run");
                run.process_stream(source.records()).await
            } else {
                run.execute(source.records()).await
            };
            let success = report.is_success();

            println!(
                "{}",
                serde_json::json!({
                    "run_date": config.run_date,
                    "records_seen": report.records_seen,
                    "created": report.created,
                    "updated": report.updated(),
                    "changed": report.changed,
                    "unchanged": report.unchanged,
                    "duplicates": report.duplicates,
                    "rejected": report.rejected,
                    "failed_ids": report.failed_ids,
                    "source_errors": report.source_errors,
                    "ended": report.sweep.as_ref().map(|s| s.ended),
                    "sweep_failed_ids": report.sweep.as_ref().map(|s| s.failed_ids.clone()),
                    "sweep_error": report.sweep_error,
                })
            );

            anyhow::ensure!(
                success,
                "Run finished with failures in {}",
                file.display()
            );
        }
        Command::Show { id } => {
            let entity = store
                .get(&id)
                .await
                .with_context(|| format!("Failed to load {}", id))?
                .with_context(|| format!("No job stored with id {}", id))?;

            println!("{}", serde_json::to_string_pretty(&entity)?);
        }
    }

    Ok(())
}
