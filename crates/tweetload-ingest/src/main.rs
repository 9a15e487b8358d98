//! Tweetload - main entry point

use std::process;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tweetload_common::logging::{init_logging, LogConfig, LogLevel};
use tweetload_common::IngestError;
use tweetload_ingest::cli::{Cli, Commands};
use tweetload_ingest::loader::connect;
use tweetload_ingest::pipeline::watch_interrupts;
use tweetload_ingest::{Pipeline, PipelineConfig};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Environment settings apply first; --verbose only raises the level
    let mut log_config = LogConfig::from_env().unwrap_or_default();
    if cli.verbose {
        log_config.level = LogLevel::Debug;
    }
    let guard = match init_logging(&log_config) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Warning: failed to initialise logging: {e:#}");
            None
        }
    };

    if let Err(e) = execute(cli).await {
        let message = format!("{e:#}");
        error!(error = %message, "Command failed");
        eprintln!("Error: {message}");
        if e
            .downcast_ref::<IngestError>()
            .is_some_and(IngestError::is_retryable)
        {
            eprintln!("Loads are idempotent; re-running the same command is safe.");
        }
        drop(guard);
        process::exit(1);
    }
}

async fn execute(cli: Cli) -> anyhow::Result<()> {
    let mut config = PipelineConfig::from_env().context("Failed to load configuration")?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        let interrupts = Box::pin(futures::stream::unfold((), |()| async {
            tokio::signal::ctrl_c().await.ok().map(|()| ((), ()))
        }));
        tokio::spawn(async move {
            if watch_interrupts(interrupts, cancel).await {
                process::exit(130);
            }
        });
    }

    match cli.command {
        Commands::Run {
            extract,
            round_size,
            keep_row_files,
            json,
        } => {
            extract.apply(&mut config);
            if round_size.is_some() {
                config.round_size = round_size;
            }
            config.keep_row_files |= keep_row_files;
            config.validate()?;

            let pool = connect(&config.database).await?;
            let pipeline = Pipeline::new(config, cancel).with_progress(!json);
            let outcome = pipeline.run(&pool).await?;
            info!(rounds = outcome.rounds.len(), "Run complete");
            print_report(&outcome.report, json)?;
        }
        Commands::Extract { extract } => {
            extract.apply(&mut config);
            config.validate()?;

            let pipeline = Pipeline::new(config, cancel).with_progress(true);
            let inputs = pipeline.inputs()?;
            let work_dir = pipeline.config().work_dir.clone();
            let summary = pipeline.extract(inputs, &work_dir).await?;
            println!(
                "Extracted {} files ({} failed, {} skipped, {} bad lines) into {}",
                summary.completed_files(),
                summary.failed_files(),
                summary.skipped_files(),
                summary.bad_lines(),
                work_dir.display()
            );
        }
        Commands::Load {
            work_dir,
            load_concurrency,
        } => {
            if let Some(dir) = work_dir {
                config.work_dir = dir;
            }
            if let Some(n) = load_concurrency {
                config.load_concurrency = n;
            }
            config.validate()?;

            let pool = connect(&config.database).await?;
            let pipeline = Pipeline::new(config, cancel);
            let work_dir = pipeline.config().work_dir.clone();
            let loads = pipeline.load_dir(&pool, &work_dir).await?;
            let report = pipeline.report(&pool).await?.with_loads(loads);
            print_report(&report, false)?;
        }
        Commands::Report { json } => {
            config.validate()?;
            let pool = connect(&config.database).await?;
            let report = Pipeline::new(config, cancel).report(&pool).await?;
            print_report(&report, json)?;
        }
    }

    Ok(())
}

fn print_report(report: &tweetload_ingest::report::CompletionReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        println!("{report}");
    }
    Ok(())
}
