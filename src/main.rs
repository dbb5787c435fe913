//! utalog - singing-stream setlist harvester
//!
//! CLI surface:
//! - `update`: incremental run from the per-channel watermarks
//! - `backfill [channel_id]`: full-history run, ignoring watermarks
//! - `publish`: re-derive the front-end JSONs from the current catalog
//! - `classify-recheck`: re-run genre rules over existing rows
//!
//! Exit codes: 0 ok, 2 quota exceeded (partial success), 3 config error,
//! 4 I/O error.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use utalog::config::{resolve_api_key, AppConfig, StatePaths};
use utalog::services::YouTubeClient;
use utalog::workflow::maintenance::{publish_only, recheck_genres};
use utalog::workflow::{Orchestrator, RunMode};
use utalog::Error;

/// Singing-stream setlist harvester
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory holding config.json, channels.json, genre_keywords.json
    #[arg(short, long, value_name = "DIR", default_value = "config")]
    config_dir: PathBuf,

    /// Directory holding watermarks, catalog, cache, and out/
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    state_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Incremental update from per-channel watermarks
    Update,
    /// Full-history harvest, ignoring watermarks
    Backfill {
        /// Restrict to one channel id
        channel_id: Option<String>,
    },
    /// Re-derive the published JSONs only
    Publish,
    /// Re-run genre classification over the existing catalog
    ClassifyRecheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("utalog={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

async fn run(args: Args) -> Result<ExitCode, Error> {
    let config = AppConfig::load(&args.config_dir)?;
    let paths = StatePaths::new(&args.state_dir);

    match args.command {
        Command::Update => harvest(config, paths, RunMode::Update).await,
        Command::Backfill { channel_id } => {
            harvest(config, paths, RunMode::Backfill(channel_id)).await
        }
        Command::Publish => {
            let stats = publish_only(&config, &paths)?;
            info!(
                total = stats.total_rows,
                singing = stats.singing_rows,
                "publish complete"
            );
            Ok(ExitCode::SUCCESS)
        }
        Command::ClassifyRecheck => {
            let changed = recheck_genres(&config, &paths).await?;
            info!(changed, "classify-recheck complete");
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn harvest(config: AppConfig, paths: StatePaths, mode: RunMode) -> Result<ExitCode, Error> {
    let api_key = resolve_api_key(&config.run)?;
    let client = Arc::new(YouTubeClient::new(api_key, config.run.daily_quota_units));
    let orchestrator = Orchestrator::new(client, config, paths);

    // let in-flight calls settle, start nothing new
    let cancel = orchestrator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, winding down");
            cancel.cancel();
        }
    });

    let report = orchestrator.run(mode).await?;
    Ok(ExitCode::from(report.exit_code() as u8))
}
