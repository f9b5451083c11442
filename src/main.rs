//! Frame-Archiver main entry point
//!
//! This is the command-line interface for the Frame-Archiver snapshot harvester.

use clap::Parser;
use frame_archiver::archiver::{archive, plan_run};
use frame_archiver::config::{load_config_with_hash, Config};
use frame_archiver::output::{load_statistics, print_statistics};
use frame_archiver::state::format_timestamp;
use frame_archiver::storage::open_checkpoint;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Frame-Archiver: a resumable snapshot harvester
///
/// Frame-Archiver fetches every frame in a configured time window with
/// bounded concurrency, retries failures according to their class, and keeps
/// a crash-safe JSON checkpoint so interrupted runs resume where they stopped.
#[derive(Parser, Debug)]
#[command(name = "frame-archiver")]
#[command(version = "1.0.0")]
#[command(about = "A resumable snapshot harvester", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Ignore the existing checkpoint and fetch the whole window again
    #[arg(long)]
    fresh: bool,

    /// Validate config and show what would be fetched without fetching
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show coverage statistics for the existing artifact and exit
    #[arg(long, conflicts_with_all = ["dry_run", "fresh"])]
    stats: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    match execute(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn execute(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config, cli.fresh)?;
    } else if cli.stats {
        handle_stats(&config)?;
    } else {
        handle_archive(config, cli.fresh).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("frame_archiver=info,warn"),
            1 => EnvFilter::new("frame_archiver=debug,info"),
            2 => EnvFilter::new("frame_archiver=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: validates config and shows the planned work
fn handle_dry_run(config: &Config, fresh: bool) -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Frame-Archiver Dry Run ===\n");

    println!("Window:");
    println!("  Start: {}", format_timestamp(config.window.start_ms()));
    println!("  End: {}", format_timestamp(config.window.end_ms()));
    println!("  Step: {}ms", config.window.step_ms);
    println!("  Slots: {}", config.window.slot_count());

    println!("\nScheduler:");
    println!("  Max concurrency: {}", config.scheduler.max_concurrency);
    println!(
        "  Retry limit per task: {}",
        config.scheduler.retry_limit_per_task
    );
    println!(
        "  Error abort threshold: {}",
        config.scheduler.error_abort_threshold
    );
    println!(
        "  Checkpoint cadence: {} records",
        config.scheduler.checkpoint_cadence
    );
    println!(
        "  Transient retry delay: {}ms",
        config.scheduler.transient_retry_delay_ms
    );
    println!("  Fragment count: {}", config.scheduler.fragment_count);

    println!("\nFetcher:");
    println!("  Endpoint: {}", config.fetcher.endpoint);
    println!("  Auth token file: {}", config.fetcher.auth_token_path);
    if let Some(proxy) = &config.fetcher.proxy {
        println!("  Proxy: {}", proxy);
    }

    println!("\nOutput:");
    println!("  Checkpoint: {}", config.output.checkpoint_path);

    let store = open_checkpoint(
        Path::new(&config.output.checkpoint_path),
        config.scheduler.fragment_count,
    );
    let (queue, records) = plan_run(&config.window, &store, fresh)?;

    println!("\n✓ Configuration is valid");
    println!(
        "✓ Would fetch {} timestamps ({} already archived)",
        queue.len(),
        records.len()
    );

    Ok(())
}

/// Handles the --stats mode: shows coverage of the existing artifact
fn handle_stats(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let path = Path::new(&config.output.checkpoint_path);
    println!("Checkpoint: {}\n", path.display());

    let store = open_checkpoint(path, config.scheduler.fragment_count);
    match load_statistics(&store, &config.window, config.scheduler.fragment_count)? {
        Some(stats) => print_statistics(&stats),
        None => println!("No checkpoint found."),
    }

    Ok(())
}

/// Handles the main archive operation
async fn handle_archive(config: Config, fresh: bool) -> Result<(), Box<dyn std::error::Error>> {
    if fresh {
        tracing::info!("Starting fresh run (ignoring existing checkpoint)");
    } else {
        tracing::info!("Starting run (will resume from existing checkpoint)");
    }

    tracing::info!(
        "Window {} .. {} every {}ms",
        format_timestamp(config.window.start_ms()),
        format_timestamp(config.window.end_ms()),
        config.window.step_ms
    );

    let report = archive(config, fresh).await?;

    tracing::info!(
        "Run finished: {} fetched, {} abandoned, {} validation errors, {} transient retries",
        report.fetched,
        report.abandoned.len(),
        report.validation_errors,
        report.transient_retries
    );
    for timestamp in &report.abandoned {
        tracing::warn!("Abandoned: {}", format_timestamp(*timestamp));
    }

    Ok(())
}
