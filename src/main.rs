//! Lot-Harvester main entry point
//!
//! This is the command-line interface for the Lot-Harvester listing scraper.

use anyhow::Context;
use clap::Parser;
use lot_harvester::config::{
    load_config_with_hash, validate_page_limit, validate_worker_count, Config,
};
use lot_harvester::output::{load_statistics, print_statistics};
use lot_harvester::storage::open_storage;
use lot_harvester::{Coordinator, RunParams};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Lot-Harvester: a used-car listing harvester
///
/// Lot-Harvester walks the paginated search results of a classifieds site,
/// extracts every car detail page it links to, and keeps an up-to-date copy of
/// each listing in SQLite.
#[derive(Parser, Debug)]
#[command(name = "lot-harvester")]
#[command(version = "1.0.0")]
#[command(about = "A used-car listing harvester", long_about = None)]
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

    /// Number of extraction workers (1-10), overriding the config file
    #[arg(long, value_parser = parse_workers)]
    workers: Option<usize>,

    /// Maximum number of search pages to scan, overriding the config file
    #[arg(long, value_parser = parse_page_limit)]
    pages: Option<u32>,

    /// Validate config and show what would be harvested without fetching anything
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

fn parse_workers(value: &str) -> Result<usize, String> {
    let workers: usize = value.parse().map_err(|e| format!("{}", e))?;
    validate_worker_count(workers).map_err(|e| e.to_string())?;
    Ok(workers)
}

fn parse_page_limit(value: &str) -> Result<u32, String> {
    let limit: u32 = value.parse().map_err(|e| format!("{}", e))?;
    validate_page_limit(limit).map_err(|e| e.to_string())?;
    Ok(limit)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    let mut params = RunParams::from_config(&config.scraper);
    if let Some(workers) = cli.workers {
        params.workers = workers;
    }
    if cli.pages.is_some() {
        params.page_limit = cli.pages;
    }

    if cli.dry_run {
        handle_dry_run(&config, &params);
    } else if cli.stats {
        handle_stats(&config)?;
    } else {
        handle_run(config, config_hash, params).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("lot_harvester=info,warn"),
            1 => EnvFilter::new("lot_harvester=debug,info"),
            2 => EnvFilter::new("lot_harvester=trace,debug"),
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

/// Handles the --dry-run mode: validates config and shows what would be harvested
fn handle_dry_run(config: &Config, params: &RunParams) {
    println!("=== Lot-Harvester Dry Run ===\n");

    println!("Source:");
    println!("  Search URL: {}", config.source.search_url);
    println!(
        "  Site origin: {}",
        config.source.site_origin.as_deref().unwrap_or("(from search URL)")
    );
    println!("  Page size: {}", config.source.page_size);
    println!("  Card selector: {}", config.source.card_selector);
    println!("  Count selector: {}", config.source.total_count_selector);

    println!("\nRun:");
    println!("  Workers: {}", params.workers);
    match params.page_limit {
        Some(limit) => println!("  Page limit: {}", limit),
        None => println!("  Page limit: none"),
    }
    println!("  Batch size: {}", config.scraper.batch_size);
    println!(
        "  Attempts: {} per detail page, {} per search page",
        config.scraper.max_detail_attempts, config.scraper.max_discovery_attempts
    );
    println!("  Request timeout: {}s", config.scraper.request_timeout);

    println!("\nHTTP:");
    println!("  User agents: {}", config.http.user_agents.len());
    println!("  Referer: {}", config.http.referer);

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let storage = open_storage(Path::new(&config.output.database_path))
        .context("Failed to open database")?;
    let stats = load_statistics(&storage).context("Failed to load statistics")?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the main harvest operation
async fn handle_run(config: Config, config_hash: String, params: RunParams) -> anyhow::Result<()> {
    let storage = open_storage(Path::new(&config.output.database_path))
        .with_context(|| format!("Failed to open database {}", config.output.database_path))?;
    let coordinator = Coordinator::new(config, config_hash, storage);

    let handle = coordinator.start_run(params)?;
    match handle.await.context("Harvest task panicked")? {
        Ok(report) => {
            tracing::info!(
                "Run {} finished: {} pages scanned of {}, {} links queued, {} listings saved, {} dropped, {} batches",
                report.run_id,
                report.counts.pages_scanned,
                report.total_pages,
                report.counts.links_queued,
                report.counts.listings_saved,
                report.counts.links_dropped,
                report.batches_flushed
            );
            Ok(())
        }
        Err(e) => {
            tracing::error!("Harvest failed: {}", e);
            Err(e.into())
        }
    }
}
