//! Market-Refresh main entry point
//!
//! This is the command-line interface for the Market-Refresh update crawler.

use clap::Parser;
use market_refresh::config::{load_config_with_hash, Config};
use market_refresh::crawler::{Coordinator, RunSummary};
use market_refresh::storage::{SqliteStorage, Storage};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Market-Refresh: an incremental update crawler for app markets
///
/// Market-Refresh probes every package already known to the catalog store
/// against the market's download endpoint and records the current version
/// and binary URL each probe redirects to.
#[derive(Parser, Debug)]
#[command(name = "market-refresh")]
#[command(version = "0.1.0")]
#[command(about = "An incremental update crawler for app markets", long_about = None)]
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

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    // Handle different modes
    if cli.dry_run {
        handle_dry_run(&config)?;
    } else if cli.stats {
        handle_stats(&config)?;
    } else {
        handle_crawl(config, &config_hash).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("market_refresh=info,warn"),
            1 => EnvFilter::new("market_refresh=debug,info"),
            2 => EnvFilter::new("market_refresh=trace,debug"),
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

fn open_store(config: &Config) -> Result<SqliteStorage, Box<dyn std::error::Error>> {
    Ok(SqliteStorage::new(
        Path::new(&config.output.database_path),
        Duration::from_secs(config.output.store_timeout_secs),
    )?)
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Market-Refresh Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Page size: {}", config.crawler.page_size);
    println!("  Max empty pages: {}", config.crawler.max_empty_pages);
    println!("  Concurrency: {}", config.crawler.concurrency);
    println!(
        "  Timeouts: {}s request, {}s connect",
        config.crawler.request_timeout_secs, config.crawler.connect_timeout_secs
    );
    println!("  Download delay: {}ms", config.crawler.download_delay_ms);
    println!("  Skip extensions: {:?}", config.crawler.skip_extensions);

    println!("\nMarket:");
    println!("  Name: {}", config.market.name);
    println!("  Download base: {}", config.market.download_base);
    if config.market.use_proxies {
        println!(
            "  Proxies: validator {:?}, refreshed every {}s",
            config.market.validator_tag(),
            config.proxy.ttl_secs
        );
    } else {
        println!("  Proxies: disabled");
    }

    println!("\nUser Agent: {}", config.user_agent.header_value());

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);

    println!("\n✓ Configuration is valid");

    if Path::new(&config.output.database_path).exists() {
        let storage = open_store(config)?;
        let stats = storage.statistics()?;
        println!(
            "✓ Would probe up to {} known packages",
            stats.packages
        );
    } else {
        println!("✓ Database does not exist yet; a run would find no packages");
    }

    Ok(())
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("Database: {}\n", config.output.database_path);

    let storage = open_store(config)?;
    let stats = storage.statistics()?;

    println!("=== Catalog Statistics ===\n");
    println!("Packages:           {}", stats.packages);
    println!("Proxies:            {}", stats.proxies);
    println!("Status records:     {}", stats.status_records);
    println!("Distinct versions:  {}", stats.distinct_versions);
    println!("Runs:               {}", stats.runs);

    if let Some(run) = storage.get_latest_run()? {
        println!("\nLatest run: #{} ({})", run.id, run.status.to_db_string());
        println!("  Started:  {}", run.started_at);
        if let Some(finished_at) = &run.finished_at {
            println!("  Finished: {}", finished_at);
        }
        println!("  Resolved: {}", run.resolved_count);
    }

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, config_hash: &str) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(
        "Market {}: probing {} with page size {} and concurrency {}",
        config.market.name,
        config.market.download_base,
        config.crawler.page_size,
        config.crawler.concurrency
    );

    let coordinator = Coordinator::new(config, config_hash)?;

    // Stop issuing probes on Ctrl-C; in-flight ones are allowed to finish
    let token = coordinator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing in-flight probes");
            token.cancel();
        }
    });

    match coordinator.run().await {
        Ok(summary) => {
            print_summary(&summary);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}

fn print_summary(summary: &RunSummary) {
    println!("=== Run #{} ===\n", summary.run_id);
    println!("Pages:              {}", summary.pages);
    println!("Identifiers:        {}", summary.identifiers);
    println!("Skipped:            {}", summary.skipped);
    println!("Probed:             {}", summary.probed);
    println!("Resolved:           {}", summary.resolved);
    println!("No redirect:        {}", summary.no_redirect);
    println!("Parse failures:     {}", summary.parse_failures);
    println!("Transport failures: {}", summary.transport_failures);
    if summary.cancelled > 0 {
        println!("Cancelled:          {}", summary.cancelled);
    }
}
