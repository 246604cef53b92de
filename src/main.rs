//! Shelf-Harvest main entry point
//!
//! This is the command-line interface for the Shelf-Harvest catalogue scraper.

use anyhow::Context;
use clap::Parser;
use shelf_harvest::config::{load_config_with_hash, Config};
use shelf_harvest::crawler::Coordinator;
use shelf_harvest::output::{load_statistics, print_report, print_statistics};
use shelf_harvest::repair::repair_titles;
use shelf_harvest::storage::open_store;
use shelf_harvest::url::{catalogue_base, index_url, listing_page_url};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Shelf-Harvest: a book catalogue scraper
///
/// Shelf-Harvest walks a paginated book catalogue, resolves each book's
/// category from its detail page, and stores books it has not seen before.
#[derive(Parser, Debug)]
#[command(name = "shelf-harvest")]
#[command(version)]
#[command(about = "A book catalogue scraper", long_about = None)]
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
    #[arg(long, conflicts_with_all = ["stats", "repair_titles"])]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "repair_titles"])]
    stats: bool,

    /// Decode HTML entities in stored titles and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats"])]
    repair_titles: bool,

    /// Visit at most this many listing pages (overrides the config)
    #[arg(long, value_name = "N")]
    max_pages: Option<u32>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if let Some(max_pages) = cli.max_pages {
        config.crawler.max_pages = Some(max_pages);
    }

    if cli.dry_run {
        handle_dry_run(&config)
    } else if cli.stats {
        handle_stats(&config)
    } else if cli.repair_titles {
        handle_repair_titles(&config)
    } else {
        handle_crawl(config, config_hash).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("shelf_harvest=info,warn"),
            1 => EnvFilter::new("shelf_harvest=debug,info"),
            2 => EnvFilter::new("shelf_harvest=trace,debug"),
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

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    let index = index_url(&config.target)?;
    let catalogue = catalogue_base(&config.target)?;

    println!("=== Shelf-Harvest Dry Run ===\n");

    println!("Target:");
    println!("  Category index: {}", index);
    println!("  Catalogue base: {}", catalogue);
    println!(
        "  First listing page: {}",
        listing_page_url(&catalogue, &config.target.listing_pattern, 1)?
    );

    println!("\nCrawler Configuration:");
    match config.crawler.max_pages {
        Some(max) => println!("  Max pages: {}", max),
        None => println!(
            "  Max pages: until {} consecutive empty pages",
            config.crawler.empty_page_threshold
        ),
    }
    println!("  Workers: {}", config.crawler.workers);
    println!("  Prefetch pages: {}", config.crawler.prefetch_pages);
    println!(
        "  Retries: {} attempts, {}ms base backoff",
        config.crawler.max_retries, config.crawler.retry_backoff_ms
    );
    println!(
        "  Stop after failed pages: {}",
        config.crawler.max_failed_pages
    );

    println!("\nUser Agent:");
    println!("  Name: {}", config.user_agent.crawler_name);
    println!("  Version: {}", config.user_agent.crawler_version);
    println!("  Contact URL: {}", config.user_agent.contact_url);
    println!("  Contact Email: {}", config.user_agent.contact_email);

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);
    println!("  Failure log: {}", config.output.failure_log_path);

    println!("\n✓ Configuration is valid");

    Ok(())
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let store = open_store(Path::new(&config.output.database_path))?;
    let stats = load_statistics(&store)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the --repair-titles mode
fn handle_repair_titles(config: &Config) -> anyhow::Result<()> {
    let store = open_store(Path::new(&config.output.database_path))?;
    let repaired = repair_titles(&store).context("title repair failed")?;

    println!("✓ Repaired {} titles", repaired);

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, config_hash: String) -> anyhow::Result<()> {
    let store = Arc::new(open_store(Path::new(&config.output.database_path))?);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing in-flight work");
            on_signal.cancel();
        }
    });

    let mut coordinator = Coordinator::new(config, store, cancel)?.with_config_hash(config_hash);
    let report = coordinator.run().await.context("crawl failed")?;

    if !coordinator.failures().is_empty() {
        tracing::warn!(
            "{} URLs could not be fetched",
            coordinator.failures().len()
        );
    }

    print_report(&report);

    Ok(())
}
