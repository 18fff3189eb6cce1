//! Table-Reviews main entry point
//!
//! This is the command-line interface for the Table-Reviews crawler.

use clap::Parser;
use std::path::{Path, PathBuf};
use table_reviews::config::{load_config_with_hash, validate, Config};
use table_reviews::crawler::{run_crawl, CrawlRequest};
use table_reviews::output::{export_jsonl, load_statistics, print_statistics};
use table_reviews::storage::SqliteStorage;
use tracing_subscriber::EnvFilter;

/// Table-Reviews: a restaurant review crawler
///
/// Table-Reviews visits OpenTable listing and restaurant pages, collects the
/// reviews embedded in each restaurant page, pages through the review API for
/// the rest, and stores them in SQLite until the requested number of reviews
/// has been collected.
#[derive(Parser, Debug)]
#[command(name = "table-reviews")]
#[command(version = "1.0.0")]
#[command(about = "A restaurant review crawler", long_about = None)]
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
    #[arg(long, conflicts_with_all = ["stats", "export"])]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "export"])]
    stats: bool,

    /// Write every stored review to PATH as JSON Lines and exit
    #[arg(long, value_name = "PATH", conflicts_with_all = ["dry_run", "stats"])]
    export: Option<PathBuf>,

    /// Override the total number of reviews to collect
    #[arg(long, value_name = "N")]
    results_wanted: Option<u64>,

    /// Override the per-restaurant review cap
    #[arg(long, value_name = "N")]
    max_per_restaurant: Option<u64>,

    /// Override the number of concurrent pages
    #[arg(long, value_name = "N")]
    concurrency: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    apply_overrides(&mut config, &cli)?;

    // Handle different modes
    if cli.dry_run {
        handle_dry_run(&config)?;
    } else if cli.stats {
        handle_stats(&config)?;
    } else if let Some(path) = &cli.export {
        handle_export(&config, path)?;
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
            0 => EnvFilter::new("table_reviews=info,warn"),
            1 => EnvFilter::new("table_reviews=debug,info"),
            2 => EnvFilter::new("table_reviews=trace,debug"),
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

/// Applies command-line overrides and re-validates the result
fn apply_overrides(config: &mut Config, cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(n) = cli.results_wanted {
        config.extraction.results_wanted = n;
    }
    if let Some(n) = cli.max_per_restaurant {
        config.extraction.max_reviews_per_restaurant = n;
    }
    if let Some(n) = cli.concurrency {
        config.crawler.max_concurrency = n;
    }
    validate(config)?;
    Ok(())
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Table-Reviews Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Max concurrency: {}", config.crawler.max_concurrency);
    println!("  Max request retries: {}", config.crawler.max_request_retries);
    println!("  Navigation timeout: {}ms", config.crawler.navigation_timeout_ms);

    println!("\nExtraction:");
    println!("  Reviews wanted: {}", config.extraction.results_wanted);
    println!(
        "  Max reviews per restaurant: {}",
        config.extraction.max_reviews_per_restaurant
    );
    println!("  API page size: {}", config.extraction.page_size);
    println!(
        "  Page delay: {}ms + up to {}ms jitter",
        config.extraction.page_delay_ms, config.extraction.page_delay_jitter_ms
    );

    println!("\nBrowser:");
    println!("  Renderer: {:?}", config.browser.renderer);
    println!("  User agents: {}", config.browser.user_agents.len());
    println!(
        "  Blocked resource types: {}",
        config.browser.blocked_resource_types.join(", ")
    );
    match &config.proxy {
        Some(proxy) => println!("  Proxy: {}", proxy.url),
        None => println!("  Proxy: none"),
    }

    println!("\nSite Domains ({}):", config.site.domains.len());
    for domain in &config.site.domains {
        println!("  - {}", domain);
    }

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);

    println!("\nStart URLs ({}):", config.start_urls.len());
    for start in &config.start_urls {
        match CrawlRequest::parse(start.url(), start.label()) {
            Ok(request) => println!("  - [{}] {}", request.label, request.url),
            Err(e) => println!("  - [invalid] {} ({})", start.url(), e),
        }
    }

    println!("\n✓ Configuration is valid");
    println!(
        "✓ Would collect up to {} reviews from {} start URLs",
        config.extraction.results_wanted,
        config.start_urls.len()
    );

    Ok(())
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("Database: {}\n", config.output.database_path);

    // Open the database
    let storage = SqliteStorage::new(Path::new(&config.output.database_path))?;

    // Load statistics
    let stats = load_statistics(&storage)?;

    // Print statistics
    print_statistics(&stats);

    Ok(())
}

/// Handles the --export mode: writes stored reviews as JSON Lines
fn handle_export(config: &Config, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Exporting Reviews ===\n");
    println!("Database: {}", config.output.database_path);
    println!("Output: {}", path.display());
    println!();

    let storage = SqliteStorage::new(Path::new(&config.output.database_path))?;
    let written = export_jsonl(&storage, path)?;

    println!("✓ Exported {} reviews to: {}", written, path.display());

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, config_hash: &str) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(
        "Start URLs: {}, target: {} reviews, concurrency: {}",
        config.start_urls.len(),
        config.extraction.results_wanted,
        config.crawler.max_concurrency
    );

    // Run the crawler
    match run_crawl(config, config_hash).await {
        Ok(summary) => {
            tracing::info!(
                "Crawl completed successfully: {} reviews collected",
                summary.records_emitted
            );
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}
