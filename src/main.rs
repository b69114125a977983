//! Sumi-Harvest main entry point
//!
//! This is the command-line interface for the Sumi-Harvest listing harvester.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use sumi_harvest::config::{load_config_with_hash, Config};
use sumi_harvest::crawler::run_harvest;
use sumi_harvest::output::{load_statistics, print_statistics};
use sumi_harvest::storage::Stores;
use tracing_subscriber::EnvFilter;

/// Sumi-Harvest: a resumable listing harvester
///
/// Sumi-Harvest walks a paginated listing, visits every detail page it finds,
/// and appends one record per page to a CSV or SQLite file. Progress is saved
/// after every item, so a stopped run resumes where it left off.
#[derive(Parser, Debug)]
#[command(name = "sumi-harvest")]
#[command(version = "1.0.0")]
#[command(about = "A resumable listing harvester", long_about = None)]
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

    /// Start from page 1, ignoring the saved checkpoint
    #[arg(long, conflicts_with_all = ["dry_run", "stats"])]
    fresh: bool,

    /// Validate config and show what would be harvested without harvesting
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the output files and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
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
            return Ok(ExitCode::FAILURE);
        }
    };

    if cli.dry_run {
        handle_dry_run(&config);
        Ok(ExitCode::SUCCESS)
    } else if cli.stats {
        handle_stats(&config)?;
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(handle_harvest(config, config_hash, cli.fresh).await)
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sumi_harvest=info,warn"),
            1 => EnvFilter::new("sumi_harvest=debug,info"),
            2 => EnvFilter::new("sumi_harvest=trace,debug"),
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

/// Handles the --dry-run mode: shows the validated configuration
fn handle_dry_run(config: &Config) {
    println!("=== Sumi-Harvest Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Total pages: {}", config.crawler.total_pages);
    println!("  Item delay: {}ms", config.crawler.item_delay);
    println!(
        "  Settle delay: {}ms listing, {}ms detail",
        config.crawler.listing_settle_delay, config.crawler.detail_settle_delay
    );
    println!("  Request timeout: {}s", config.crawler.request_timeout);

    println!("\nUser Agent:");
    println!("  {}", config.user_agent.header_value());

    println!("\nListing:");
    println!("  First page: {}", config.listing.page_url(1));
    println!("  Base URL: {}", config.listing.base_url);
    println!("  Link selector: {}", config.listing.link_selector);

    println!("\nRecord:");
    println!("  Identity field: {}", config.record.identity_field);
    println!("  Key field: {}", config.record.key_field);

    println!("\nFields ({}):", config.fields.len());
    for field in &config.fields {
        match (&field.attribute, &field.join) {
            (Some(attribute), _) => {
                println!("  - {}: {} @{}", field.name, field.selector, attribute)
            }
            (None, Some(join)) => {
                println!("  - {}: {} (joined with {:?})", field.name, field.selector, join)
            }
            (None, None) => println!("  - {}: {}", field.name, field.selector),
        }
    }

    if !config.groups.is_empty() {
        println!("\nGroups ({}):", config.groups.len());
        for group in &config.groups {
            let names: Vec<String> = group
                .fields
                .iter()
                .map(|field| format!("{}<n>", field.name))
                .collect();
            println!("  - {}: {}", group.selector, names.join(", "));
        }
    }

    println!("\nOutput:");
    println!(
        "  Records: {} ({:?})",
        config.output.records_path, config.output.format
    );
    println!("  Links: {}", config.output.links_path);
    println!("  Checkpoint: {}", config.output.checkpoint_path);

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: summarizes the output files
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Records: {}\n", config.output.records_path);

    let stores = Stores::open(&config.output, &config.record)
        .context("Failed to open the output files")?;
    let stats = load_statistics(&stores).context("Failed to read the record sink")?;

    print_statistics(&stats);

    Ok(())
}

/// Handles the main harvest operation
async fn handle_harvest(config: Config, config_hash: String, fresh: bool) -> ExitCode {
    if fresh {
        tracing::info!("Starting fresh harvest (ignoring saved checkpoint)");
    } else {
        tracing::info!("Starting harvest (will resume from the saved checkpoint)");
    }

    match run_harvest(config, Some(config_hash), fresh).await {
        Ok(outcome) => {
            if let Some(reason) = outcome.state.halt_reason() {
                tracing::warn!(
                    "Harvest stopped ({}); resume point: page {}, item {}",
                    reason.label(),
                    outcome.checkpoint.page,
                    outcome.checkpoint.offset
                );
            }
            ExitCode::from(outcome.exit_code())
        }
        Err(e) => {
            tracing::error!("Harvest failed to start: {}", e);
            ExitCode::FAILURE
        }
    }
}
