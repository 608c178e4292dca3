//! Sumi-Glean main entry point
//!
//! This is the command-line interface for the Sumi-Glean text harvester.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use sumi_glean::config::{load_config_with_hash, validate, Config, Isolation};
use sumi_glean::crawler::{runner_from_config, Coordinator};
use sumi_glean::extract::{serve_stdio, ExtractionWorker};
use tracing_subscriber::EnvFilter;

/// Sumi-Glean: a polite single-domain text harvester
///
/// Sumi-Glean discovers the pages of one website, renders each of them in an
/// isolated headless browser, and keeps the readable text that is long
/// enough and written in the expected language.
#[derive(Parser, Debug)]
#[command(name = "sumi-glean")]
#[command(version)]
#[command(about = "A polite single-domain text harvester", long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Start URL; overrides `crawl.base-url` from the config file
    #[arg(value_name = "URL")]
    url: Option<String>,

    /// Path to TOML configuration file
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Maximum number of pages to discover
    #[arg(long)]
    max_pages: Option<usize>,

    /// Maximum number of concurrent discovery fetches
    #[arg(long)]
    max_threads: Option<usize>,

    /// Maximum number of concurrent extraction workers
    #[arg(long)]
    max_workers: Option<usize>,

    /// Skip URLs disallowed by robots.txt
    #[arg(long)]
    respect_robots: bool,

    /// Directory for extracted text files
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Do not write text files
    #[arg(long)]
    no_save: bool,

    /// Log progress while pages are extracted
    #[arg(long)]
    progress: bool,

    /// Run extraction tasks inside this process instead of worker processes
    #[arg(long)]
    in_process: bool,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long)]
    dry_run: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Runs a single extraction task read as JSON from stdin
    #[command(hide = true)]
    Worker,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    if let Some(Command::Worker) = cli.command {
        return serve_stdio(&ExtractionWorker::chrome())
            .await
            .context("worker failed");
    }

    let (config, config_hash) = load_configuration(&cli)?;

    if cli.dry_run {
        handle_dry_run(&config, config_hash.as_deref());
        return Ok(());
    }

    handle_crawl(config, config_hash).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
///
/// Logs go to stderr; a worker's stdout carries its result message.
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sumi_glean=info,warn"),
            1 => EnvFilter::new("sumi_glean=debug,info"),
            2 => EnvFilter::new("sumi_glean=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Loads the config file (if any), applies command-line overrides and validates
fn load_configuration(cli: &Cli) -> anyhow::Result<(Config, Option<String>)> {
    let (mut config, hash) = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            let (config, hash) = load_config_with_hash(path)
                .with_context(|| format!("failed to load configuration from {}", path.display()))?;
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (config, Some(hash))
        }
        None => (Config::default(), None),
    };

    apply_overrides(&mut config, cli);
    validate(&config).context("invalid configuration")?;

    Ok((config, hash))
}

fn apply_overrides(config: &mut Config, cli: &Cli) {
    if let Some(url) = &cli.url {
        config.crawl.base_url = url.clone();
    }
    if let Some(max_pages) = cli.max_pages {
        config.crawl.max_pages = max_pages;
    }
    if let Some(max_threads) = cli.max_threads {
        config.crawl.max_threads = max_threads;
    }
    if cli.max_workers.is_some() {
        config.extraction.max_workers = cli.max_workers;
    }
    if cli.respect_robots {
        config.crawl.respect_robots = true;
    }
    if let Some(dir) = &cli.output_dir {
        config.output.directory = dir.clone();
    }
    if cli.no_save {
        config.output.save_text = false;
    }
    if cli.progress {
        config.output.show_progress = true;
    }
    if cli.in_process {
        config.extraction.isolation = Isolation::InProcess;
    }
}

/// Handles the --dry-run mode: shows what would be crawled
fn handle_dry_run(config: &Config, config_hash: Option<&str>) {
    println!("=== Sumi-Glean Dry Run ===\n");

    println!("Discovery:");
    println!("  Base URL: {}", config.crawl.base_url);
    println!("  Max pages: {}", config.crawl.max_pages);
    println!("  Max threads: {}", config.crawl.max_threads);
    println!("  Respect robots.txt: {}", config.crawl.respect_robots);
    println!(
        "  Politeness delay: {}-{}ms",
        config.crawl.politeness_min_delay, config.crawl.politeness_max_delay
    );

    println!("\nExtraction:");
    match config.extraction.max_workers {
        Some(workers) => println!("  Max workers: {}", workers),
        None => println!("  Max workers: {} (CPU count)", num_cpus::get()),
    }
    println!("  Isolation: {:?}", config.extraction.isolation);
    println!("  Headless: {}", config.extraction.headless);
    println!("  Language: {}", config.extraction.language);
    println!(
        "  Minimum content length: {}",
        config.extraction.min_content_length
    );
    println!(
        "  On detection failure: {:?}",
        config.extraction.language_detection_failure
    );
    println!("  Consent strategies: {}", config.extraction.consent.len());

    println!("\nProxies ({}, {:?}):", config.proxy.servers.len(), config.proxy.selection);
    for server in &config.proxy.servers {
        println!("  - {}", server);
    }

    println!("\nOutput:");
    if config.output.save_text {
        println!("  Text directory: {}", config.output.directory.display());
    } else {
        println!("  Text files: disabled");
    }
    if let Some(path) = &config.output.summary_path {
        println!("  Summary: {}", path.display());
    }

    println!("\nUser Agent: {}", config.user_agent.header_value());
    if let Some(hash) = config_hash {
        println!("Config hash: {}", hash);
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, config_hash: Option<String>) -> anyhow::Result<()> {
    let runner = runner_from_config(&config)?;
    let mut coordinator = Coordinator::new(config, runner)?;
    if let Some(hash) = config_hash {
        coordinator = coordinator.with_config_hash(hash);
    }

    let interrupt = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
        tracing::warn!("Interrupt received, stopping outstanding work");
    };

    let report = match coordinator.run_until(interrupt).await {
        Ok(report) => report,
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            return Err(e.into());
        }
    };

    println!(
        "{} pages discovered, {} texts accepted, {} not accepted",
        report.links.len(),
        report.texts.len(),
        report.failed.len()
    );
    for path in &report.saved_files {
        println!("  {}", path.display());
    }

    Ok(())
}
