//! Harvest-Crawl main entry point
//!
//! This is the command-line interface for the Harvest-Crawl structured-data harvester.

use anyhow::{bail, Context};
use chrono::Utc;
use clap::Parser;
use harvest_crawl::config::{load_config_with_hash, Config, CrawlConfig};
use harvest_crawl::crawler::run_job;
use harvest_crawl::output::{
    generate_markdown_summary, print_summary, write_failures, write_records, write_records_to,
    CrawlSummary, OutputFormat,
};
use harvest_crawl::CrawlStatus;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Harvest-Crawl: a polite structured-data harvester
///
/// Harvest-Crawl follows pagination chains or list-to-detail links described
/// in a TOML job file, extracts records with CSS selectors, and writes them
/// as JSON or CSV. Requests are rate limited, retried and cached.
#[derive(Parser, Debug)]
#[command(name = "harvest-crawl")]
#[command(version)]
#[command(about = "A polite structured-data harvester", long_about = None)]
struct Cli {
    /// Path to TOML job file
    #[arg(value_name = "JOB")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate the job file and show what would be crawled without crawling
    #[arg(long)]
    dry_run: bool,

    /// Write records here instead of the job's output path
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Record format: json or csv (inferred from the output path by default)
    #[arg(long, value_name = "FORMAT")]
    format: Option<OutputFormat>,

    /// Write the list of failed URLs as JSON
    #[arg(long, value_name = "PATH")]
    failures: Option<PathBuf>,

    /// Write a markdown crawl summary
    #[arg(long, value_name = "PATH")]
    summary: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading job from: {}", cli.config.display());
    let (mut config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load job file {}", cli.config.display()))?;
    tracing::info!("Job loaded successfully (hash: {})", config_hash);

    // Command-line flags override the job file
    if let Some(path) = cli.output {
        config.output.path = Some(path);
    }
    if let Some(format) = cli.format {
        config.output.format = Some(format);
    }
    if let Some(path) = cli.failures {
        config.output.failures_path = Some(path);
    }
    if let Some(path) = cli.summary {
        config.output.summary_path = Some(path);
    }

    if cli.dry_run {
        handle_dry_run(&config);
        return Ok(());
    }

    handle_crawl(config, config_hash, cli.quiet).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("harvest_crawl=info,warn"),
            1 => EnvFilter::new("harvest_crawl=debug,info"),
            2 => EnvFilter::new("harvest_crawl=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    // Logs go to stderr so records written to stdout stay clean
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: validates the job and shows what would be crawled
fn handle_dry_run(config: &Config) {
    println!("=== Harvest-Crawl Dry Run ===\n");

    println!("Fetch:");
    println!("  User agent: {}", config.fetch.user_agent);
    println!("  Requests per second: {}", config.fetch.requests_per_second);
    println!("  Timeout: {:?}", config.fetch.timeout());
    println!(
        "  Retries: {} attempts, {}ms initial delay, x{} backoff",
        config.fetch.max_attempts, config.fetch.initial_delay_ms, config.fetch.backoff_factor
    );
    if !config.fetch.retry_statuses.is_empty() {
        println!("  Retryable statuses: {:?}", config.fetch.retry_statuses);
    }
    println!("  Cache TTL: {}s", config.fetch.cache_ttl_secs);
    for (name, value) in &config.fetch.headers {
        println!("  Header: {}: {}", name, value);
    }

    println!("\nEngine:");
    println!("  Concurrency: {}", config.engine.concurrency);
    println!("  Boundary: {:?}", config.engine.boundary);
    for pattern in &config.engine.allowed_domains {
        println!("    * {}", pattern);
    }
    println!("  Annotate source: {}", config.engine.annotate_source);

    println!("\nCrawl ({}):", config.crawl.mode_name());
    match &config.crawl {
        CrawlConfig::Pagination {
            start_url,
            next_selector,
            max_pages,
            ..
        } => {
            println!("  Start URL: {}", start_url);
            println!("  Next link: {}", next_selector);
            println!("  Max pages: {}", max_pages);
        }
        CrawlConfig::ListDetail {
            list_url,
            item_selector,
            link_selector,
            max_items,
            ..
        } => {
            println!("  List URL: {}", list_url);
            println!("  Items: {}", item_selector);
            println!("  Detail link: {}", link_selector);
            println!("  Max items: {}", max_items);
        }
    }

    let schema = config.crawl.schema();
    if let Some(scope) = &schema.scope {
        println!("  Scope: {}", scope);
    }
    if let Some(table) = &schema.table {
        println!("  Table: {}", table);
    }
    for field in &schema.fields {
        let source = match (field.source, field.selector.as_deref()) {
            (Some(kind), _) => format!("({:?})", kind).to_lowercase(),
            (None, Some(selector)) => selector.to_string(),
            (None, None) => "(nested)".to_string(),
        };
        println!("  Field '{}': {}", field.name, source);
    }

    println!("\nOutput:");
    match &config.output.path {
        Some(path) => println!(
            "  Records: {} ({})",
            path.display(),
            config.output.resolved_format()
        ),
        None => println!("  Records: stdout ({})", config.output.resolved_format()),
    }
    if let Some(path) = &config.output.failures_path {
        println!("  Failures: {}", path.display());
    }
    if let Some(path) = &config.output.summary_path {
        println!("  Summary: {}", path.display());
    }

    println!("\n✓ Job is valid");
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, config_hash: String, quiet: bool) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();

    // Ctrl-C stops the crawl; whatever was collected is still written
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping crawl");
            interrupt.cancel();
        }
    });

    let started_at = Utc::now();
    let report = run_job(&config, &cancel).await.context("Failed to start crawl")?;

    let format = config.output.resolved_format();
    match &config.output.path {
        Some(path) => write_records(report.records(), path, format)
            .with_context(|| format!("Failed to write records to {}", path.display()))?,
        None => {
            let stdout = std::io::stdout();
            let mut lock = stdout.lock();
            write_records_to(report.records(), &mut lock, format)
                .context("Failed to write records to stdout")?;
        }
    }

    if let Some(path) = &config.output.failures_path {
        write_failures(report.failures(), path)
            .with_context(|| format!("Failed to write failures to {}", path.display()))?;
    }

    let summary = CrawlSummary::from_report(&report, config.crawl.seed_url(), started_at)
        .with_config_hash(config_hash);

    if let Some(path) = &config.output.summary_path {
        generate_markdown_summary(&summary, path)
            .with_context(|| format!("Failed to write summary to {}", path.display()))?;
        tracing::info!("Summary written to {}", path.display());
    }

    // Records on stdout must not be mixed with the summary
    if !quiet && config.output.path.is_some() {
        print_summary(&summary);
    }

    match report.status() {
        CrawlStatus::FatalSeedFailure => bail!(
            "Seed URL {} could not be fetched",
            config.crawl.seed_url()
        ),
        CrawlStatus::Cancelled => {
            tracing::warn!("Crawl cancelled; partial results were written");
            Ok(())
        }
        CrawlStatus::Completed => {
            tracing::info!("Crawl completed successfully");
            Ok(())
        }
    }
}
