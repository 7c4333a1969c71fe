//! Cite-Ripple main entry point
//!
//! This is the command-line interface for the Cite-Ripple citation harvester.

use anyhow::{anyhow, bail, Context};
use cite_ripple::affiliation::AffiliationEntity;
use cite_ripple::config::{load_config_with_hash, Config};
use cite_ripple::crawler::{CitationGraphCrawler, CrawlStats, SearchFilter, REFRESH_LIMIT};
use cite_ripple::gateway::EntrezClient;
use cite_ripple::storage::{open_storage, RunStatus, SqliteStorage, Store};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

/// Number of per-item errors listed after a crawl
const ERRORS_SHOWN: usize = 20;

/// Cite-Ripple: a polite citation graph harvester
///
/// Cite-Ripple pulls article metadata and citation links from the NCBI
/// E-utilities within their rate limits, deduplicates author affiliations,
/// and stores the resulting citation graph in SQLite.
#[derive(Parser, Debug)]
#[command(name = "cite-ripple")]
#[command(version)]
#[command(about = "A polite citation graph harvester", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Numeric article ID to crawl from (repeatable)
    #[arg(long = "seed", value_name = "ID", conflicts_with = "keyword")]
    seeds: Vec<String>,

    /// Search term whose hits seed the crawl
    #[arg(long, value_name = "TERM")]
    keyword: Option<String>,

    /// Maximum number of search hits to use
    #[arg(long, value_name = "N", requires = "keyword")]
    max_results: Option<usize>,

    /// Number of citation levels to expand (overrides the config)
    #[arg(long, value_name = "N", conflicts_with = "unbounded")]
    max_depth: Option<u32>,

    /// Expand until no new articles appear, bounded only by max-processed
    #[arg(long)]
    unbounded: bool,

    /// Store search hits without following their references
    #[arg(long, requires = "keyword")]
    no_references: bool,

    /// Only hits published on or after DATE (YYYY/MM/DD)
    #[arg(long, value_name = "DATE", requires = "keyword")]
    date_from: Option<String>,

    /// Only hits published on or before DATE (YYYY/MM/DD)
    #[arg(long, value_name = "DATE", requires = "keyword")]
    date_to: Option<String>,

    /// Only hits of this publication type (repeatable)
    #[arg(long = "publication-type", value_name = "TYPE", requires = "keyword")]
    publication_types: Vec<String>,

    /// Only hits in this language (repeatable)
    #[arg(long = "language", value_name = "LANG", requires = "keyword")]
    languages: Vec<String>,

    /// Only hits from this journal abbreviation (repeatable)
    #[arg(long = "journal", value_name = "TITLE", requires = "keyword")]
    journals: Vec<String>,

    /// Only hits by this author (repeatable)
    #[arg(long = "author", value_name = "NAME", requires = "keyword")]
    authors: Vec<String>,

    /// Only hits indexed under this MeSH heading (repeatable)
    #[arg(long = "mesh", value_name = "HEADING", requires = "keyword")]
    mesh_terms: Vec<String>,

    /// Re-fetch stored articles last crawled more than DAYS days ago
    #[arg(
        long,
        value_name = "DAYS",
        conflicts_with_all = ["seeds", "keyword", "resolve_affiliation"]
    )]
    refresh_older_than: Option<u32>,

    /// Resolve an affiliation string against the stored entities and exit
    #[arg(long, value_name = "TEXT", conflicts_with_all = ["seeds", "keyword"])]
    resolve_affiliation: Option<String>,

    /// Validate config and show what would be crawled without crawling
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "seeds", "keyword", "refresh_older_than"])]
    stats: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

impl Cli {
    /// Depth bound for this invocation: CLI flags first, then the config
    fn max_depth(&self, config: &Config) -> Option<u32> {
        if self.unbounded {
            None
        } else {
            self.max_depth.or(config.crawler.max_depth)
        }
    }

    fn search_filter(&self) -> SearchFilter {
        SearchFilter {
            date_from: self.date_from.clone(),
            date_to: self.date_to.clone(),
            publication_types: self.publication_types.clone(),
            languages: self.languages.clone(),
            journals: self.journals.clone(),
            authors: self.authors.clone(),
            mesh_terms: self.mesh_terms.clone(),
        }
    }

    /// Run kind recorded in the database
    fn run_kind(&self) -> &'static str {
        if self.refresh_older_than.is_some() {
            "refresh"
        } else if self.keyword.is_some() {
            "keyword"
        } else {
            "graph"
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    // Handle different modes
    if cli.dry_run {
        handle_dry_run(&cli, &config)
    } else if cli.stats {
        handle_stats(&config)
    } else if let Some(text) = &cli.resolve_affiliation {
        handle_resolve_affiliation(&config, text)
    } else {
        handle_crawl(&cli, config, &config_hash).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("cite_ripple=info,warn"),
            1 => EnvFilter::new("cite_ripple=debug,info"),
            2 => EnvFilter::new("cite_ripple=trace,debug"),
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

fn open_shared_store(config: &Config) -> anyhow::Result<Arc<Mutex<SqliteStorage>>> {
    let storage = open_storage(Path::new(&config.output.database_path))
        .with_context(|| format!("Failed to open database {}", config.output.database_path))?;
    Ok(Arc::new(Mutex::new(storage)))
}

fn build_crawler(
    config: &Config,
    store: &Arc<Mutex<SqliteStorage>>,
) -> anyhow::Result<CitationGraphCrawler<EntrezClient, SqliteStorage>> {
    let api = EntrezClient::new(&config.gateway).context("Failed to build HTTP client")?;
    Ok(CitationGraphCrawler::from_config(
        api,
        Arc::clone(store),
        config,
    ))
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(cli: &Cli, config: &Config) -> anyhow::Result<()> {
    println!("=== Cite-Ripple Dry Run ===\n");

    println!("Crawler Configuration:");
    match cli.max_depth(config) {
        Some(depth) => println!("  Max depth: {}", depth),
        None => println!("  Max depth: unbounded"),
    }
    println!("  Max scheduled IDs: {}", config.crawler.max_processed);
    println!(
        "  Chunk size: {} (pause {}ms)",
        config.crawler.chunk_size, config.crawler.chunk_pause_ms
    );
    println!("  Detail batch size: {}", config.crawler.detail_batch_size);
    println!("  Follow cited-by: {}", config.crawler.follow_cited_by);

    println!("\nGateway:");
    println!("  Base URL: {}", config.gateway.base_url);
    println!("  Tool: {}", config.gateway.tool_name);
    println!("  Contact Email: {}", config.gateway.contact_email);
    println!(
        "  Rate: {} calls/s{}",
        config.gateway.effective_rate(),
        if config.gateway.api_key.is_some() {
            " (API key)"
        } else {
            ""
        }
    );
    println!(
        "  Retries: {} (initial delay {}ms, max {}ms)",
        config.retry.max_retries, config.retry.initial_delay_ms, config.retry.max_delay_ms
    );

    println!("\nAffiliations:");
    println!("  Match threshold: {}", config.affiliation.match_threshold);

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);

    println!("\n✓ Configuration is valid");
    if let Some(days) = cli.refresh_older_than {
        println!(
            "✓ Would refresh up to {} articles last crawled more than {} days ago",
            REFRESH_LIMIT, days
        );
    } else if let Some(term) = &cli.keyword {
        println!(
            "✓ Would search for '{}' ({} results){}",
            cli.search_filter().query(term),
            cli.max_results
                .map_or_else(|| "all".to_string(), |n| n.to_string()),
            if cli.no_references {
                ""
            } else {
                " and follow references"
            }
        );
    } else {
        println!("✓ Would start crawling from {} seeds", cli.seeds.len());
        for seed in &cli.seeds {
            println!("    * {}", seed);
        }
    }

    Ok(())
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    use cite_ripple::output::{load_statistics, print_statistics};

    println!("Database: {}\n", config.output.database_path);

    let storage = open_storage(Path::new(&config.output.database_path))?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles --resolve-affiliation: maps one string onto a stored entity
fn handle_resolve_affiliation(config: &Config, text: &str) -> anyhow::Result<()> {
    let store = open_shared_store(config)?;
    let mut crawler = build_crawler(config, &store)?;

    let id = crawler.resolve_affiliation(text)?;
    let entity = AffiliationEntity::new(text);
    let components = &entity.components;

    println!("Affiliation id: {}", id);
    println!("Normalized: {}", entity.normalized);
    for (label, value) in [
        ("Department", &components.department),
        ("Institution", &components.institution),
        ("City", &components.city),
        ("State", &components.state),
        ("Country", &components.country),
        ("Postal code", &components.postal_code),
        ("Email domain", &components.email_domain),
    ] {
        if let Some(value) = value {
            println!("  {}: {}", label, value);
        }
    }

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(cli: &Cli, config: Config, config_hash: &str) -> anyhow::Result<()> {
    if cli.keyword.is_none() && cli.seeds.is_empty() && cli.refresh_older_than.is_none() {
        bail!("Nothing to crawl: pass --seed ID, --keyword TERM or --refresh-older-than DAYS");
    }
    let max_depth = cli.max_depth(&config);

    let store = open_shared_store(&config)?;
    let mut crawler = build_crawler(&config, &store)?;

    let stop = crawler.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received; stopping at the next chunk boundary");
            stop.stop();
        }
    });

    let kind = cli.run_kind();
    let run_id = store
        .lock()
        .map_err(|_| anyhow!("Storage lock poisoned"))?
        .create_run(kind, config_hash)?;
    tracing::info!("Starting {} crawl run {}", kind, run_id);

    let result = match (&cli.keyword, cli.refresh_older_than) {
        (_, Some(days)) => crawler.refresh_stale_articles(days).await,
        (Some(term), None) => {
            crawler
                .crawl_by_filtered_keyword(
                    term,
                    &cli.search_filter(),
                    cli.max_results,
                    !cli.no_references,
                    max_depth,
                )
                .await
        }
        (None, None) => crawler.crawl_seeds(&cli.seeds, max_depth).await,
    };

    let (status, stats, failure) = match result {
        Ok(stats) if stats.stopped => (RunStatus::Interrupted, stats, None),
        Ok(stats) => (RunStatus::Completed, stats, None),
        Err(aborted) => (RunStatus::Failed, aborted.stats, Some(aborted.source)),
    };

    store
        .lock()
        .map_err(|_| anyhow!("Storage lock poisoned"))?
        .finish_run(run_id, status, &stats.totals())?;

    report(&stats);

    match failure {
        Some(source) => Err(anyhow::Error::new(source).context(format!("Crawl run {} aborted", run_id))),
        None => Ok(()),
    }
}

fn report(stats: &CrawlStats) {
    println!("=== Crawl Summary ===\n");
    println!("  Articles saved: {}", stats.articles_saved);
    println!("  Articles refreshed: {}", stats.articles_refreshed);
    println!(
        "  Edges saved: {} ({} dangling)",
        stats.edges_saved, stats.dangling_edges
    );
    println!("  Levels processed: {}", stats.levels_processed);
    println!("  IDs scheduled: {}", stats.ids_scheduled);
    println!("  Articles without DOI: {}", stats.missing_doi);
    if stats.stopped {
        println!("  Stopped early on request");
    }

    if !stats.errors.is_empty() {
        println!("\nErrors ({}):", stats.errors.len());
        for issue in stats.errors.iter().take(ERRORS_SHOWN) {
            println!("  - {}", issue);
        }
        if stats.errors.len() > ERRORS_SHOWN {
            println!("  ... and {} more", stats.errors.len() - ERRORS_SHOWN);
        }
    }
}
