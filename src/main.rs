//! sheetcache - cached, rate-limited Google Sheets reads
//!
//! Main entry point for the sheetcache CLI.

use anyhow::Context;
use clap::{Parser, Subcommand};
use sheetcache::cache::{CacheBackend, CacheStore, ClearScope, MemoryBackend, SqliteBackend};
use sheetcache::clock::{Clock, SystemClock};
use sheetcache::config::{validate_config, validate_config_result, SheetCacheConfig};
use sheetcache::fetcher::{Fetcher, FetcherConfig};
use sheetcache::ratelimit::RateLimiter;
use sheetcache::scheduler::{Scheduler, SchedulerConfig};
use sheetcache::sheet::{CacheKey, Category};
use sheetcache::transport::GoogleSheetsTransport;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

/// sheetcache - fetch and cache dashboard data from Google Sheets
#[derive(Parser, Debug)]
#[command(name = "sheetcache")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: ~/.config/sheetcache/config.yaml)
    #[arg(short, long, env = "SHEETCACHE_CONFIG")]
    config: Option<PathBuf>,

    /// Keep the cache in memory for this run only
    #[arg(long)]
    no_persist: bool,

    /// Print Prometheus metrics after the command finishes
    #[arg(long)]
    emit_metrics: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a starter configuration
    Init {
        /// Overwrite an existing configuration
        #[arg(long)]
        force: bool,
    },

    /// Check the configuration for problems
    Validate,

    /// Fetch one sheet (served from cache while fresh)
    Fetch {
        /// Sheet key (e.g. vip_my)
        sheet: String,

        /// Category (defaults to the sheet's configured category)
        #[arg(short = 'k', long)]
        category: Option<Category>,

        /// Skip the freshness check and read from the remote
        #[arg(short, long)]
        refresh: bool,
    },

    /// Fetch every configured sheet
    FetchAll {
        /// Skip the freshness check and read from the remote
        #[arg(short, long)]
        refresh: bool,
    },

    /// Remove cached entries now
    ClearCache {
        /// Only this sheet (all sheets when omitted)
        sheet: Option<String>,

        /// Only this category of the sheet
        #[arg(short = 'k', long, requires = "sheet")]
        category: Option<Category>,
    },

    /// Remove entries older than the retention ceiling
    Sweep,

    /// Show cache and rate limiter statistics
    Stats,

    /// Probe the Sheets API with a one-cell read
    Check {
        /// Only this sheet (all sheets when omitted)
        sheet: Option<String>,
    },

    /// Show when the next scheduled refresh runs
    NextRefresh,

    /// Run scheduled refreshes and sweeps until interrupted
    Serve,
}

fn main() {
    // Initialize logging
    if let Err(e) = sheetcache::logging::init() {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(SheetCacheConfig::default_path);

    if let Commands::Init { force } = cli.command {
        return handle_init_command(&config_path, force);
    }

    let config = SheetCacheConfig::load(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    if let Commands::Validate = cli.command {
        return handle_validate_command(&config);
    }
    if let Commands::NextRefresh = cli.command {
        return handle_next_refresh_command(&config);
    }

    validate_config_result(&config)?;

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    runtime.block_on(run_async(cli.command, config, cli.no_persist))?;

    if cli.emit_metrics {
        print!("{}", sheetcache::metrics::encode_metrics());
    }
    Ok(())
}

async fn run_async(
    command: Commands,
    config: SheetCacheConfig,
    no_persist: bool,
) -> anyhow::Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let fetcher = Arc::new(build_fetcher(&config, no_persist, clock.clone())?);

    match command {
        Commands::Fetch {
            sheet,
            category,
            refresh,
        } => {
            let category = match category {
                Some(category) => category,
                None => fetcher
                    .sheet(&sheet)
                    .map(|s| s.category)
                    .ok_or_else(|| sheetcache::SheetCacheError::UnknownSheet(sheet.clone()))?,
            };
            let outcome = if refresh {
                fetcher.force_refresh(&sheet, category).await
            } else {
                fetcher.fetch(&sheet, category).await
            };
            print_json(&outcome)?;
        }
        Commands::FetchAll { refresh } => {
            let results = if refresh {
                fetcher.refresh_all().await
            } else {
                fetcher.fetch_all().await
            };
            let mut by_sheet = serde_json::Map::new();
            for (sheet, outcome) in results {
                by_sheet.insert(sheet, serde_json::to_value(outcome)?);
            }
            print_json(&by_sheet)?;
        }
        Commands::ClearCache { sheet, category } => {
            let scope = match (sheet, category) {
                (Some(sheet), Some(category)) => ClearScope::Key(CacheKey::new(sheet, category)),
                (Some(sheet), None) => ClearScope::Sheet(sheet),
                (None, _) => ClearScope::All,
            };
            let removed = fetcher.clear_cache(&scope);
            println!("Removed {} cache entries", removed);
        }
        Commands::Sweep => {
            let removed = fetcher.sweep();
            println!(
                "Removed {} entries older than {}s",
                removed, config.cache.retention_secs
            );
        }
        Commands::Stats => {
            print_json(&fetcher.stats().await)?;
        }
        Commands::Check { sheet } => {
            let checks = match sheet {
                Some(sheet) => vec![fetcher.check_connection(&sheet).await],
                None => fetcher.check_all_connections().await,
            };
            print_json(&checks)?;
            let failed = checks.iter().filter(|c| !c.ok).count();
            if failed > 0 {
                anyhow::bail!("{} of {} sheets unreachable", failed, checks.len());
            }
        }
        Commands::Serve => {
            let scheduler_config = SchedulerConfig::from_config(&config)?;
            let mut scheduler = Scheduler::new(scheduler_config, fetcher.clone(), clock);
            match scheduler.next_refresh() {
                Some(next) => println!(
                    "Serving {} sheets; next refresh at {}",
                    fetcher.sheets().len(),
                    next
                ),
                None => println!(
                    "Serving {} sheets; scheduled refresh disabled",
                    fetcher.sheets().len()
                ),
            }
            scheduler.run().await?;
        }
        Commands::Init { .. } | Commands::Validate | Commands::NextRefresh => {}
    }

    Ok(())
}

fn build_fetcher(
    config: &SheetCacheConfig,
    no_persist: bool,
    clock: Arc<dyn Clock>,
) -> anyhow::Result<Fetcher> {
    let backend: Arc<dyn CacheBackend> = if no_persist {
        Arc::new(MemoryBackend::new())
    } else {
        Arc::new(
            SqliteBackend::open(config.cache.sqlite_config())
                .with_context(|| format!("Failed to open cache at {}", config.cache.path.display()))?,
        )
    };
    let cache = CacheStore::new(backend, clock, config.cache.ttl());
    let limiter = RateLimiter::new(config.rate_limit.limiter_config());
    let transport = GoogleSheetsTransport::from_settings(&config.transport)?;
    if !transport.is_authenticated() {
        tracing::warn!(
            "No credentials found; set SHEETCACHE_ACCESS_TOKEN or SHEETCACHE_API_KEY"
        );
    }

    Ok(Fetcher::new(
        FetcherConfig::from(config),
        Arc::new(cache),
        Arc::new(limiter),
        Arc::new(transport),
    ))
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn handle_init_command(config_file: &Path, force: bool) -> anyhow::Result<()> {
    if config_file.exists() && !force {
        println!("Configuration already exists at {}", config_file.display());
        println!("Use --force to overwrite it.");
        return Ok(());
    }

    let config = SheetCacheConfig::sample();
    config.save(config_file)?;

    println!("✓ Created configuration at {}", config_file.display());
    println!();
    println!("Next steps:");
    println!("  1. Replace the placeholder spreadsheet ids");
    println!("  2. Export SHEETCACHE_ACCESS_TOKEN (or SHEETCACHE_API_KEY)");
    println!("  3. Check connectivity:");
    println!("     sheetcache check");
    Ok(())
}

fn handle_validate_command(config: &SheetCacheConfig) -> anyhow::Result<()> {
    match validate_config(config) {
        Ok(()) => {
            println!("✓ Configuration is valid ({} sheets)", config.sheets.len());
            Ok(())
        }
        Err(errors) => {
            for error in &errors {
                println!("  ✗ {}", error);
            }
            anyhow::bail!("{} configuration problem(s)", errors.len())
        }
    }
}

fn handle_next_refresh_command(config: &SheetCacheConfig) -> anyhow::Result<()> {
    let scheduler_config = SchedulerConfig::from_config(config)?;
    if !scheduler_config.refresh_enabled {
        println!("Scheduled refresh is disabled");
        return Ok(());
    }
    let now = SystemClock.now();
    match sheetcache::scheduler::next_refresh_after(
        now,
        &scheduler_config.refresh_times,
        scheduler_config.offset,
    ) {
        Some(next) => println!(
            "Next refresh at {} ({} UTC)",
            next.with_timezone(&scheduler_config.offset),
            next
        ),
        None => println!("No refresh times configured"),
    }
    Ok(())
}
