//! trendscan CLI: sync, screen and query commands.
//!
//! Commands:
//! - `sync`: fetch missing daily bars from Alpaca into the SQLite store
//! - `screen`: evaluate the trend template over every stored instrument
//! - `watchlist`: instruments whose latest criteria row signals
//! - `history`: stored bars for one instrument
//! - `criteria`: screened rows (bars, indicators, flags) for one instrument
//! - `assets`: stored symbols grouped by exchange
//! - `skipped`: contents of the skip list
//! - `import-archive`: load the CSV archive back into the store

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use trendscan_core::calendar;
use trendscan_core::config::{AppConfig, Credentials};
use trendscan_core::data::{AlpacaProvider, BarArchive, CircuitBreaker, SkipList, Universe};
use trendscan_core::domain::AssetKey;
use trendscan_core::screen::TrendTemplate;
use trendscan_runner::{
    assets_by_exchange, criteria_history, first_signal_date, history, import_archive, run_screen, watchlist,
    SqliteStore, SyncError, SyncOrchestrator,
};

#[derive(Parser)]
#[command(
    name = "trendscan",
    about = "trendscan: incremental market data sync and trend-template screener"
)]
struct Cli {
    /// Path to a TOML config file. Built-in defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch missing bars for every instrument in the universe.
    Sync {
        /// Universe file. Overrides `paths.universe`.
        #[arg(long)]
        universe: Option<PathBuf>,

        /// Treat this date (YYYY-MM-DD) as today. Defaults to the UTC date.
        #[arg(long)]
        today: Option<String>,

        /// Skip the CSV archive even if one is configured.
        #[arg(long, default_value_t = false)]
        no_archive: bool,
    },
    /// Evaluate the trend template and store criteria rows.
    Screen,
    /// List instruments currently passing the trend template.
    Watchlist,
    /// Print stored bars for one instrument.
    History {
        /// Exchange, e.g. NASDAQ or CRYPTO.
        exchange: String,

        /// Symbol, e.g. AAPL or BTC/USD.
        symbol: String,

        /// Only print the last N bars.
        #[arg(long)]
        last: Option<usize>,
    },
    /// Print screened criteria rows for one instrument.
    Criteria {
        /// Exchange, e.g. NASDAQ or CRYPTO.
        exchange: String,

        /// Symbol, e.g. AAPL or BTC/USD.
        symbol: String,

        /// Only print the last N rows.
        #[arg(long)]
        last: Option<usize>,
    },
    /// List stored symbols grouped by exchange.
    Assets,
    /// List instruments on the skip list.
    Skipped,
    /// Load every archived CSV file into the store.
    ImportArchive {
        /// Archive directory. Overrides `paths.archive_dir`.
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "trendscan=info,trendscan_core=info,trendscan_runner=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())
        .with_context(|| match &cli.config {
            Some(p) => format!("loading config {}", p.display()),
            None => "loading default config".to_string(),
        })?;

    match cli.command {
        Commands::Sync {
            universe,
            today,
            no_archive,
        } => run_sync(&config, universe, today, no_archive),
        Commands::Screen => run_screen_cmd(&config),
        Commands::Watchlist => {
            let store = open_store(&config)?;
            print_json(&watchlist(&store)?)
        }
        Commands::History {
            exchange,
            symbol,
            last,
        } => run_history(&config, AssetKey::new(exchange, symbol), last),
        Commands::Criteria {
            exchange,
            symbol,
            last,
        } => run_criteria(&config, AssetKey::new(exchange, symbol), last),
        Commands::Assets => {
            let store = open_store(&config)?;
            print_json(&assets_by_exchange(&store)?)
        }
        Commands::Skipped => {
            let skip_list = SkipList::load(&config.paths.skip_list)?;
            let keys: Vec<&AssetKey> = skip_list.iter().collect();
            print_json(&keys)
        }
        Commands::ImportArchive { dir } => {
            let Some(root) = dir.or_else(|| config.paths.archive_dir.clone()) else {
                bail!("no archive directory: pass --dir or set paths.archive_dir");
            };
            let mut store = open_store(&config)?;
            let report = import_archive(&BarArchive::new(root), &mut store)?;
            print_json(&report)
        }
    }
}

fn open_store(config: &AppConfig) -> Result<SqliteStore> {
    SqliteStore::open(&config.store)
        .with_context(|| format!("opening store {}", config.store.path.display()))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run_sync(
    config: &AppConfig,
    universe_path: Option<PathBuf>,
    today: Option<String>,
    no_archive: bool,
) -> Result<()> {
    let today = today
        .as_deref()
        .map(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d"))
        .transpose()
        .context("--today must be YYYY-MM-DD")?
        .unwrap_or_else(calendar::today_utc);

    let universe_path = universe_path.unwrap_or_else(|| config.paths.universe.clone());
    let universe = Universe::from_file(&universe_path)?;

    let credentials = Credentials::from_env()?;
    let breaker = Arc::new(CircuitBreaker::new(
        Duration::from_secs(config.provider.breaker_cooldown_secs),
        config.provider.breaker_threshold,
    ));
    let provider = AlpacaProvider::new(config.provider.clone(), credentials, breaker)?;

    let mut store = open_store(config)?;
    let mut skip_list = SkipList::load(&config.paths.skip_list)?;
    let archive = match (&config.paths.archive_dir, no_archive) {
        (Some(dir), false) => Some(BarArchive::new(dir.clone())),
        _ => None,
    };

    let mut orchestrator = SyncOrchestrator::new(&provider, &mut store, &mut skip_list, &config.sync);
    if let Some(archive) = &archive {
        orchestrator = orchestrator.with_archive(archive);
    }

    match orchestrator.run(&universe, today) {
        Ok(report) => print_json(&report),
        Err(SyncError::NeedsTriage { exchange, symbol }) => bail!(
            "{exchange}:{symbol} returned no data for a full backfill. It was added to {} and \
             the run stopped. Check the symbol, then remove it from the skip list to retry.",
            config.paths.skip_list.display()
        ),
        Err(e) => Err(e.into()),
    }
}

fn run_screen_cmd(config: &AppConfig) -> Result<()> {
    let mut store = open_store(config)?;
    let template = TrendTemplate::new(config.screen.clone());
    let report = run_screen(&mut store, &template)?;
    print_json(&report)
}

fn run_history(config: &AppConfig, key: AssetKey, last: Option<usize>) -> Result<()> {
    let store = open_store(config)?;
    let bars = history(&store, &key)?;
    if bars.is_empty() {
        bail!("no stored bars for {key}");
    }
    let since = first_signal_date(&store, &key)?;
    if let Some(date) = since {
        tracing::info!(%key, %date, "latest signal run started");
    }
    let from = last.map_or(0, |n| bars.len().saturating_sub(n));
    print_json(&bars[from..])
}

fn run_criteria(config: &AppConfig, key: AssetKey, last: Option<usize>) -> Result<()> {
    let store = open_store(config)?;
    let rows = criteria_history(&store, &key)?;
    if rows.is_empty() {
        bail!("no criteria rows for {key}; run `trendscan screen` first");
    }
    let from = last.map_or(0, |n| rows.len().saturating_sub(n));
    print_json(&rows[from..])
}
