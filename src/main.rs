use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use promo_tracker::config::{CONFIG_ENV, DB_PATH_ENV, DEFAULT_CONFIG_FILE, DEFAULT_DATABASE_PATH};
use promo_tracker::{
    AppConfig, IngestStatus, Pipeline, ReconciliationEngine, ResultAggregator, ScrapeOrchestrator,
    SqliteStorage,
};

/// Book promotion tracker
#[derive(Parser, Debug)]
#[command(name = "promo-tracker")]
#[command(about = "Scrape bookstore promotions and keep their price history")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one scrape + reconcile cycle
    Ingest {
        /// TOML config file
        #[arg(short, long, env = CONFIG_ENV, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,

        /// SQLite database (overrides the config file)
        #[arg(long, env = DB_PATH_ENV)]
        db: Option<PathBuf>,
    },

    /// Every listing with its current price
    Latest {
        #[arg(long, env = DB_PATH_ENV, default_value = DEFAULT_DATABASE_PATH)]
        db: PathBuf,
    },

    /// Price history of one listing
    History {
        /// Listing hyperlink
        hyperlink: String,

        #[arg(long, env = DB_PATH_ENV, default_value = DEFAULT_DATABASE_PATH)]
        db: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "promo_tracker=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Ingest { config, db } => run_ingest(&config, db).await,
        Command::Latest { db } => run_latest(&db),
        Command::History { hyperlink, db } => run_history(&db, &hyperlink),
    }
}

async fn run_ingest(config_path: &Path, db: Option<PathBuf>) -> Result<()> {
    println!("🕷️  Ingest cycle");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let config = AppConfig::load(config_path)
        .with_context(|| format!("Failed to load config {}", config_path.display()))?
        .with_database_override(db);

    let mut storage = SqliteStorage::open(&config.database_path)
        .with_context(|| format!("Failed to open database {}", config.database_path.display()))?;

    let mut orchestrator =
        ScrapeOrchestrator::new(ResultAggregator::new(), config.orchestrator_config());
    orchestrator.register_all(config.build_jobs().context("Failed to build feed jobs")?);
    println!("📂 {} feed(s) registered", orchestrator.job_count());

    let engine = ReconciliationEngine::with_parser(config.price_parser());
    let mut pipeline = Pipeline::new(orchestrator, engine).with_policy(config.parse_error_policy);

    let report = pipeline
        .ingest_cycle(&mut storage)
        .await
        .context("Ingest cycle failed")?;

    for job in &report.jobs {
        match &job.error {
            None => println!(
                "  ✓ {:<20} {:>5} records  {:>6} ms",
                job.job, job.records, job.elapsed_ms
            ),
            Some(err) => println!("  ✗ {:<20} {}", job.job, err),
        }
    }
    for skipped in &report.skipped {
        println!("  ⚠️  skipped {} ({})", skipped.hyperlink, skipped.reason);
    }

    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    let marker = match report.status {
        IngestStatus::Success => "✅",
        IngestStatus::PartialSuccess => "⚠️ ",
        IngestStatus::Failure => "❌",
    };
    println!("{} {}", marker, report.summary());

    Ok(())
}

fn run_latest(db: &Path) -> Result<()> {
    let storage = SqliteStorage::open(db)
        .with_context(|| format!("Failed to open database {}", db.display()))?;
    let snapshots = storage.latest_listings().context("Failed to load listings")?;

    println!("📚 {} listing(s)", snapshots.len());
    for snap in &snapshots {
        let promo = if snap.current.is_promotional() { "🔥" } else { "  " };
        println!(
            "{} {:<40} {:<25} {:<12} {:>9} {:>9} {}",
            promo,
            snap.book.title,
            snap.book.author,
            snap.bookstore.name,
            snap.current.retail,
            snap.current.promotional,
            snap.current.currency
        );
    }

    Ok(())
}

fn run_history(db: &Path, hyperlink: &str) -> Result<()> {
    let storage = SqliteStorage::open(db)
        .with_context(|| format!("Failed to open database {}", db.display()))?;

    let Some(history) = storage
        .listing_history(hyperlink)
        .context("Failed to load listing history")?
    else {
        println!("❌ No listing for {}", hyperlink);
        return Ok(());
    };

    println!("📖 {} - {} @ {}", history.book.title, history.book.author, history.bookstore.name);
    println!("🔗 {}", history.listing.hyperlink);
    for point in history.prices.points() {
        println!(
            "  {}  {:>9} {:>9} {}",
            point.recorded_at.format("%Y-%m-%d %H:%M:%S"),
            point.retail,
            point.promotional,
            point.currency
        );
    }
    if let Some(lowest) = history.prices.lowest() {
        println!("⬇️  Lowest: {} {}", lowest.promotional, lowest.currency);
    }

    Ok(())
}
