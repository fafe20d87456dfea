//! Hobart CLI binary.
//!
//! Installs SEC filings into the feature store and inspects the results.

use chrono::NaiveDate;
use clap::{ArgGroup, Parser, Subcommand};
use hobart::{InstallConfig, InstallReport, Installer, StoreConfig};
use hobart_data::edgar::CompanyFactsDir;
use hobart_data::{DateRange, FiscalPeriod, SqliteStore, StoreStats};
use hobart_features::{
    FeatureSet, FeatureStore, IndustryAggregator, IndustryLevel, IndustryNormalizer, IndustryTable,
    SCHEMA_VERSION, WideTable,
};
use serde_json::{Value, json};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hobart")]
#[command(about = "Hobart: industry-relative fundamental features", long_about = None)]
#[command(version)]
struct Cli {
    /// Database file (defaults to $HOBART_DATABASE_PATH or the data directory)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Install observations, features and normalized features
    Install {
        /// Directory with facts/ and submissions/ JSON documents
        #[arg(long)]
        facts_dir: PathBuf,

        /// Restrict to these entities (repeatable)
        #[arg(long = "entity")]
        entities: Vec<String>,

        /// Install the annual set instead of the quarterly one
        #[arg(long)]
        annual: bool,

        /// Worker threads
        #[arg(long)]
        workers: Option<usize>,

        /// Industry level: 2, 3 or 4 code digits
        #[arg(long, default_value = "2")]
        level: u8,

        /// Minimum rows of every concept or feature per entity
        #[arg(long, default_value = "1")]
        min_rows: usize,

        /// Drop and recreate feature tables first
        #[arg(long)]
        recreate: bool,

        /// First filing date (YYYY-MM-DD)
        #[arg(long)]
        start: Option<NaiveDate>,

        /// Last filing date (YYYY-MM-DD)
        #[arg(long)]
        end: Option<NaiveDate>,
    },

    /// Print an entity's features
    Features {
        /// Entity identifier
        entity: String,

        /// Annual set
        #[arg(long)]
        annual: bool,

        /// Industry-normalized features
        #[arg(long)]
        normalized: bool,
    },

    /// Print industry statistics
    #[command(group(ArgGroup::new("selector").required(true).args(["entity", "code"])))]
    Industry {
        /// Industry of this entity
        #[arg(long)]
        entity: Option<String>,

        /// Industry classification code
        #[arg(long)]
        code: Option<String>,

        /// Industry level: 2, 3 or 4 code digits
        #[arg(long, default_value = "2")]
        level: u8,

        /// Annual set
        #[arg(long)]
        annual: bool,
    },

    /// Rank entities by a feature
    Rank {
        /// Feature name
        feature: String,

        /// Annual set
        #[arg(long)]
        annual: bool,

        /// Rank normalized features
        #[arg(long)]
        normalized: bool,

        /// Fiscal year (defaults to the latest)
        #[arg(long)]
        year: Option<i32>,

        /// Fiscal period: Q1-Q4 or FY (defaults to the latest)
        #[arg(long)]
        period: Option<String>,

        /// Highest values first
        #[arg(long)]
        descending: bool,

        /// Maximum entities to print
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Show row counts per table
    Stats {
        /// Output format (json or text)
        #[arg(long, default_value = "text")]
        format: String,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let store = cli.db.map_or_else(StoreConfig::from_env, StoreConfig::new);

    match cli.command {
        Commands::Install {
            facts_dir,
            entities,
            annual,
            workers,
            level,
            min_rows,
            recreate,
            start,
            end,
        } => {
            let defaults = InstallConfig::default();
            let config = InstallConfig {
                workers: workers.unwrap_or(defaults.workers),
                level: IndustryLevel::try_from(level)?,
                min_rows,
                recreate_tables: recreate,
                range: DateRange { start, end },
            };
            install(store, feature_set(annual), config, facts_dir, entities)?;
        }
        Commands::Features {
            entity,
            annual,
            normalized,
        } => {
            let db = store.open()?;
            let set = feature_set(annual);
            let table = if normalized {
                IndustryNormalizer::new(&db, set).from_refined(&entity, DateRange::all())?
            } else {
                FeatureStore::new(&db, set.table()).read(&entity, DateRange::all())?
            };
            print_wide_table(&entity, &table);
        }
        Commands::Industry {
            entity,
            code,
            level,
            annual,
        } => {
            let db = store.open()?;
            let stats = IndustryAggregator::new(&db, feature_set(annual)).aggregate(
                entity.as_deref(),
                code.as_deref(),
                IndustryLevel::try_from(level)?,
                DateRange::all(),
            )?;
            print_industry(&stats);
        }
        Commands::Rank {
            feature,
            annual,
            normalized,
            year,
            period,
            descending,
            limit,
        } => {
            let db = store.open()?;
            let set = feature_set(annual);
            let table = if normalized {
                set.normalized_table()
            } else {
                set.table()
            };
            let period = period.as_deref().map(FiscalPeriod::parse).transpose()?;
            let ranked = FeatureStore::new(&db, table).entities_sorted_by(
                &feature,
                year,
                period,
                !descending,
            )?;

            println!("\n{} ({})", feature, table);
            println!("─────────────────────────────────────────────────────────────");
            for (rank, entity) in ranked.iter().take(limit).enumerate() {
                println!("  {:>4}. {}", rank + 1, entity);
            }
            println!("\n{} entities ranked", ranked.len());
        }
        Commands::Stats { format } => {
            let db = store.open()?;
            print_stats(&store, &db, &format)?;
        }
    }

    Ok(())
}

const fn feature_set(annual: bool) -> FeatureSet {
    if annual {
        FeatureSet::Annual
    } else {
        FeatureSet::Quarterly
    }
}

fn install(
    store: StoreConfig,
    set: FeatureSet,
    config: InstallConfig,
    facts_dir: PathBuf,
    entities: Vec<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let source = CompanyFactsDir::new(&facts_dir);
    let entities = if entities.is_empty() {
        source.entities()?
    } else {
        entities
    };

    println!("\n╔══════════════════════════════════════════════════════════════╗");
    println!("║{:^62}║", format!("INSTALL {} FEATURES", set.to_string().to_uppercase()));
    println!("╚══════════════════════════════════════════════════════════════╝\n");
    println!("Database: {}", store.path.display());
    println!("Source:   {}", facts_dir.display());
    println!("Entities: {}", entities.len());
    println!("Workers:  {}", config.workers);
    println!("Level:    {} digits\n", config.level);

    let installer = Installer::new(store, set, config)?;

    let report = stage("Loading observations", || {
        installer.install_observations(&source, &entities)
    })?;
    print_report("Observations", &report);

    let report = stage("Refining features", || {
        installer.install_features(Some(entities.as_slice()))
    })?;
    print_report("Features", &report);

    let report = stage("Normalizing against industries", || {
        installer.install_normalized(Some(entities.as_slice()))
    })?;
    print_report("Normalized", &report);

    Ok(())
}

/// Run one install stage behind a spinner.
fn stage<F>(message: &'static str, f: F) -> hobart::Result<InstallReport>
where
    F: FnOnce() -> hobart::Result<InstallReport>,
{
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg} [{elapsed}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));

    let result = f();
    match &result {
        Ok(report) => pb.finish_with_message(format!(
            "{}: {}/{} entities",
            message, report.installed, report.attempted
        )),
        Err(_) => pb.finish_with_message(format!("{}: failed", message)),
    }
    result
}

fn print_report(label: &str, report: &InstallReport) {
    println!(
        "  {:<14} installed {:>6}  skipped {:>6}  rows {:>10}",
        label, report.installed, report.skipped, report.rows
    );
}

fn print_wide_table(entity: &str, table: &WideTable) {
    println!("\n{}: {} periods\n", entity, table.height());

    for (i, key) in table.index().iter().enumerate() {
        println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        println!("{}", key);
        println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        for name in table.column_names() {
            match table.get(i, name) {
                Some(value) => println!("  {:<36} {:>14.4}", name, value),
                None => println!("  {:<36} {:>14}", name, "-"),
            }
        }
    }
}

fn print_industry(table: &IndustryTable) {
    println!("\nIndustry {}: {} statistics\n", table.code(), table.len());
    println!(
        "{:<6} {:<4} {:<36} {:>12} {:>12} {:>6}",
        "Year", "FP", "Feature", "Mean", "Std", "N"
    );
    println!("─────────────────────────────────────────────────────────────────────────────────");
    for stat in table.stats() {
        let std = stat
            .std
            .map_or_else(|| "-".to_string(), |s| format!("{:.4}", s));
        println!(
            "{:<6} {:<4} {:<36} {:>12.4} {:>12} {:>6}",
            stat.fiscal_year, stat.fiscal_period, stat.name, stat.mean, std, stat.count
        );
    }
}

fn print_stats(
    config: &StoreConfig,
    store: &SqliteStore,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let stats = store.get_stats()?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&stats_json(&stats)?)?);
        return Ok(());
    }

    println!("\nDatabase: {}", config.path.display());
    println!("  Feature schema: v{}", SCHEMA_VERSION);
    println!("  Submissions:  {}", stats.submissions);
    println!("  Observations: {}", stats.observations);
    println!("\n{:<28} {:>12} {:>10}", "Table", "Rows", "Entities");
    println!("─────────────────────────────────────────────────────");
    for table in &stats.features {
        println!(
            "{:<28} {:>12} {:>10}",
            table.table.to_string(),
            table.rows,
            table.entities
        );
    }
    Ok(())
}

/// Store statistics tagged with the feature schema version.
fn stats_json(stats: &StoreStats) -> serde_json::Result<Value> {
    let mut value = serde_json::to_value(stats)?;
    value["schema_version"] = json!(SCHEMA_VERSION);
    Ok(value)
}
