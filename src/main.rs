use anyhow::{bail, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use inclusion_metrics::config::{ConnectionSettings, Settings, TableRef};
use inclusion_metrics::error::ErrorKind;
use inclusion_metrics::metrics::queries;
use inclusion_metrics::{LoadReport, MetricsCache, MetricsLoader};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "inclusion-metrics")]
#[command(about = "Formal employment inclusion metrics from the analytics warehouse")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the dashboard tables once and print them
    Load {
        /// Fully-qualified table (default: WAREHOUSE_TABLE or the gold KPI table)
        #[arg(long)]
        table: Option<String>,

        /// Print the snapshot as JSON
        #[arg(long)]
        json: bool,

        /// Exit with an error when the data could not be loaded
        #[arg(long)]
        strict: bool,
    },
    /// Reload periodically, serving from the cache while it is fresh
    Watch {
        #[arg(long)]
        table: Option<String>,

        /// Seconds between refreshes
        #[arg(long, default_value_t = 60)]
        interval_secs: u64,

        /// Stop after this many refreshes (default: run forever)
        #[arg(long)]
        iterations: Option<u64>,
    },
    /// Validate warehouse settings without connecting
    CheckConfig,
    /// Print the statements a load runs
    Queries {
        #[arg(long)]
        table: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let settings = Settings::from_env()?;

    match args.command {
        Commands::Load { table, json, strict } => {
            let table = resolve_table(&settings, table)?;
            run_load(&settings, &table, json, strict).await
        }
        Commands::Watch {
            table,
            interval_secs,
            iterations,
        } => {
            let table = resolve_table(&settings, table)?;
            run_watch(&settings, &table, interval_secs, iterations).await
        }
        Commands::CheckConfig => check_config(&settings),
        Commands::Queries { table } => {
            let table = resolve_table(&settings, table)?;
            println!("{};", queries::region_aggregate(&table));
            println!("{};", queries::occupation_detail(&table));
            Ok(())
        }
    }
}

fn resolve_table(settings: &Settings, table: Option<String>) -> Result<TableRef> {
    match table {
        Some(name) => Ok(TableRef::parse(&name)?),
        None => Ok(settings.table.clone()),
    }
}

async fn run_load(settings: &Settings, table: &TableRef, json: bool, strict: bool) -> Result<()> {
    let loader = MetricsLoader::from_options(settings.client.clone())?;
    let report = loader.load(&settings.connection, table).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report.snapshot)?);
    } else {
        print_report(&report)?;
    }

    match report.error {
        Some(e) if strict => bail!("metrics unavailable: {}", e),
        _ => Ok(()),
    }
}

async fn run_watch(
    settings: &Settings,
    table: &TableRef,
    interval_secs: u64,
    iterations: Option<u64>,
) -> Result<()> {
    let loader = MetricsLoader::from_options(settings.client.clone())?;
    let mut cache = MetricsCache::new(settings.cache_ttl);
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    let mut refreshes = 0u64;

    info!(
        table = %table,
        ttl_secs = settings.cache_ttl.as_secs(),
        interval_secs,
        "Watching dashboard metrics"
    );

    loop {
        ticker.tick().await;
        refreshes += 1;

        // Re-read every cycle. dotenv only fills variables that are still unset,
        // so values already in the environment are not replaced.
        dotenv::dotenv().ok();
        let connection = ConnectionSettings::from_env();
        let report = cache
            .load_through(&loader, &connection, table, Utc::now())
            .await;

        info!(
            refresh = refreshes,
            from_cache = report.from_cache,
            ready = report.is_ready(),
            "Metrics refreshed"
        );
        print_report(&report)?;

        if iterations.map_or(false, |max| refreshes >= max) {
            return Ok(());
        }
    }
}

fn check_config(settings: &Settings) -> Result<()> {
    let config = settings.connection.validate()?;
    println!("host:         {}", config.host());
    println!("warehouse id: {}", config.warehouse_id());
    println!("token:        {}", config.token());
    println!("table:        {}", settings.table);
    println!(
        "timeouts:     connect {:?}, request {:?}, statement {:?}",
        settings.client.connect_timeout,
        settings.client.request_timeout,
        settings.client.statement_timeout
    );
    println!("cache ttl:    {:?}", settings.cache_ttl);
    Ok(())
}

fn print_report(report: &LoadReport) -> Result<()> {
    if let Some(e) = &report.error {
        match e.kind() {
            ErrorKind::Config => println!("[WARN] Configuration incomplete ({}). Fill in the .env file.", e),
            _ => println!("[ERROR] Failed to load data: {}", e),
        }
    }

    if !report.snapshot.is_ready() {
        println!("[WARN] No data yet. Check the gold layer in the warehouse.");
        return Ok(());
    }

    let summary = &report.snapshot.summary;
    println!("\n=== National indicators ===");
    println!("Subgroup proportion:   {}", format_percent(summary.overall_proportion));
    println!("Subgroup links:        {}", format_thousands(summary.total_subgroup_count));
    println!(
        "Mean subgroup salary:  {}",
        summary
            .mean_subgroup_salary
            .map(|s| format!("{:.2}", s))
            .unwrap_or_else(|| "n/a".to_string())
    );

    println!("\n=== Regions by proportion ===");
    println!("{}", report.snapshot.regions_frame()?);

    println!("\n=== Top occupations ===");
    println!("{}", report.snapshot.occupations_frame()?);

    if report.from_cache {
        println!("(served from cache)");
    }
    Ok(())
}

fn format_percent(fraction: f64) -> String {
    format!("{:.2}%", fraction * 100.0)
}

fn format_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
