use anyhow::{Context, Result};
use chrono::Local;

use nba_warehouse::Warehouse;
use nba_warehouse::config::{self, LoaderConfig};
use nba_warehouse::pipeline::{self, LoadBatch};
use nba_warehouse::telemetry;

/// Command-line flags and the environment keys they override.
const FLAG_OVERRIDES: &[(&str, &str)] = &[
    ("--db", "NBA_WAREHOUSE_DB"),
    ("--raw-dir", "NBA_RAW_DIR"),
    ("--days-back", "NBA_DAYS_BACK"),
];

fn main() -> Result<()> {
    config::load_dotenv();
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let config = LoaderConfig::from_lookup(|key| {
        FLAG_OVERRIDES
            .iter()
            .find(|(_, env_key)| *env_key == key)
            .and_then(|(flag, _)| flag_value(&args, flag))
            .or_else(|| std::env::var(key).ok())
    })
    .context("unable to resolve loader configuration")?;
    telemetry::init_tracing(&config.log_filter)?;

    let mut warehouse = Warehouse::open(&config.db_path)?;
    let report = warehouse.ensure_schema()?;

    println!("Warehouse: {}", config.db_path.display());
    if !report.created.is_empty() {
        println!("Tables created: {}", report.created.join(", "));
    }
    for drift in &report.drifted {
        println!(
            "Schema drift in {}: missing {}",
            drift.table,
            drift.missing_columns.join(", ")
        );
    }

    let Some(raw_dir) = config.raw_dir.as_deref() else {
        println!("No raw directory configured (NBA_RAW_DIR or --raw-dir); schema ensured only");
        warehouse.close()?;
        return Ok(());
    };

    let mut batch = LoadBatch::from_raw_dir(raw_dir)?;
    let dropped = batch.retain_recent(Local::now().date_naive(), config.days_back);
    println!("Raw dir: {}", raw_dir.display());
    println!(
        "Records: {} (rows of games older than {} days dropped: {dropped})",
        batch.len(),
        config.days_back
    );

    let summary = pipeline::run_load(&mut warehouse, &batch)?;
    println!("Load complete");
    println!("{summary}");
    warehouse.close()?;
    Ok(())
}

fn flag_value(args: &[String], flag: &str) -> Option<String> {
    for (idx, arg) in args.iter().enumerate() {
        if let Some(value) = arg
            .strip_prefix(flag)
            .and_then(|rest| rest.strip_prefix('='))
        {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        if arg == flag
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
        {
            return Some(next.clone());
        }
    }
    None
}
