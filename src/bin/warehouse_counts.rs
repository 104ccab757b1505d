use std::path::PathBuf;

use anyhow::{Context, Result};

use nba_warehouse::Warehouse;
use nba_warehouse::config::{self, LoaderConfig};

fn main() -> Result<()> {
    config::load_dotenv();
    let db_path = match parse_db_path_arg() {
        Some(path) => path,
        None => {
            LoaderConfig::from_env()
                .context("unable to resolve sqlite path")?
                .db_path
        }
    };
    if !db_path.exists() {
        println!("No warehouse at {}", db_path.display());
        return Ok(());
    }

    let mut warehouse = Warehouse::open(&db_path)?;
    println!("DB: {}", db_path.display());
    let counts = warehouse.table_counts()?;
    for (table, count) in &counts {
        println!("{table:<32} {count:>10}");
    }
    if counts.iter().any(|(table, _)| table == "etl_runs")
        && let Some(run_id) = warehouse.last_run_id()?
    {
        println!("Last run: {run_id}");
    }
    warehouse.close()?;
    Ok(())
}

fn parse_db_path_arg() -> Option<PathBuf> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    for (idx, arg) in args.iter().enumerate() {
        if let Some(path) = arg.strip_prefix("--db=") {
            let trimmed = path.trim();
            if !trimmed.is_empty() {
                return Some(PathBuf::from(trimmed));
            }
        }
        if arg == "--db"
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
        {
            return Some(PathBuf::from(next));
        }
    }
    None
}
