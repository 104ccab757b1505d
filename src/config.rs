use std::path::PathBuf;

use anyhow::{Result, anyhow};

const APP_DIR: &str = "nba_warehouse";
const DB_FILE: &str = "nba_warehouse.sqlite";
pub const DEFAULT_DAYS_BACK: i64 = 3;
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Loader settings resolved from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderConfig {
    pub db_path: PathBuf,
    pub raw_dir: Option<PathBuf>,
    pub days_back: i64,
    pub log_filter: String,
}

impl LoaderConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let value = |key: &str| {
            lookup(key)
                .map(|raw| raw.trim().to_string())
                .filter(|raw| !raw.is_empty())
        };

        let db_path = match value("NBA_WAREHOUSE_DB") {
            Some(path) => PathBuf::from(path),
            None => default_db_path(&lookup)
                .ok_or_else(|| anyhow!("set NBA_WAREHOUSE_DB or HOME to locate the warehouse"))?,
        };
        let days_back = match value("NBA_DAYS_BACK") {
            Some(raw) => parse_days_back(&raw)?,
            None => DEFAULT_DAYS_BACK,
        };

        Ok(Self {
            db_path,
            raw_dir: value("NBA_RAW_DIR").map(PathBuf::from),
            days_back,
            log_filter: value("NBA_LOG").unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
        })
    }
}

pub fn parse_days_back(raw: &str) -> Result<i64> {
    let days = raw
        .trim()
        .parse::<i64>()
        .map_err(|_| anyhow!("days back must be a whole number, got {raw:?}"))?;
    if days < 0 {
        return Err(anyhow!("days back cannot be negative, got {days}"));
    }
    Ok(days)
}

/// Loads `.env.local` then `.env`; variables already set win.
pub fn load_dotenv() {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
}

pub fn app_cache_dir(lookup: impl Fn(&str) -> Option<String>) -> Option<PathBuf> {
    if let Some(base) = lookup("XDG_CACHE_HOME")
        && !base.trim().is_empty()
    {
        return Some(PathBuf::from(base).join(APP_DIR));
    }
    let home = lookup("HOME")?;
    if home.trim().is_empty() {
        return None;
    }
    Some(PathBuf::from(home).join(".cache").join(APP_DIR))
}

pub fn default_db_path(lookup: impl Fn(&str) -> Option<String>) -> Option<PathBuf> {
    app_cache_dir(lookup).map(|dir| dir.join(DB_FILE))
}
