use std::collections::{HashMap, HashSet};

use anyhow::{Context, Result, anyhow};
use once_cell::sync::Lazy;
use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::advanced::{AdvancedFamily, Defensive, Efficiency, Hustle, Playmaking, ShotTracking};
use crate::upsert::ColumnSet;

pub const DIM_TEAMS: &str = "dim_teams";
pub const DIM_PLAYERS: &str = "dim_players";
pub const DIM_GAMES: &str = "dim_games";
pub const DIM_DATES: &str = "dim_dates";
pub const DIM_VENUES: &str = "dim_venues";
pub const FACT_GAME_STATS: &str = "fact_game_stats";
pub const FACT_PLAYER_GAME_STATS: &str = "fact_player_game_stats";
pub const FACT_TEAM_GAME_STATS: &str = "fact_team_game_stats";
pub const ETL_RUNS: &str = "etl_runs";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: &'static str,
    pub sql_type: &'static str,
}

const fn col(name: &'static str, sql_type: &'static str) -> ColumnDef {
    ColumnDef { name, sql_type }
}

#[derive(Debug, Clone)]
pub struct TableDef {
    pub name: &'static str,
    pub columns: Vec<ColumnDef>,
    pub indices: Vec<String>,
}

impl TableDef {
    fn new(name: &'static str, columns: Vec<ColumnDef>) -> Self {
        Self {
            name,
            columns,
            indices: Vec::new(),
        }
    }

    fn indexed(mut self, columns: &[&str]) -> Self {
        for column in columns {
            self.indices.push(format!(
                "CREATE INDEX IF NOT EXISTS idx_{table}_{column} ON {table}({column})",
                table = self.name
            ));
        }
        self
    }

    pub fn create_sql(&self) -> String {
        let body = self
            .columns
            .iter()
            .map(|c| format!("    {} {}", c.name, c.sql_type))
            .collect::<Vec<_>>()
            .join(",\n");
        format!("CREATE TABLE IF NOT EXISTS {} (\n{}\n)", self.name, body)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns.iter().map(|c| c.name)
    }
}

static CANONICAL_TABLES: Lazy<Vec<TableDef>> = Lazy::new(build_tables);

/// Every warehouse table in creation order: dimensions first, then facts.
pub fn canonical_tables() -> &'static [TableDef] {
    &CANONICAL_TABLES
}

pub fn table_def(name: &str) -> Option<&'static TableDef> {
    canonical_tables().iter().find(|t| t.name == name)
}

fn build_tables() -> Vec<TableDef> {
    let mut tables = vec![
        TableDef::new(
            DIM_TEAMS,
            vec![
                col("team_id", "TEXT PRIMARY KEY"),
                col("team_name", "TEXT"),
                col("team_city", "TEXT"),
                col("team_abbreviation", "TEXT"),
                col("conference", "TEXT"),
                col("division", "TEXT"),
                col("inserted_at", "TIMESTAMP"),
                col("updated_at", "TIMESTAMP"),
            ],
        ),
        TableDef::new(
            DIM_PLAYERS,
            vec![
                col("player_id", "TEXT PRIMARY KEY"),
                col("first_name", "TEXT"),
                col("last_name", "TEXT"),
                col("jersey_num", "INTEGER"),
                col("position", "TEXT"),
                col("height_inches", "INTEGER"),
                col("weight_lbs", "INTEGER"),
                col("birth_date", "DATE"),
                col("draft_year", "INTEGER"),
                col("inserted_at", "TIMESTAMP"),
                col("updated_at", "TIMESTAMP"),
            ],
        ),
        TableDef::new(
            DIM_GAMES,
            vec![
                col("game_id", "TEXT PRIMARY KEY"),
                col("game_date", "DATE"),
                col("date_id", "TEXT"),
                col("season", "TEXT"),
                col("season_type", "TEXT"),
                col("home_team_id", "TEXT"),
                col("away_team_id", "TEXT"),
                col("venue_id", "TEXT"),
                col("inserted_at", "TIMESTAMP"),
                col("updated_at", "TIMESTAMP"),
            ],
        )
        .indexed(&["game_date"]),
        TableDef::new(
            DIM_DATES,
            vec![
                col("date_id", "TEXT PRIMARY KEY"),
                col("full_date", "DATE"),
                col("day_of_week", "INTEGER"),
                col("day_name", "TEXT"),
                col("day_of_month", "INTEGER"),
                col("day_of_year", "INTEGER"),
                col("week_of_year", "INTEGER"),
                col("month_num", "INTEGER"),
                col("month_name", "TEXT"),
                col("quarter", "INTEGER"),
                col("year", "INTEGER"),
                col("is_weekend", "INTEGER"),
                col("inserted_at", "TIMESTAMP"),
            ],
        ),
        TableDef::new(
            DIM_VENUES,
            vec![
                col("venue_id", "TEXT PRIMARY KEY"),
                col("venue_name", "TEXT"),
                col("city", "TEXT"),
                col("state", "TEXT"),
                col("country", "TEXT"),
                col("capacity", "INTEGER"),
                col("inserted_at", "TIMESTAMP"),
                col("updated_at", "TIMESTAMP"),
            ],
        ),
        TableDef::new(
            FACT_GAME_STATS,
            vec![
                col("game_id", "TEXT PRIMARY KEY"),
                col("date_id", "TEXT"),
                col("home_team_id", "TEXT"),
                col("away_team_id", "TEXT"),
                col("home_team_score", "INTEGER"),
                col("away_team_score", "INTEGER"),
                col("home_q1_score", "INTEGER"),
                col("home_q2_score", "INTEGER"),
                col("home_q3_score", "INTEGER"),
                col("home_q4_score", "INTEGER"),
                col("away_q1_score", "INTEGER"),
                col("away_q2_score", "INTEGER"),
                col("away_q3_score", "INTEGER"),
                col("away_q4_score", "INTEGER"),
                col("home_ot_score", "INTEGER"),
                col("away_ot_score", "INTEGER"),
                col("attendance", "INTEGER"),
                col("lead_changes", "INTEGER"),
                col("times_tied", "INTEGER"),
                col("duration_minutes", "INTEGER"),
                col("inserted_at", "TIMESTAMP"),
            ],
        )
        .indexed(&["date_id"]),
        TableDef::new(
            FACT_PLAYER_GAME_STATS,
            vec![
                col("player_game_id", "TEXT PRIMARY KEY"),
                col("game_id", "TEXT"),
                col("player_id", "TEXT"),
                col("team_id", "TEXT"),
                col("date_id", "TEXT"),
                col("minutes_played", "REAL"),
                col("points", "INTEGER"),
                col("assists", "INTEGER"),
                col("rebounds", "INTEGER"),
                col("steals", "INTEGER"),
                col("blocks", "INTEGER"),
                col("turnovers", "INTEGER"),
                col("personal_fouls", "INTEGER"),
                col("fg_made", "INTEGER"),
                col("fg_attempted", "INTEGER"),
                col("fg_pct", "REAL"),
                col("fg3_made", "INTEGER"),
                col("fg3_attempted", "INTEGER"),
                col("fg3_pct", "REAL"),
                col("ft_made", "INTEGER"),
                col("ft_attempted", "INTEGER"),
                col("ft_pct", "REAL"),
                col("plus_minus", "INTEGER"),
                col("inserted_at", "TIMESTAMP"),
            ],
        )
        .indexed(&["game_id", "player_id", "date_id"]),
        TableDef::new(
            FACT_TEAM_GAME_STATS,
            vec![
                col("team_game_id", "TEXT PRIMARY KEY"),
                col("game_id", "TEXT"),
                col("team_id", "TEXT"),
                col("date_id", "TEXT"),
                col("is_home", "BOOLEAN"),
                col("points", "INTEGER"),
                col("assists", "INTEGER"),
                col("rebounds", "INTEGER"),
                col("offensive_rebounds", "INTEGER"),
                col("defensive_rebounds", "INTEGER"),
                col("steals", "INTEGER"),
                col("blocks", "INTEGER"),
                col("turnovers", "INTEGER"),
                col("personal_fouls", "INTEGER"),
                col("fg_made", "INTEGER"),
                col("fg_attempted", "INTEGER"),
                col("fg_pct", "REAL"),
                col("fg3_made", "INTEGER"),
                col("fg3_attempted", "INTEGER"),
                col("fg3_pct", "REAL"),
                col("ft_made", "INTEGER"),
                col("ft_attempted", "INTEGER"),
                col("ft_pct", "REAL"),
                col("fast_break_points", "INTEGER"),
                col("points_in_paint", "INTEGER"),
                col("points_off_turnovers", "INTEGER"),
                col("second_chance_points", "INTEGER"),
                col("inserted_at", "TIMESTAMP"),
            ],
        )
        .indexed(&["game_id", "team_id"]),
    ];

    tables.push(advanced_table::<ShotTracking>());
    tables.push(advanced_table::<Defensive>());
    tables.push(advanced_table::<Playmaking>());
    tables.push(advanced_table::<Efficiency>());
    tables.push(advanced_table::<Hustle>());

    tables.push(TableDef::new(
        ETL_RUNS,
        vec![
            col("run_id", "INTEGER PRIMARY KEY AUTOINCREMENT"),
            col("started_at", "TEXT NOT NULL"),
            col("finished_at", "TEXT"),
            col("records_added", "INTEGER NOT NULL"),
            col("records_updated", "INTEGER NOT NULL"),
            col("records_skipped", "INTEGER NOT NULL"),
            col("summary_json", "TEXT NOT NULL"),
        ],
    ));
    tables
}

fn advanced_table<F: AdvancedFamily>() -> TableDef {
    let mut columns = vec![
        col("player_game_id", "TEXT PRIMARY KEY"),
        col("game_id", "TEXT"),
        col("player_id", "TEXT"),
        col("team_id", "TEXT"),
        col("date_id", "TEXT"),
    ];
    columns.extend(F::METRICS.iter().map(|&(name, ty)| col(name, ty)));
    columns.push(col("inserted_at", "TIMESTAMP"));
    TableDef::new(F::TABLE, columns).indexed(&["game_id", "player_id"])
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaDrift {
    pub table: String,
    pub missing_columns: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SchemaReport {
    pub created: Vec<String>,
    pub existing: Vec<String>,
    pub drifted: Vec<SchemaDrift>,
}

/// Creates any canonical table that is absent. Tables that already exist are
/// left exactly as they are; column differences are reported, never repaired.
pub fn ensure_schema(conn: &mut Connection) -> Result<SchemaReport> {
    let present = existing_tables(conn)?;
    let mut report = SchemaReport::default();

    let tx = conn.transaction().context("begin schema transaction")?;
    for table in canonical_tables() {
        if present.contains(table.name) {
            report.existing.push(table.name.to_string());
            continue;
        }
        tx.execute_batch(&table.create_sql())
            .with_context(|| format!("create table {}", table.name))?;
        for index in &table.indices {
            tx.execute_batch(index)
                .with_context(|| format!("create index on {}", table.name))?;
        }
        report.created.push(table.name.to_string());
    }
    tx.commit().context("commit schema transaction")?;

    for name in &report.existing {
        let Some(table) = table_def(name) else {
            continue;
        };
        let live = table_columns(conn, name)?;
        let missing = table
            .column_names()
            .filter(|c| !live.contains(*c))
            .map(str::to_string)
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            warn!(table = %name, missing = ?missing, "existing table differs from canonical definition");
            report.drifted.push(SchemaDrift {
                table: name.clone(),
                missing_columns: missing,
            });
        }
    }

    if report.created.is_empty() {
        debug!(tables = report.existing.len(), "warehouse schema already present");
    } else {
        info!(created = ?report.created, "created warehouse tables");
    }
    Ok(report)
}

pub fn existing_tables(conn: &Connection) -> Result<HashSet<String>> {
    let mut stmt = conn
        .prepare("SELECT name FROM sqlite_master WHERE type = 'table'")
        .context("prepare table listing")?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .context("list tables")?;
    let mut out = HashSet::new();
    for row in rows {
        out.insert(row.context("decode table name")?);
    }
    Ok(out)
}

pub fn table_columns(conn: &Connection, table: &str) -> Result<HashSet<String>> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info(\"{table}\")"))
        .with_context(|| format!("prepare table_info for {table}"))?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .with_context(|| format!("read table_info for {table}"))?;
    let mut out = HashSet::new();
    for row in rows {
        out.insert(row.context("decode column name")?);
    }
    Ok(out)
}

/// Column sets of the tables as they exist in the store, loaded lazily.
/// Writes are filtered through this so a table created by an older release
/// keeps accepting the columns it does have.
#[derive(Debug, Default)]
pub struct LiveSchema {
    tables: HashMap<String, HashSet<String>>,
    warned: HashSet<(String, String)>,
}

impl LiveSchema {
    pub fn forget(&mut self) {
        self.tables.clear();
    }

    fn load(&mut self, conn: &Connection, table: &str) -> Result<()> {
        if self.tables.contains_key(table) {
            return Ok(());
        }
        let columns = table_columns(conn, table)?;
        if columns.is_empty() {
            return Err(anyhow!("table {table} does not exist"));
        }
        self.tables.insert(table.to_string(), columns);
        Ok(())
    }

    pub fn has_column(&mut self, conn: &Connection, table: &str, column: &str) -> Result<bool> {
        self.load(conn, table)?;
        Ok(self
            .tables
            .get(table)
            .is_some_and(|cols| cols.contains(column)))
    }

    /// Drops columns the live table lacks, warning once per table and column.
    pub fn retain_known(
        &mut self,
        conn: &Connection,
        table: &str,
        columns: &mut ColumnSet,
    ) -> Result<()> {
        self.load(conn, table)?;
        let Some(live) = self.tables.get(table) else {
            return Ok(());
        };
        let warned = &mut self.warned;
        columns.retain(|name| {
            let keep = live.contains(name);
            if !keep && warned.insert((table.to_string(), name.to_string())) {
                warn!(table, column = name, "column missing from live table; value dropped");
            }
            keep
        });
        Ok(())
    }
}
