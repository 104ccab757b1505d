//! The warehouse façade: one owned connection, one transaction per batch.
//!
//! Every public upsert commits its own batch. Inside a batch each record runs
//! under a savepoint, so a record that fails to map or violates a constraint
//! is rolled back alone, logged, and counted as skipped while its siblings
//! commit.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rusqlite::{Connection, params};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::advanced::{
    AdvancedFamily, AdvancedStats, Defensive, Efficiency, Hustle, Playmaking, ShotTracking,
};
use crate::dates::DateDimension;
use crate::dimensions::{write_game, write_player, write_team};
use crate::facts::{
    AdvancedOutcome, lookup_anchor, shot_log_gap, write_advanced, write_player_game_stats,
    write_team_game_stats,
};
use crate::games::assemble_games;
use crate::keys::player_game_key;
use crate::records::{
    GameRecord, PlayerGameStatsRecord, PlayerRecord, RawRecord, TeamGameStatsRecord, TeamRecord,
};
use crate::schema::{self, ETL_RUNS, LiveSchema, SchemaReport, canonical_tables};
use crate::shot_zones::{ShotEvent, ShotTally};
use crate::summary::{AdvancedCounts, LoadSummary, ShotLogCounts, UpsertCounts};
use crate::upsert::{WriteContext, WriteOutcome, now_stamp};

#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error("warehouse connection is closed")]
    Closed,
    #[error("cannot open warehouse at {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GameFinderCounts {
    pub games: UpsertCounts,
    pub team_games: UpsertCounts,
}

pub struct Warehouse {
    conn: Option<Connection>,
    path: Option<PathBuf>,
    schema: LiveSchema,
    dates: DateDimension,
}

impl Warehouse {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create warehouse directory {}", parent.display()))?;
        }
        let conn = Connection::open(path).map_err(|source| WarehouseError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")
            .context("enable WAL journal")?;
        debug!(path = %path.display(), "opened warehouse");
        Ok(Self::from_connection(conn, Some(path.to_path_buf())))
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| WarehouseError::Open {
            path: PathBuf::from(":memory:"),
            source,
        })?;
        Ok(Self::from_connection(conn, None))
    }

    fn from_connection(conn: Connection, path: Option<PathBuf>) -> Self {
        Self {
            conn: Some(conn),
            path,
            schema: LiveSchema::default(),
            dates: DateDimension::default(),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_closed(&self) -> bool {
        self.conn.is_none()
    }

    /// Read access for queries against the warehouse tables.
    pub fn connection(&self) -> Result<&Connection> {
        Ok(self.conn.as_ref().ok_or(WarehouseError::Closed)?)
    }

    pub fn ensure_schema(&mut self) -> Result<SchemaReport> {
        let conn = self.conn.as_mut().ok_or(WarehouseError::Closed)?;
        let report = schema::ensure_schema(conn)?;
        self.schema.forget();
        Ok(report)
    }

    /// Date key for `raw`, inserting the `dim_dates` row if it is new.
    pub fn ensure_date(&mut self, raw: &str) -> Result<Option<String>> {
        let conn = self.conn.as_ref().ok_or(WarehouseError::Closed)?;
        let now = now_stamp();
        let result = self.dates.ensure(conn, &mut self.schema, Some(raw), &now);
        self.dates.settle(result.is_ok());
        result
    }

    pub fn date_inserts(&self) -> usize {
        self.dates.inserts()
    }

    /// Runs `write` for every item inside one transaction, one savepoint per
    /// item. `tally` receives each outcome, or `None` for a skipped item.
    fn run_batch<T, O>(
        &mut self,
        batch: &'static str,
        items: &[T],
        mut write: impl FnMut(&Connection, &mut WriteContext<'_>, &T) -> Result<O>,
        mut tally: impl FnMut(Option<O>),
    ) -> Result<()> {
        let Self {
            conn,
            schema,
            dates,
            ..
        } = self;
        let conn = conn.as_mut().ok_or(WarehouseError::Closed)?;
        let now = now_stamp();
        let mut tx = conn.transaction().context("begin batch transaction")?;

        for (index, item) in items.iter().enumerate() {
            let sp = tx.savepoint().context("open record savepoint")?;
            let result = {
                let mut ctx = WriteContext {
                    schema: &mut *schema,
                    dates: &mut *dates,
                    now: &now,
                };
                write(&*sp, &mut ctx, item)
            };
            match result {
                Ok(outcome) => {
                    sp.commit().context("release record savepoint")?;
                    dates.settle(true);
                    tally(Some(outcome));
                }
                Err(err) => {
                    drop(sp);
                    dates.settle(false);
                    warn!(batch, index, error = %format_args!("{err:#}"), "record skipped");
                    tally(None);
                }
            }
        }

        if let Err(err) = tx.commit() {
            dates.reset();
            return Err(err).with_context(|| format!("commit {batch} batch"));
        }
        Ok(())
    }

    fn run_upserts<T>(
        &mut self,
        batch: &'static str,
        items: &[T],
        write: impl FnMut(&Connection, &mut WriteContext<'_>, &T) -> Result<WriteOutcome>,
    ) -> Result<UpsertCounts> {
        let mut counts = UpsertCounts::default();
        self.run_batch(batch, items, write, |outcome| counts.record(outcome))?;
        counts.log(batch);
        Ok(counts)
    }

    pub fn upsert_teams(&mut self, records: &[RawRecord]) -> Result<UpsertCounts> {
        self.run_upserts("teams", records, |conn, ctx, raw| {
            write_team(conn, ctx, &TeamRecord::from_raw(raw)?)
        })
    }

    pub fn upsert_players(&mut self, records: &[RawRecord]) -> Result<UpsertCounts> {
        self.run_upserts("players", records, |conn, ctx, raw| {
            write_player(conn, ctx, &PlayerRecord::from_raw(raw)?)
        })
    }

    /// Games plus, where scores accompany a record, their game stats row.
    pub fn upsert_games(&mut self, records: &[RawRecord]) -> Result<UpsertCounts> {
        self.run_upserts("games", records, |conn, ctx, raw| {
            write_game(conn, ctx, &GameRecord::from_raw(raw)?)
        })
    }

    pub fn upsert_game_records(&mut self, games: &[GameRecord]) -> Result<UpsertCounts> {
        self.run_upserts("games", games, write_game)
    }

    /// League game finder rows: one row per team per game, folded into games
    /// and team game stats.
    pub fn upsert_game_finder_rows(&mut self, rows: &[RawRecord]) -> Result<GameFinderCounts> {
        let assembled = assemble_games(rows);
        let mut games = self.upsert_game_records(&assembled.games)?;
        games.skipped += assembled.skipped;
        let team_games = self.upsert_team_game_records(&assembled.team_games)?;
        Ok(GameFinderCounts { games, team_games })
    }

    pub fn upsert_player_game_stats(&mut self, records: &[RawRecord]) -> Result<UpsertCounts> {
        self.run_upserts("player_game_stats", records, |conn, ctx, raw| {
            write_player_game_stats(conn, ctx, &PlayerGameStatsRecord::from_raw(raw)?)
        })
    }

    pub fn upsert_team_game_stats(&mut self, records: &[RawRecord]) -> Result<UpsertCounts> {
        self.run_upserts("team_game_stats", records, |conn, ctx, raw| {
            write_team_game_stats(conn, ctx, &TeamGameStatsRecord::from_raw(raw)?)
        })
    }

    pub fn upsert_team_game_records(
        &mut self,
        records: &[TeamGameStatsRecord],
    ) -> Result<UpsertCounts> {
        self.run_upserts("team_game_stats", records, write_team_game_stats)
    }

    /// Merges one family's present metrics into its row for `player_game_id`.
    /// A missing anchor row or a rolled-back write is reported through the
    /// outcome; only connection-level failures are errors.
    pub fn upsert_advanced<F: AdvancedFamily>(
        &mut self,
        player_game_id: &str,
        metrics: &F,
    ) -> Result<AdvancedOutcome> {
        let mut outcome = AdvancedOutcome::Rejected;
        self.run_batch(
            F::LABEL,
            &[player_game_id],
            |conn, ctx, key| write_advanced(conn, ctx, key, metrics),
            |result| outcome = result.unwrap_or(AdvancedOutcome::Rejected),
        )?;
        Ok(outcome)
    }

    /// Merges a canonical-name metric map into family `F`.
    pub fn upsert_advanced_map<F: AdvancedFamily>(
        &mut self,
        player_game_id: &str,
        metrics: &RawRecord,
    ) -> Result<AdvancedOutcome> {
        self.upsert_advanced(player_game_id, &F::from_record(metrics))
    }

    pub fn upsert_shot_tracking(
        &mut self,
        player_game_id: &str,
        metrics: &ShotTracking,
    ) -> Result<AdvancedOutcome> {
        self.upsert_advanced(player_game_id, metrics)
    }

    pub fn upsert_defensive(
        &mut self,
        player_game_id: &str,
        metrics: &Defensive,
    ) -> Result<AdvancedOutcome> {
        self.upsert_advanced(player_game_id, metrics)
    }

    pub fn upsert_playmaking(
        &mut self,
        player_game_id: &str,
        metrics: &Playmaking,
    ) -> Result<AdvancedOutcome> {
        self.upsert_advanced(player_game_id, metrics)
    }

    pub fn upsert_efficiency(
        &mut self,
        player_game_id: &str,
        metrics: &Efficiency,
    ) -> Result<AdvancedOutcome> {
        self.upsert_advanced(player_game_id, metrics)
    }

    pub fn upsert_hustle(&mut self, player_game_id: &str, metrics: &Hustle) -> Result<AdvancedOutcome> {
        self.upsert_advanced(player_game_id, metrics)
    }

    /// Writes every family present in each bundle, one savepoint per
    /// player-game.
    pub fn upsert_advanced_batch(
        &mut self,
        items: &[(String, AdvancedStats)],
    ) -> Result<AdvancedCounts> {
        let mut counts = AdvancedCounts::default();
        let mut written: Vec<(&'static str, AdvancedOutcome)> = Vec::new();
        self.run_batch(
            "advanced",
            items,
            |conn, ctx, (player_game_id, stats)| {
                let mut outcomes = Vec::new();
                if let Some(family) = &stats.shot_tracking {
                    outcomes.push((
                        ShotTracking::LABEL,
                        write_advanced(conn, ctx, player_game_id, family)?,
                    ));
                }
                if let Some(family) = &stats.defensive {
                    outcomes.push((
                        Defensive::LABEL,
                        write_advanced(conn, ctx, player_game_id, family)?,
                    ));
                }
                if let Some(family) = &stats.playmaking {
                    outcomes.push((
                        Playmaking::LABEL,
                        write_advanced(conn, ctx, player_game_id, family)?,
                    ));
                }
                if let Some(family) = &stats.efficiency {
                    outcomes.push((
                        Efficiency::LABEL,
                        write_advanced(conn, ctx, player_game_id, family)?,
                    ));
                }
                if let Some(family) = &stats.hustle {
                    outcomes.push((Hustle::LABEL, write_advanced(conn, ctx, player_game_id, family)?));
                }
                Ok(outcomes)
            },
            |result| match result {
                Some(outcomes) => written.extend(outcomes),
                None => counts.rejected += 1,
            },
        )?;
        for (family, outcome) in written {
            counts.record(family, outcome);
        }
        counts.log("advanced");
        Ok(counts)
    }

    pub fn upsert_advanced_stats(
        &mut self,
        player_game_id: &str,
        stats: &AdvancedStats,
    ) -> Result<AdvancedCounts> {
        self.upsert_advanced_batch(&[(player_game_id.to_string(), stats.clone())])
    }

    /// Buckets raw shot-chart events per player-game and writes the zone
    /// tallies into the shot tracking family.
    pub fn load_shot_log(&mut self, shots: &[RawRecord]) -> Result<ShotLogCounts> {
        let mut counts = ShotLogCounts::default();
        let mut order: Vec<String> = Vec::new();
        let mut tallies: HashMap<String, ShotTally> = HashMap::new();

        for raw in shots {
            counts.shots += 1;
            let event = ShotEvent::from_raw(raw);
            let (Some(game_id), Some(player_id)) = (&event.game_id, &event.player_id) else {
                counts.unkeyed += 1;
                continue;
            };
            let key = player_game_key(game_id, player_id);
            let tally = tallies.entry(key.clone()).or_insert_with(|| {
                order.push(key);
                ShotTally::default()
            });
            tally.add(&event);
        }

        let mut items = Vec::with_capacity(order.len());
        for key in order {
            let Some(tally) = tallies.remove(&key) else {
                continue;
            };
            counts.unclassified += tally.unclassified() as usize;
            self.check_shot_coverage(&key, tally.total_attempted());
            items.push((
                key,
                AdvancedStats {
                    shot_tracking: Some(tally.to_metrics()),
                    ..AdvancedStats::default()
                },
            ));
        }
        counts.player_games = items.len();
        counts.advanced = self.upsert_advanced_batch(&items)?;
        Ok(counts)
    }

    /// Logs when a shot log and its anchor's field-goal attempts disagree.
    /// Lookup failures only skip the check.
    fn check_shot_coverage(&mut self, player_game_id: &str, attempted: i64) {
        let Some(conn) = self.conn.as_ref() else {
            return;
        };
        match lookup_anchor(conn, &mut self.schema, player_game_id) {
            Ok(Some(anchor)) => {
                if let Some(gap) = shot_log_gap(&anchor, attempted) {
                    debug!(player_game_id, gap, "shot log does not cover all field goal attempts");
                }
            }
            Ok(None) => {}
            Err(err) => {
                debug!(player_game_id, error = %format_args!("{err:#}"), "shot coverage check skipped");
            }
        }
    }

    /// Appends a row to `etl_runs` and returns its id.
    pub fn record_run(&mut self, started_at: &str, summary: &LoadSummary) -> Result<i64> {
        let conn = self.connection()?;
        let totals = summary.totals();
        let summary_json = serde_json::to_string(summary).context("serialize run summary")?;
        conn.execute(
            "INSERT INTO etl_runs(started_at, finished_at, records_added, records_updated, records_skipped, summary_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                started_at,
                now_stamp(),
                totals.added as i64,
                totals.updated as i64,
                totals.skipped as i64,
                summary_json
            ],
        )
        .context("insert etl run")?;
        Ok(conn.last_insert_rowid())
    }

    /// Row counts of every canonical table present in the store.
    pub fn table_counts(&self) -> Result<Vec<(String, i64)>> {
        let conn = self.connection()?;
        let present = schema::existing_tables(conn)?;
        let mut out = Vec::new();
        for table in canonical_tables() {
            if !present.contains(table.name) {
                continue;
            }
            let count = conn
                .query_row(&format!("SELECT COUNT(*) FROM {}", table.name), [], |row| {
                    row.get::<_, i64>(0)
                })
                .with_context(|| format!("count rows in {}", table.name))?;
            out.push((table.name.to_string(), count));
        }
        Ok(out)
    }

    pub fn last_run_id(&self) -> Result<Option<i64>> {
        let conn = self.connection()?;
        conn.query_row(&format!("SELECT MAX(run_id) FROM {ETL_RUNS}"), [], |row| {
            row.get::<_, Option<i64>>(0)
        })
        .context("query last etl run")
    }

    /// Releases the connection. Later calls are no-ops.
    pub fn close(&mut self) -> Result<()> {
        let Some(conn) = self.conn.take() else {
            return Ok(());
        };
        conn.close()
            .map_err(|(_, err)| err)
            .context("close warehouse connection")?;
        info!("warehouse closed");
        Ok(())
    }
}

impl Drop for Warehouse {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(error = %err, "warehouse close on drop failed");
        }
    }
}
