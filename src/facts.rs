use anyhow::{Context, Result, bail};
use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, warn};

use crate::advanced::AdvancedFamily;
use crate::records::{PlayerGameStatsRecord, PlayerRecord, TeamGameStatsRecord};
use crate::schema::{
    DIM_PLAYERS, FACT_PLAYER_GAME_STATS, FACT_TEAM_GAME_STATS, LiveSchema,
};
use crate::upsert::{
    ColumnSet, RowWrite, Stamp, WriteContext, WriteOutcome, insert_row, row_exists, write_row,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvancedOutcome {
    Written(WriteOutcome),
    /// No player-game stats row for the key; nothing was written.
    MissingAnchor,
    /// Every metric was absent; nothing was written.
    NoMetrics,
    /// The write failed and was rolled back.
    Rejected,
}

/// Dimension and date references of a player-game stats row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Anchor {
    pub game_id: Option<String>,
    pub player_id: Option<String>,
    pub team_id: Option<String>,
    pub date_id: Option<String>,
    pub fg_attempted: Option<i64>,
}

const ANCHOR_COLUMNS: [&str; 5] = ["game_id", "player_id", "team_id", "date_id", "fg_attempted"];

/// Reads the anchor row for `player_game_id`. Columns an older table lacks
/// come back as `None`.
pub fn lookup_anchor(
    conn: &Connection,
    schema: &mut LiveSchema,
    player_game_id: &str,
) -> Result<Option<Anchor>> {
    let mut select = Vec::with_capacity(ANCHOR_COLUMNS.len());
    for column in ANCHOR_COLUMNS {
        if schema.has_column(conn, FACT_PLAYER_GAME_STATS, column)? {
            select.push(column);
        } else {
            select.push("NULL");
        }
    }
    let sql = format!(
        "SELECT {} FROM {FACT_PLAYER_GAME_STATS} WHERE player_game_id = ?1",
        select.join(", ")
    );
    conn.prepare_cached(&sql)
        .context("prepare anchor lookup")?
        .query_row([player_game_id], |row| {
            Ok(Anchor {
                game_id: row.get(0)?,
                player_id: row.get(1)?,
                team_id: row.get(2)?,
                date_id: row.get(3)?,
                fg_attempted: row.get(4)?,
            })
        })
        .optional()
        .with_context(|| format!("lookup anchor {player_game_id}"))
}

/// Raw date of a loaded game: `None` when the game is not in `dim_games`,
/// `Some(None)` when it is loaded without a date.
fn loaded_game_date(conn: &Connection, game_id: &str) -> Result<Option<Option<String>>> {
    conn.prepare_cached("SELECT game_date FROM dim_games WHERE game_id = ?1")
        .context("prepare game date lookup")?
        .query_row([game_id], |row| row.get::<_, Option<String>>(0))
        .optional()
        .with_context(|| format!("lookup date of game {game_id}"))
}

/// Anchor fact row. The owning game must already be loaded, and the row
/// takes its date; a player missing from the dimension is backfilled from
/// the box-score display name when one is available.
pub fn write_player_game_stats(
    conn: &Connection,
    ctx: &mut WriteContext<'_>,
    stats: &PlayerGameStatsRecord,
) -> Result<WriteOutcome> {
    let Some(raw_date) = loaded_game_date(conn, &stats.game_id)? else {
        bail!(
            "player stats {} reference unloaded game {}",
            stats.player_game_id,
            stats.game_id
        );
    };
    let date_id = ctx
        .dates
        .ensure(conn, ctx.schema, raw_date.as_deref(), ctx.now)?;

    if let Some(name) = stats.player_name.as_deref()
        && !row_exists(conn, DIM_PLAYERS, "player_id", &stats.player_id)?
    {
        let player = PlayerRecord::from_display_name(&stats.player_id, name);
        insert_row(
            conn,
            ctx.schema,
            RowWrite {
                table: DIM_PLAYERS,
                key_column: "player_id",
                key: &player.player_id,
                columns: player.columns(),
                stamp: Stamp::Dimension,
            },
            ctx.now,
        )?;
        debug!(player_id = %stats.player_id, "backfilled player from box score");
    }

    write_row(
        conn,
        ctx.schema,
        RowWrite {
            table: FACT_PLAYER_GAME_STATS,
            key_column: "player_game_id",
            key: &stats.player_game_id,
            columns: stats.columns(stats.team_id.as_deref(), date_id.as_deref()),
            stamp: Stamp::Fact,
        },
        ctx.now,
    )
}

pub fn write_team_game_stats(
    conn: &Connection,
    ctx: &mut WriteContext<'_>,
    stats: &TeamGameStatsRecord,
) -> Result<WriteOutcome> {
    let Some(loaded) = loaded_game_date(conn, &stats.game_id)? else {
        bail!(
            "team stats {} reference unloaded game {}",
            stats.team_game_id,
            stats.game_id
        );
    };
    let raw_date = loaded.or_else(|| stats.game_date.clone());
    let date_id = ctx
        .dates
        .ensure(conn, ctx.schema, raw_date.as_deref(), ctx.now)?;
    write_row(
        conn,
        ctx.schema,
        RowWrite {
            table: FACT_TEAM_GAME_STATS,
            key_column: "team_game_id",
            key: &stats.team_game_id,
            columns: stats.columns(date_id.as_deref()),
            stamp: Stamp::Fact,
        },
        ctx.now,
    )
}

/// Column-wise merge of one advanced family row. Only metrics present in
/// `metrics` are written; the anchor's references are copied on every write.
pub fn write_advanced<F: AdvancedFamily>(
    conn: &Connection,
    ctx: &mut WriteContext<'_>,
    player_game_id: &str,
    metrics: &F,
) -> Result<AdvancedOutcome> {
    if metrics.is_empty() {
        return Ok(AdvancedOutcome::NoMetrics);
    }
    let Some(anchor) = lookup_anchor(conn, ctx.schema, player_game_id)? else {
        warn!(
            family = F::LABEL,
            player_game_id, "no player game stats row; advanced write skipped"
        );
        return Ok(AdvancedOutcome::MissingAnchor);
    };

    let mut columns = metrics.present_columns();
    let touched = F::RATIOS
        .iter()
        .filter(|r| columns.contains(r.made) || columns.contains(r.attempted))
        .collect::<Vec<_>>();
    columns.set("game_id", &anchor.game_id);
    columns.set("player_id", &anchor.player_id);
    columns.set("team_id", &anchor.team_id);
    columns.set("date_id", &anchor.date_id);

    let outcome = write_row(
        conn,
        ctx.schema,
        RowWrite {
            table: F::TABLE,
            key_column: "player_game_id",
            key: player_game_id,
            columns,
            stamp: Stamp::Fact,
        },
        ctx.now,
    )?;

    for ratio in touched {
        let mut needed = ColumnSet::default();
        needed.set(ratio.made, &0_i64);
        needed.set(ratio.attempted, &0_i64);
        needed.set(ratio.pct, &0.0_f64);
        let expected = needed.len();
        ctx.schema.retain_known(conn, F::TABLE, &mut needed)?;
        if needed.len() != expected {
            continue;
        }
        let sql = format!(
            "UPDATE {table} SET {pct} = CASE WHEN {att} > 0 AND {made} IS NOT NULL \
             THEN CAST({made} AS REAL) / {att} ELSE NULL END WHERE player_game_id = ?1",
            table = F::TABLE,
            pct = ratio.pct,
            att = ratio.attempted,
            made = ratio.made,
        );
        conn.prepare_cached(&sql)
            .with_context(|| format!("prepare {} refresh", ratio.pct))?
            .execute([player_game_id])
            .with_context(|| format!("refresh {} for {player_game_id}", ratio.pct))?;
    }
    Ok(AdvancedOutcome::Written(outcome))
}

/// Difference between a shot log's zone attempts and the anchor's field-goal
/// attempts, when both are known and disagree.
pub fn shot_log_gap(anchor: &Anchor, zone_attempts: i64) -> Option<i64> {
    let fga = anchor.fg_attempted?;
    (fga != zone_attempts).then_some(fga - zone_attempts)
}
