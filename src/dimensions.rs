use anyhow::Result;
use rusqlite::Connection;

use crate::records::{GameRecord, PlayerRecord, TeamRecord};
use crate::schema::{DIM_GAMES, DIM_PLAYERS, DIM_TEAMS, FACT_GAME_STATS};
use crate::upsert::{RowWrite, Stamp, WriteContext, WriteOutcome, write_row};

pub fn write_team(
    conn: &Connection,
    ctx: &mut WriteContext<'_>,
    team: &TeamRecord,
) -> Result<WriteOutcome> {
    write_row(
        conn,
        ctx.schema,
        RowWrite {
            table: DIM_TEAMS,
            key_column: "team_id",
            key: &team.team_id,
            columns: team.columns(),
            stamp: Stamp::Dimension,
        },
        ctx.now,
    )
}

pub fn write_player(
    conn: &Connection,
    ctx: &mut WriteContext<'_>,
    player: &PlayerRecord,
) -> Result<WriteOutcome> {
    write_row(
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
    )
}

/// Writes the game dimension row, resolving its date first, and the
/// `fact_game_stats` row when the record carries scores. The returned
/// outcome is that of the dimension row.
pub fn write_game(
    conn: &Connection,
    ctx: &mut WriteContext<'_>,
    game: &GameRecord,
) -> Result<WriteOutcome> {
    let date_id = ctx
        .dates
        .ensure(conn, ctx.schema, game.game_date.as_deref(), ctx.now)?;
    let outcome = write_row(
        conn,
        ctx.schema,
        RowWrite {
            table: DIM_GAMES,
            key_column: "game_id",
            key: &game.game_id,
            columns: game.columns(date_id.as_deref()),
            stamp: Stamp::Dimension,
        },
        ctx.now,
    )?;
    if let Some(columns) = game.stats_columns(date_id.as_deref()) {
        write_row(
            conn,
            ctx.schema,
            RowWrite {
                table: FACT_GAME_STATS,
                key_column: "game_id",
                key: &game.game_id,
                columns,
                stamp: Stamp::Fact,
            },
            ctx.now,
        )?;
    }
    Ok(outcome)
}
