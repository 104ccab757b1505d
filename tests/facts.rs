use nba_warehouse::Warehouse;
use nba_warehouse::advanced::{AdvancedStats, Defensive, Efficiency, ShotTracking};
use nba_warehouse::facts::AdvancedOutcome;
use nba_warehouse::records::RawRecord;
use nba_warehouse::upsert::WriteOutcome;
use serde_json::{Value, json};

fn raw(value: Value) -> RawRecord {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

/// Warehouse holding team, game G1 on 2024-03-05, and player P1's box score.
fn loaded_warehouse() -> Warehouse {
    let mut warehouse = Warehouse::open_in_memory().expect("open warehouse");
    warehouse.ensure_schema().expect("ensure schema");
    warehouse
        .upsert_teams(&[raw(json!({"team_id": "1610612747", "team_name": "Lakers"}))])
        .expect("teams");
    warehouse
        .upsert_players(&[raw(json!({"player_id": "P1", "first_name": "Ann", "last_name": "Lee"}))])
        .expect("players");
    warehouse
        .upsert_games(&[raw(json!({
            "game_id": "G1",
            "game_date": "2024-03-05",
            "home_team_id": "1610612747",
            "away_team_id": "T2"
        }))])
        .expect("games");
    let counts = warehouse
        .upsert_player_game_stats(&[raw(json!({
            "game_id": "G1",
            "player_id": "P1",
            "team_id": "1610612747",
            "points": 30,
            "rebounds": 10,
            "MIN": "34:30",
            "FGM": 11,
            "FGA": 20
        }))])
        .expect("player stats");
    assert_eq!(counts.added, 1);
    warehouse
}

fn shot_row(warehouse: &Warehouse, columns: &str) -> Vec<Option<f64>> {
    let names = columns.split(", ").count();
    warehouse
        .connection()
        .expect("connection")
        .query_row(
            &format!(
                "SELECT {columns} FROM fact_player_shot_tracking WHERE player_game_id = 'G1_P1'"
            ),
            [],
            |row| (0..names).map(|i| row.get::<_, Option<f64>>(i)).collect(),
        )
        .expect("shot tracking row")
}

#[test]
fn player_stats_take_game_date_and_replace_on_reload() {
    let mut warehouse = loaded_warehouse();
    let conn = warehouse.connection().expect("connection");
    let (date_id, minutes, fg_pct): (String, f64, f64) = conn
        .query_row(
            "SELECT date_id, minutes_played, fg_pct FROM fact_player_game_stats WHERE player_game_id = 'G1_P1'",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .expect("stats row");
    assert_eq!(date_id, "20240305");
    assert_eq!(minutes, 34.5);
    assert_eq!(fg_pct, 0.55);

    let counts = warehouse
        .upsert_player_game_stats(&[raw(json!({"player_game_id": "G1_P1", "points": 32}))])
        .expect("reload");
    assert_eq!(counts.updated, 1);
    let (points, rebounds): (i64, Option<i64>) = warehouse
        .connection()
        .expect("connection")
        .query_row(
            "SELECT points, rebounds FROM fact_player_game_stats WHERE player_game_id = 'G1_P1'",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .expect("stats row");
    assert_eq!(points, 32);
    assert_eq!(rebounds, None);
}

#[test]
fn box_score_backfills_unknown_player() {
    let mut warehouse = loaded_warehouse();
    warehouse
        .upsert_player_game_stats(&[raw(json!({
            "GAME_ID": "G1",
            "PLAYER_ID": 1630559,
            "PLAYER_NAME": "Austin Reaves",
            "PTS": 17
        }))])
        .expect("player stats");
    let (first, last): (String, String) = warehouse
        .connection()
        .expect("connection")
        .query_row(
            "SELECT first_name, last_name FROM dim_players WHERE player_id = '1630559'",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .expect("backfilled player");
    assert_eq!((first.as_str(), last.as_str()), ("Austin", "Reaves"));
}

#[test]
fn partial_shot_tracking_writes_merge() {
    let mut warehouse = loaded_warehouse();
    let first = warehouse
        .upsert_shot_tracking(
            "G1_P1",
            &ShotTracking {
                shots_made_0_3ft: Some(3),
                shots_attempted_0_3ft: Some(5),
                ..ShotTracking::default()
            },
        )
        .expect("first write");
    assert_eq!(first, AdvancedOutcome::Written(WriteOutcome::Inserted));
    let second = warehouse
        .upsert_shot_tracking(
            "G1_P1",
            &ShotTracking {
                corner_3_made: Some(1),
                corner_3_attempted: Some(2),
                ..ShotTracking::default()
            },
        )
        .expect("second write");
    assert_eq!(second, AdvancedOutcome::Written(WriteOutcome::Updated));

    let row = shot_row(
        &warehouse,
        "shots_made_0_3ft, shots_attempted_0_3ft, shots_pct_0_3ft, corner_3_made, corner_3_attempted, corner_3_pct",
    );
    assert_eq!(
        row,
        vec![Some(3.0), Some(5.0), Some(0.6), Some(1.0), Some(2.0), Some(0.5)]
    );
}

#[test]
fn advanced_rows_copy_anchor_references() {
    let mut warehouse = loaded_warehouse();
    warehouse
        .upsert_efficiency(
            "G1_P1",
            &Efficiency {
                true_shooting_pct: Some(0.61),
                ..Efficiency::default()
            },
        )
        .expect("efficiency");
    let (game, player, team, date): (String, String, String, String) = warehouse
        .connection()
        .expect("connection")
        .query_row(
            "SELECT game_id, player_id, team_id, date_id FROM fact_player_efficiency WHERE player_game_id = 'G1_P1'",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )
        .expect("efficiency row");
    assert_eq!(
        (game.as_str(), player.as_str(), team.as_str(), date.as_str()),
        ("G1", "P1", "1610612747", "20240305")
    );
}

#[test]
fn missing_anchor_is_reported_without_writing() {
    let mut warehouse = loaded_warehouse();
    let outcome = warehouse
        .upsert_defensive(
            "G1_P404",
            &Defensive {
                deflections: Some(3),
                ..Defensive::default()
            },
        )
        .expect("missing anchor is not an error");
    assert_eq!(outcome, AdvancedOutcome::MissingAnchor);
    let rows: i64 = warehouse
        .connection()
        .expect("connection")
        .query_row("SELECT COUNT(*) FROM fact_player_defensive", [], |row| {
            row.get(0)
        })
        .expect("count");
    assert_eq!(rows, 0);
}

#[test]
fn zero_attempts_store_null_percentage() {
    let mut warehouse = loaded_warehouse();
    warehouse
        .upsert_shot_tracking(
            "G1_P1",
            &ShotTracking {
                shots_made_3_10ft: Some(0),
                shots_attempted_3_10ft: Some(0),
                ..ShotTracking::default()
            },
        )
        .expect("write");
    let row = shot_row(&warehouse, "shots_attempted_3_10ft, shots_pct_3_10ft");
    assert_eq!(row, vec![Some(0.0), None]);
}

#[test]
fn empty_family_is_not_written() {
    let mut warehouse = loaded_warehouse();
    let outcome = warehouse
        .upsert_shot_tracking("G1_P1", &ShotTracking::default())
        .expect("write");
    assert_eq!(outcome, AdvancedOutcome::NoMetrics);
}

#[test]
fn canonical_metric_map_targets_one_family() {
    let mut warehouse = loaded_warehouse();
    let outcome = warehouse
        .upsert_advanced_map::<Efficiency>(
            "G1_P1",
            &raw(json!({"true_shooting_pct": 0.61, "game_score": 24.5, "unknown": 1})),
        )
        .expect("write");
    assert_eq!(outcome, AdvancedOutcome::Written(WriteOutcome::Inserted));
    let game_score: f64 = warehouse
        .connection()
        .expect("connection")
        .query_row(
            "SELECT game_score FROM fact_player_efficiency WHERE player_game_id = 'G1_P1'",
            [],
            |row| row.get(0),
        )
        .expect("efficiency row");
    assert_eq!(game_score, 24.5);
}

#[test]
fn hustle_row_feeds_hustle_and_defensive_tables() {
    let mut warehouse = loaded_warehouse();
    let stats = AdvancedStats::from_hustle(&raw(json!({
        "CONTESTED_SHOTS_2PT": 6,
        "CONTESTED_SHOTS_3PT": 3,
        "DEFLECTIONS": 2
    })));
    let counts = warehouse
        .upsert_advanced_stats("G1_P1", &stats)
        .expect("advanced stats");
    assert_eq!(counts.family("hustle").added, 1);
    assert_eq!(counts.family("defensive").added, 1);

    let contested: i64 = warehouse
        .connection()
        .expect("connection")
        .query_row(
            "SELECT contested_shots FROM fact_player_defensive WHERE player_game_id = 'G1_P1'",
            [],
            |row| row.get(0),
        )
        .expect("defensive row");
    assert_eq!(contested, 9);
}

#[test]
fn shot_log_buckets_into_zones() {
    let mut warehouse = loaded_warehouse();
    let shot = |zone: &str, range: &str, action: &str, made: i64| {
        raw(json!({
            "GAME_ID": "G1",
            "PLAYER_ID": "P1",
            "SHOT_ZONE_BASIC": zone,
            "SHOT_ZONE_RANGE": range,
            "ACTION_TYPE": action,
            "SHOT_MADE_FLAG": made
        }))
    };
    let counts = warehouse
        .load_shot_log(&[
            shot("Restricted Area", "Less Than 8 ft.", "Driving Dunk Shot", 1),
            shot("Restricted Area", "Less Than 8 ft.", "Layup Shot", 0),
            shot("Right Corner 3", "24+ ft.", "Jump Shot", 1),
            shot("Mid-Range", "8-16 ft.", "Jump Shot", 0),
            shot("Backcourt", "Back Court Shot", "Jump Shot", 0),
            raw(json!({"SHOT_ZONE_BASIC": "Restricted Area", "SHOT_MADE_FLAG": 1})),
        ])
        .expect("shot log");
    assert_eq!(counts.shots, 6);
    assert_eq!(counts.unkeyed, 1);
    assert_eq!(counts.unclassified, 1);
    assert_eq!(counts.player_games, 1);
    assert_eq!(counts.advanced.family("shot_tracking").added, 1);

    let row = shot_row(
        &warehouse,
        "shots_made_0_3ft, shots_attempted_0_3ft, shots_pct_0_3ft, corner_3_made, \
         shots_attempted_10_16ft, shots_pct_10_16ft, above_break_3_pct, dunk_made, dunk_attempted",
    );
    assert_eq!(
        row,
        vec![
            Some(1.0),
            Some(2.0),
            Some(0.5),
            Some(1.0),
            Some(1.0),
            Some(0.0),
            None,
            Some(1.0),
            Some(1.0)
        ]
    );
}

#[test]
fn reloading_facts_keeps_inserted_at_and_values() {
    let mut warehouse = loaded_warehouse();
    let box_score = raw(json!({
        "game_id": "G1",
        "player_id": "P1",
        "team_id": "1610612747",
        "points": 30,
        "rebounds": 10,
        "MIN": "34:30",
        "FGM": 11,
        "FGA": 20
    }));
    let hustle = raw(json!({"DEFLECTIONS": 4, "LOOSE_BALLS_RECOVERED": 2}));
    let stats = AdvancedStats::from_hustle(&hustle);
    warehouse
        .upsert_advanced_stats("G1_P1", &stats)
        .expect("first advanced write");
    {
        let conn = warehouse.connection().expect("connection");
        for table in ["fact_player_game_stats", "fact_player_hustle"] {
            conn.execute(
                &format!("UPDATE {table} SET inserted_at = '2000-01-01 00:00:00'"),
                [],
            )
            .expect("age row");
        }
    }
    let snapshot = |warehouse: &Warehouse| -> (String, i64, i64, f64, f64, String, i64, i64) {
        warehouse
            .connection()
            .expect("connection")
            .query_row(
                "SELECT f.inserted_at, f.points, f.rebounds, f.minutes_played, f.fg_pct,
                        h.inserted_at, h.deflections, h.loose_balls_recovered
                 FROM fact_player_game_stats f
                 JOIN fact_player_hustle h ON h.player_game_id = f.player_game_id
                 WHERE f.player_game_id = 'G1_P1'",
                [],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                        row.get(7)?,
                    ))
                },
            )
            .expect("fact rows")
    };
    let before = snapshot(&warehouse);

    let counts = warehouse
        .upsert_player_game_stats(&[box_score])
        .expect("reload box score");
    assert_eq!((counts.added, counts.updated), (0, 1));
    let advanced = warehouse
        .upsert_advanced_stats("G1_P1", &stats)
        .expect("reload advanced");
    assert_eq!(advanced.family("hustle").updated, 1);

    let after = snapshot(&warehouse);
    assert_eq!(before, after);
    assert_eq!(after.0, "2000-01-01 00:00:00");
    assert_eq!(after.5, "2000-01-01 00:00:00");
}

#[test]
fn player_stats_for_unloaded_game_are_skipped() {
    let mut warehouse = loaded_warehouse();
    let counts = warehouse
        .upsert_player_game_stats(&[raw(json!({
            "GAME_ID": "G404",
            "PLAYER_ID": "P1",
            "PTS": 12
        }))])
        .expect("batch commits");
    assert_eq!(counts.skipped, 1);
    assert_eq!(counts.written(), 0);
    let rows: i64 = warehouse
        .connection()
        .expect("connection")
        .query_row(
            "SELECT COUNT(*) FROM fact_player_game_stats WHERE game_id = 'G404'",
            [],
            |row| row.get(0),
        )
        .expect("count");
    assert_eq!(rows, 0);
}

#[test]
fn older_anchor_table_still_takes_advanced_rows() {
    let mut warehouse = Warehouse::open_in_memory().expect("open warehouse");
    warehouse
        .connection()
        .expect("connection")
        .execute_batch(
            "CREATE TABLE fact_player_game_stats (
                player_game_id TEXT PRIMARY KEY,
                game_id TEXT,
                player_id TEXT,
                team_id TEXT,
                minutes INTEGER,
                points INTEGER,
                rebounds INTEGER,
                assists INTEGER,
                steals INTEGER,
                blocks INTEGER,
                turnovers INTEGER,
                inserted_at TIMESTAMP
            );",
        )
        .expect("create older anchor table");
    let report = warehouse.ensure_schema().expect("ensure schema");
    assert!(report.drifted.iter().any(|d| d.table == "fact_player_game_stats"));

    warehouse
        .upsert_games(&[raw(json!({"game_id": "G1", "game_date": "2024-03-05"}))])
        .expect("games");
    let counts = warehouse
        .upsert_player_game_stats(&[raw(json!({
            "game_id": "G1",
            "player_id": "P1",
            "team_id": "1610612747",
            "points": 30,
            "FGA": 20
        }))])
        .expect("player stats");
    assert_eq!(counts.added, 1);

    let outcome = warehouse
        .upsert_efficiency(
            "G1_P1",
            &Efficiency {
                true_shooting_pct: Some(0.61),
                ..Efficiency::default()
            },
        )
        .expect("efficiency");
    assert_eq!(outcome, AdvancedOutcome::Written(WriteOutcome::Inserted));

    let shots = warehouse
        .load_shot_log(&[raw(json!({
            "GAME_ID": "G1",
            "PLAYER_ID": "P1",
            "SHOT_ZONE_BASIC": "Restricted Area",
            "SHOT_ZONE_RANGE": "Less Than 8 ft.",
            "ACTION_TYPE": "Layup Shot",
            "SHOT_MADE_FLAG": 1
        }))])
        .expect("shot log");
    assert_eq!(shots.advanced.family("shot_tracking").added, 1);

    let (game_id, team_id, date_id): (String, String, Option<String>) = warehouse
        .connection()
        .expect("connection")
        .query_row(
            "SELECT game_id, team_id, date_id FROM fact_player_efficiency WHERE player_game_id = 'G1_P1'",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .expect("efficiency row");
    assert_eq!(game_id, "G1");
    assert_eq!(team_id, "1610612747");
    assert_eq!(date_id, None);
}
