use std::collections::HashMap;

use tracing::warn;

use crate::records::{GameRecord, GameScore, RawRecord, TeamGameStatsRecord, int, text};

/// Season type from the provider's season identifier: a leading `2` marks the
/// regular season, anything else is reported as playoffs. Preseason and
/// play-in identifiers are misfiled by this rule.
pub fn season_type_for(season_id: &str) -> &'static str {
    if season_id.trim_start().starts_with('2') {
        "Regular Season"
    } else {
        "Playoffs"
    }
}

/// `" vs. "` in a matchup string ("LAL vs. BOS") marks the home side;
/// away rows read "BOS @ LAL".
pub fn is_home_matchup(matchup: &str) -> bool {
    matchup.contains(" vs. ")
}

#[derive(Debug, Clone, Default)]
pub struct AssembledGames {
    pub games: Vec<GameRecord>,
    pub team_games: Vec<TeamGameStatsRecord>,
    pub skipped: usize,
}

struct Pending {
    game_id: String,
    game_date: Option<String>,
    season: Option<String>,
    rows: Vec<(String, bool, Option<i64>)>,
}

/// Folds one-row-per-team game finder output into game records.
///
/// Rows are grouped by game in first-seen order. The side whose matchup
/// carries the home marker is home; without a marked side the first team
/// encountered is taken as home.
pub fn assemble_games(rows: &[RawRecord]) -> AssembledGames {
    let mut order: Vec<String> = Vec::new();
    let mut pending: HashMap<String, Pending> = HashMap::new();
    let mut out = AssembledGames::default();

    for row in rows {
        let team_stats = match TeamGameStatsRecord::from_raw(row) {
            Ok(stats) => stats,
            Err(err) => {
                warn!(error = %err, "skipping game finder row");
                out.skipped += 1;
                continue;
            }
        };
        let marked_home = text(row, &["MATCHUP", "matchup"]).is_some_and(|m| is_home_matchup(&m));
        let entry = pending
            .entry(team_stats.game_id.clone())
            .or_insert_with(|| {
                order.push(team_stats.game_id.clone());
                Pending {
                    game_id: team_stats.game_id.clone(),
                    game_date: team_stats.game_date.clone(),
                    season: text(row, &["SEASON_ID", "season"]),
                    rows: Vec::new(),
                }
            });
        if entry.rows.iter().any(|(team, _, _)| *team == team_stats.team_id) {
            continue;
        }
        entry.rows.push((
            team_stats.team_id.clone(),
            marked_home,
            int(row, &["PTS", "points"]),
        ));
        out.team_games.push(team_stats);
    }

    let mut home_by_game: HashMap<String, String> = HashMap::new();
    for game_id in order {
        let Some(game) = pending.remove(&game_id) else {
            continue;
        };
        let home_idx = game.rows.iter().position(|(_, home, _)| *home).unwrap_or(0);
        let home = game.rows.get(home_idx);
        let away = game
            .rows
            .iter()
            .enumerate()
            .find(|(idx, _)| *idx != home_idx)
            .map(|(_, row)| row);

        let score = GameScore {
            home_team_score: home.and_then(|(_, _, pts)| *pts),
            away_team_score: away.and_then(|(_, _, pts)| *pts),
            ..GameScore::default()
        };
        if let Some((team, _, _)) = home {
            home_by_game.insert(game.game_id.clone(), team.clone());
        }
        out.games.push(GameRecord {
            season_type: game.season.as_deref().map(|s| season_type_for(s).to_string()),
            game_id: game.game_id,
            game_date: game.game_date,
            season: game.season,
            home_team_id: home.map(|(team, _, _)| team.clone()),
            away_team_id: away.map(|(team, _, _)| team.clone()),
            venue_id: None,
            score: (score != GameScore::default()).then_some(score),
        });
    }

    for stats in &mut out.team_games {
        if stats.is_home.is_none() {
            stats.is_home = home_by_game.get(&stats.game_id).map(|h| *h == stats.team_id);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn rows(values: Vec<Value>) -> Vec<RawRecord> {
        values
            .into_iter()
            .filter_map(|v| match v {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn season_type_heuristic() {
        assert_eq!(season_type_for("22023"), "Regular Season");
        assert_eq!(season_type_for("42023"), "Playoffs");
        assert_eq!(season_type_for("12023"), "Playoffs");
    }

    #[test]
    fn home_marker_wins_regardless_of_order() {
        let assembled = assemble_games(&rows(vec![
            json!({"GAME_ID": "G1", "TEAM_ID": 2, "MATCHUP": "BOS @ LAL", "PTS": 99, "SEASON_ID": "22023", "GAME_DATE": "2024-03-05"}),
            json!({"GAME_ID": "G1", "TEAM_ID": 1, "MATCHUP": "LAL vs. BOS", "PTS": 104, "SEASON_ID": "22023", "GAME_DATE": "2024-03-05"}),
        ]));
        assert_eq!(assembled.games.len(), 1);
        let game = &assembled.games[0];
        assert_eq!(game.home_team_id.as_deref(), Some("1"));
        assert_eq!(game.away_team_id.as_deref(), Some("2"));
        let score = game.score.as_ref().expect("score");
        assert_eq!(score.home_team_score, Some(104));
        assert_eq!(score.away_team_score, Some(99));
        assert_eq!(game.season_type.as_deref(), Some("Regular Season"));

        assert_eq!(assembled.team_games.len(), 2);
        assert_eq!(assembled.team_games[0].is_home, Some(false));
        assert_eq!(assembled.team_games[1].is_home, Some(true));
        assert_eq!(assembled.team_games[1].team_game_id, "G1_1");
    }

    #[test]
    fn unmarked_pair_takes_first_team_as_home() {
        let assembled = assemble_games(&rows(vec![
            json!({"GAME_ID": "G7", "TEAM_ID": 9, "MATCHUP": "AAA @ BBB"}),
            json!({"GAME_ID": "G7", "TEAM_ID": 8, "MATCHUP": "BBB @ AAA"}),
            json!({"TEAM_ID": 8}),
        ]));
        assert_eq!(assembled.skipped, 1);
        let game = &assembled.games[0];
        assert_eq!(game.home_team_id.as_deref(), Some("9"));
        assert_eq!(game.away_team_id.as_deref(), Some("8"));
        assert!(game.score.is_none());
    }

    #[test]
    fn games_keep_first_seen_order() {
        let assembled = assemble_games(&rows(vec![
            json!({"GAME_ID": "B", "TEAM_ID": 1}),
            json!({"GAME_ID": "A", "TEAM_ID": 2}),
            json!({"GAME_ID": "B", "TEAM_ID": 3}),
        ]));
        let ids = assembled.games.iter().map(|g| g.game_id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["B", "A"]);
        assert_eq!(assembled.games[1].away_team_id, None);
    }
}
