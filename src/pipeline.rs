//! One load pass: saved provider responses in, warehouse rows out.
//!
//! Steps run in dependency order and each commits its own batch, so facts
//! always find the dimensions loaded before them.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate};
use rayon::prelude::*;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::advanced::AdvancedStats;
use crate::keys::{parse_calendar_date, player_game_key, split_player_game_key};
use crate::provider::{Endpoint, parse_payload, records_from_payload};
use crate::records::{RawRecord, text};
use crate::summary::{AdvancedCounts, LoadSummary};
use crate::upsert::now_stamp;
use crate::warehouse::Warehouse;

#[derive(Debug, Clone, Default)]
pub struct LoadBatch {
    records: BTreeMap<Endpoint, Vec<RawRecord>>,
}

impl LoadBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, endpoint: Endpoint, records: impl IntoIterator<Item = RawRecord>) {
        self.records.entry(endpoint).or_default().extend(records);
    }

    /// Decodes a provider payload and appends its records; returns how many.
    pub fn add_payload(&mut self, endpoint: Endpoint, payload: &Value) -> Result<usize> {
        let records = records_from_payload(payload, endpoint.result_sets())
            .with_context(|| format!("decode {} payload", endpoint.name()))?;
        let added = records.len();
        self.push(endpoint, records);
        Ok(added)
    }

    pub fn records(&self, endpoint: Endpoint) -> &[RawRecord] {
        self.records
            .get(&endpoint)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads every `*.json` response in `dir` whose name maps to an endpoint.
    /// Files are applied in name order; unreadable files are logged and skipped.
    pub fn from_raw_dir(dir: &Path) -> Result<Self> {
        let mut files: Vec<(Endpoint, PathBuf)> = Vec::new();
        let entries =
            fs::read_dir(dir).with_context(|| format!("read raw directory {}", dir.display()))?;
        for entry in entries {
            let path = entry.context("read raw directory entry")?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            match Endpoint::from_file_stem(stem) {
                Some(endpoint) => files.push((endpoint, path)),
                None => debug!(file = %path.display(), "no endpoint for raw file"),
            }
        }
        files.sort_by(|a, b| a.1.cmp(&b.1));

        let parsed: Vec<(Endpoint, PathBuf, Result<Vec<RawRecord>>)> = files
            .into_par_iter()
            .map(|(endpoint, path)| {
                let result = fs::read_to_string(&path)
                    .with_context(|| format!("read {}", path.display()))
                    .and_then(|body| parse_payload(&body, endpoint.result_sets()));
                (endpoint, path, result)
            })
            .collect();

        let mut batch = Self::new();
        for (endpoint, path, result) in parsed {
            match result {
                Ok(records) => {
                    debug!(
                        file = %path.display(),
                        endpoint = endpoint.name(),
                        records = records.len(),
                        "raw file decoded"
                    );
                    batch.push(endpoint, records);
                }
                Err(err) => {
                    warn!(file = %path.display(), error = %format_args!("{err:#}"), "raw file skipped");
                }
            }
        }
        Ok(batch)
    }

    /// Drops game rows dated before `today - days_back`, along with the box
    /// score, shot and advanced rows of the games that fell out. Rows without
    /// a readable date are kept. Returns how many rows were dropped.
    pub fn retain_recent(&mut self, today: NaiveDate, days_back: i64) -> usize {
        let cutoff = today - Duration::days(days_back);
        let Some(games) = self.records.get_mut(&Endpoint::Games) else {
            return 0;
        };
        let mut kept_ids = HashSet::new();
        let mut stale_ids = HashSet::new();
        let before = games.len();
        games.retain(|row| {
            let keep = text(row, &["GAME_DATE", "game_date", "gameDate"])
                .and_then(|raw| parse_calendar_date(&raw))
                .is_none_or(|date| date >= cutoff);
            if let Some(game_id) = game_id_of(row) {
                if keep {
                    kept_ids.insert(game_id);
                } else {
                    stale_ids.insert(game_id);
                }
            }
            keep
        });
        let mut dropped = before - games.len();
        stale_ids.retain(|id| !kept_ids.contains(id));
        if stale_ids.is_empty() {
            return dropped;
        }

        for endpoint in GAME_SCOPED {
            let Some(rows) = self.records.get_mut(&endpoint) else {
                continue;
            };
            let before = rows.len();
            rows.retain(|row| game_id_of(row).is_none_or(|id| !stale_ids.contains(&id)));
            dropped += before - rows.len();
        }
        debug!(games = stale_ids.len(), rows = dropped, "rows outside the game window dropped");
        dropped
    }
}

/// Endpoints whose rows belong to one game.
const GAME_SCOPED: [Endpoint; 5] = [
    Endpoint::BoxScore,
    Endpoint::ShotChart,
    Endpoint::BoxScoreAdvanced,
    Endpoint::PlayerTracking,
    Endpoint::Hustle,
];

fn game_id_of(row: &RawRecord) -> Option<String> {
    text(row, &["GAME_ID", "game_id", "gameId"]).or_else(|| {
        text(row, &["player_game_id"])
            .and_then(|key| split_player_game_key(&key).map(|(game_id, _)| game_id.to_string()))
    })
}

/// Game-finder rows carry one team per row and a matchup string; anything
/// else is a game-level record.
fn is_game_finder(row: &RawRecord) -> bool {
    row.contains_key("MATCHUP") || row.contains_key("matchup")
}

/// Advanced rows from every provider source, merged per player-game in
/// first-seen order. Rows without both ids are counted as rejected.
pub fn collect_advanced(batch: &LoadBatch) -> (Vec<(String, AdvancedStats)>, usize) {
    let sources: [(Endpoint, fn(&RawRecord) -> AdvancedStats); 3] = [
        (Endpoint::BoxScoreAdvanced, AdvancedStats::from_advanced_box),
        (Endpoint::PlayerTracking, AdvancedStats::from_tracking),
        (Endpoint::Hustle, AdvancedStats::from_hustle),
    ];
    let mut order: Vec<(String, AdvancedStats)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut unkeyed = 0;

    for (endpoint, map) in sources {
        for row in batch.records(endpoint) {
            let game_id = text(row, &["GAME_ID", "game_id", "gameId"]);
            let player_id = text(row, &["PLAYER_ID", "player_id", "personId"]);
            let (Some(game_id), Some(player_id)) = (game_id, player_id) else {
                unkeyed += 1;
                continue;
            };
            let stats = map(row);
            if stats.is_empty() {
                continue;
            }
            let key = player_game_key(&game_id, &player_id);
            match index.get(&key) {
                Some(&slot) => order[slot].1.merge(stats),
                None => {
                    index.insert(key.clone(), order.len());
                    order.push((key, stats));
                }
            }
        }
    }
    (order, unkeyed)
}

pub fn run_load(warehouse: &mut Warehouse, batch: &LoadBatch) -> Result<LoadSummary> {
    let started_at = now_stamp();
    let mut summary = LoadSummary::default();

    summary.teams = warehouse.upsert_teams(batch.records(Endpoint::Teams))?;
    summary.players = warehouse.upsert_players(batch.records(Endpoint::Players))?;

    let (finder_rows, game_rows): (Vec<RawRecord>, Vec<RawRecord>) = batch
        .records(Endpoint::Games)
        .iter()
        .cloned()
        .partition(is_game_finder);
    if !game_rows.is_empty() {
        summary.games = warehouse.upsert_games(&game_rows)?;
    }
    if !finder_rows.is_empty() {
        let counts = warehouse.upsert_game_finder_rows(&finder_rows)?;
        summary.games += counts.games;
        summary.team_game_stats = counts.team_games;
    }

    summary.player_game_stats =
        warehouse.upsert_player_game_stats(batch.records(Endpoint::BoxScore))?;
    summary.shot_log = warehouse.load_shot_log(batch.records(Endpoint::ShotChart))?;

    let (advanced, unkeyed) = collect_advanced(batch);
    if unkeyed > 0 {
        warn!(rows = unkeyed, "advanced rows without game and player ids skipped");
    }
    summary.advanced = if advanced.is_empty() {
        AdvancedCounts::default()
    } else {
        warehouse.upsert_advanced_batch(&advanced)?
    };
    summary.advanced.rejected += unkeyed;

    let run_id = warehouse.record_run(&started_at, &summary)?;
    let totals = summary.totals();
    info!(
        run_id,
        added = totals.added,
        updated = totals.updated,
        skipped = totals.skipped,
        "load complete"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> RawRecord {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn retain_recent_drops_old_games_only() {
        let mut batch = LoadBatch::new();
        batch.push(
            Endpoint::Games,
            [
                row(json!({"GAME_ID": "1", "GAME_DATE": "2024-03-05"})),
                row(json!({"GAME_ID": "2", "GAME_DATE": "2024-02-01"})),
                row(json!({"GAME_ID": "3"})),
            ],
        );
        batch.push(Endpoint::Teams, [row(json!({"id": 1}))]);
        let today = NaiveDate::from_ymd_opt(2024, 3, 6).expect("date");
        assert_eq!(batch.retain_recent(today, 3), 1);
        assert_eq!(batch.records(Endpoint::Games).len(), 2);
        assert_eq!(batch.len(), 3);
    }

    #[test]
    fn advanced_rows_merge_per_player_game() {
        let mut batch = LoadBatch::new();
        batch.push(
            Endpoint::BoxScoreAdvanced,
            [row(json!({"GAME_ID": "G1", "PLAYER_ID": 7, "OFF_RATING": 112.5}))],
        );
        batch.push(
            Endpoint::Hustle,
            [
                row(json!({"GAME_ID": "G1", "PLAYER_ID": 7, "DEFLECTIONS": 4})),
                row(json!({"PLAYER_ID": 9, "DEFLECTIONS": 1})),
            ],
        );
        let (items, unkeyed) = collect_advanced(&batch);
        assert_eq!(unkeyed, 1);
        assert_eq!(items.len(), 1);
        let (key, stats) = &items[0];
        assert_eq!(key, "G1_7");
        assert!(stats.efficiency.is_some());
        assert_eq!(
            stats.hustle.as_ref().and_then(|h| h.deflections),
            Some(4)
        );
    }

    #[test]
    fn finder_rows_are_detected_by_matchup() {
        assert!(is_game_finder(&row(json!({"MATCHUP": "LAL vs. BOS"}))));
        assert!(is_game_finder(&row(json!({"matchup": "LAL @ BOS"}))));
        assert!(!is_game_finder(&row(json!({"home_team_id": "1"}))));
    }

    #[test]
    fn retain_recent_drops_rows_of_stale_games() {
        let mut batch = LoadBatch::new();
        batch.push(
            Endpoint::Games,
            [
                row(json!({"GAME_ID": "NEW", "GAME_DATE": "2024-03-05"})),
                row(json!({"GAME_ID": "OLD", "GAME_DATE": "2024-01-10"})),
                row(json!({"GAME_ID": "OLD", "GAME_DATE": "2024-01-10"})),
            ],
        );
        batch.push(
            Endpoint::BoxScore,
            [
                row(json!({"GAME_ID": "NEW", "PLAYER_ID": 1})),
                row(json!({"GAME_ID": "OLD", "PLAYER_ID": 2})),
                row(json!({"player_game_id": "OLD_3"})),
                row(json!({"GAME_ID": "ELSEWHERE", "PLAYER_ID": 4})),
            ],
        );
        batch.push(Endpoint::Hustle, [row(json!({"GAME_ID": "OLD", "PLAYER_ID": 2}))]);
        batch.push(Endpoint::ShotChart, [row(json!({"GAME_ID": "NEW", "PLAYER_ID": 1}))]);

        let today = NaiveDate::from_ymd_opt(2024, 3, 6).expect("date");
        assert_eq!(batch.retain_recent(today, 3), 5);
        assert_eq!(batch.records(Endpoint::Games).len(), 1);
        let box_games: Vec<_> = batch
            .records(Endpoint::BoxScore)
            .iter()
            .filter_map(game_id_of)
            .collect();
        assert_eq!(box_games, ["NEW", "ELSEWHERE"]);
        assert!(batch.records(Endpoint::Hustle).is_empty());
        assert_eq!(batch.records(Endpoint::ShotChart).len(), 1);
    }
}
