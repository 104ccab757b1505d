//! Decoding of saved provider responses into raw records.
//!
//! Stats endpoints answer with `resultSets`, each a header row plus positional
//! rows. Static lookups and re-saved frames are plain arrays of objects.

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use serde_json::Value;

use crate::records::RawRecord;

#[derive(Debug, Clone, Deserialize)]
pub struct ResultSet {
    #[serde(default)]
    pub name: String,
    pub headers: Vec<String>,
    #[serde(rename = "rowSet")]
    pub row_set: Vec<Vec<Value>>,
}

impl ResultSet {
    /// One record per row, keyed by header. Short rows leave the trailing
    /// headers out.
    pub fn records(&self) -> Vec<RawRecord> {
        self.row_set
            .iter()
            .map(|row| {
                self.headers
                    .iter()
                    .zip(row.iter())
                    .map(|(header, value)| (header.clone(), value.clone()))
                    .collect()
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    Many(Vec<ResultSet>),
    One(ResultSet),
}

#[derive(Debug, Deserialize)]
struct ResultSetsResponse {
    #[serde(rename = "resultSets")]
    result_sets: Option<OneOrMany>,
    #[serde(rename = "resultSet")]
    result_set: Option<OneOrMany>,
}

pub fn result_sets(payload: &Value) -> Result<Vec<ResultSet>> {
    let parsed = ResultSetsResponse::deserialize(payload).context("invalid result set json")?;
    let sets = match parsed.result_sets.or(parsed.result_set) {
        Some(OneOrMany::Many(sets)) => sets,
        Some(OneOrMany::One(set)) => vec![set],
        None => Vec::new(),
    };
    Ok(sets)
}

/// Records of the first set whose name is in `preferred`, falling back to
/// the first set in the payload.
pub fn records_named(sets: &[ResultSet], preferred: &[&str]) -> Vec<RawRecord> {
    let chosen = preferred
        .iter()
        .find_map(|name| sets.iter().find(|set| set.name.eq_ignore_ascii_case(name)))
        .or_else(|| sets.first());
    chosen.map(ResultSet::records).unwrap_or_default()
}

pub fn records_from_payload(payload: &Value, preferred: &[&str]) -> Result<Vec<RawRecord>> {
    match payload {
        Value::Array(items) => Ok(items
            .iter()
            .filter_map(|item| item.as_object().cloned())
            .collect()),
        Value::Object(map) if map.contains_key("resultSets") || map.contains_key("resultSet") => {
            Ok(records_named(&result_sets(payload)?, preferred))
        }
        Value::Object(_) => Err(anyhow!("payload has no result sets")),
        Value::Null => Ok(Vec::new()),
        _ => Err(anyhow!("unexpected payload shape")),
    }
}

pub fn parse_payload(body: &str, preferred: &[&str]) -> Result<Vec<RawRecord>> {
    let trimmed = body.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(Vec::new());
    }
    let value: Value = serde_json::from_str(trimmed).context("invalid payload json")?;
    records_from_payload(&value, preferred)
}

/// Provider endpoints the loader consumes, in load order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Endpoint {
    Teams,
    Players,
    Games,
    BoxScore,
    ShotChart,
    BoxScoreAdvanced,
    PlayerTracking,
    Hustle,
}

impl Endpoint {
    pub const ALL: [Endpoint; 8] = [
        Endpoint::Teams,
        Endpoint::Players,
        Endpoint::Games,
        Endpoint::BoxScore,
        Endpoint::ShotChart,
        Endpoint::BoxScoreAdvanced,
        Endpoint::PlayerTracking,
        Endpoint::Hustle,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Endpoint::Teams => "teams",
            Endpoint::Players => "players",
            Endpoint::Games => "games",
            Endpoint::BoxScore => "boxscore",
            Endpoint::ShotChart => "shot_chart",
            Endpoint::BoxScoreAdvanced => "boxscore_advanced",
            Endpoint::PlayerTracking => "player_tracking",
            Endpoint::Hustle => "hustle_stats",
        }
    }

    pub fn result_sets(self) -> &'static [&'static str] {
        match self {
            Endpoint::Teams => &[],
            Endpoint::Players => &["CommonAllPlayers", "PlayerIndex"],
            Endpoint::Games => &["LeagueGameFinderResults"],
            Endpoint::BoxScore | Endpoint::BoxScoreAdvanced => &["PlayerStats"],
            Endpoint::ShotChart => &["Shot_Chart_Detail"],
            Endpoint::PlayerTracking => &["PlayerTrackingStats", "PlayerStats"],
            Endpoint::Hustle => &["PlayerHustleStats", "PlayerStats"],
        }
    }

    fn stem_prefixes(self) -> &'static [&'static str] {
        match self {
            Endpoint::Teams => &["teams"],
            Endpoint::Players => &["active_players", "players"],
            Endpoint::Games => &["recent_games", "games", "league_game_finder"],
            Endpoint::BoxScore => &["boxscore", "box_score"],
            Endpoint::ShotChart => &["shot_chart"],
            Endpoint::BoxScoreAdvanced => &["boxscore_advanced"],
            Endpoint::PlayerTracking => &["player_tracking"],
            Endpoint::Hustle => &["hustle_stats"],
        }
    }

    /// Endpoint of a saved response such as `boxscore_0022300123_20240305_101500`.
    pub fn from_file_stem(stem: &str) -> Option<Self> {
        let stem = stem.to_ascii_lowercase();
        let matches = |prefix: &str| {
            stem == prefix
                || stem
                    .strip_prefix(prefix)
                    .is_some_and(|rest| rest.starts_with('_'))
        };
        // Longest prefix wins so `boxscore_advanced_*` is not read as a box score.
        Self::ALL
            .iter()
            .flat_map(|endpoint| {
                endpoint
                    .stem_prefixes()
                    .iter()
                    .map(move |prefix| (*endpoint, *prefix))
            })
            .filter(|(_, prefix)| matches(*prefix))
            .max_by_key(|(_, prefix)| prefix.len())
            .map(|(endpoint, _)| endpoint)
    }
}
