//! Raw provider records and their typed, canonical forms.
//!
//! Provider rows are loose field maps in the upstream vocabulary (`PTS`,
//! `FG3M`, `TEAM_ID`, ...). Every accessor takes a list of aliases so the same
//! record type accepts both provider and canonical field names.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::games::season_type_for;
use crate::keys::{parse_calendar_date, player_game_key, split_player_game_key, team_game_key};
use crate::shot_zones::ratio;
use crate::upsert::ColumnSet;

pub type RawRecord = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("invalid key `{0}`")]
    InvalidKey(String),
}

fn lookup<'a>(record: &'a RawRecord, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().filter_map(|k| record.get(*k)).find(|v| match v {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        _ => true,
    })
}

/// String field; integral numbers render without a fractional part so
/// `2544` and `2544.0` both become `"2544"`.
pub fn text(record: &RawRecord, keys: &[&str]) -> Option<String> {
    match lookup(record, keys)? {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return Some(i.to_string());
            }
            let f = n.as_f64()?;
            if f.is_finite() && f.fract() == 0.0 && f.abs() < 9.0e15 {
                Some(format!("{}", f as i64))
            } else {
                Some(n.to_string())
            }
        }
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub fn int(record: &RawRecord, keys: &[&str]) -> Option<i64> {
    match lookup(record, keys)? {
        Value::Number(n) => n.as_i64().or_else(|| {
            let f = n.as_f64()?;
            (f.is_finite() && f.fract() == 0.0).then_some(f as i64)
        }),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| {
                let f = s.parse::<f64>().ok()?;
                (f.is_finite() && f.fract() == 0.0).then_some(f as i64)
            })
        }
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

pub fn real(record: &RawRecord, keys: &[&str]) -> Option<f64> {
    let v = match lookup(record, keys)? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    v.is_finite().then_some(v)
}

pub fn flag(record: &RawRecord, keys: &[&str]) -> Option<bool> {
    match lookup(record, keys)? {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|i| i != 0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "t" | "yes" | "y" => Some(true),
            "0" | "false" | "f" | "no" | "n" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn required(record: &RawRecord, field: &'static str, keys: &[&str]) -> Result<String, RecordError> {
    text(record, keys).ok_or(RecordError::MissingField(field))
}

/// Decimal minutes from `"36:12"`, `"PT36M12.00S"` or a plain number.
pub fn parse_minutes(raw: &Value) -> Option<f64> {
    let minutes = match raw {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let s = s.trim();
            if let Some(rest) = s.strip_prefix("PT") {
                let (mins, rest) = rest.split_once('M')?;
                let secs = rest.trim_end_matches('S');
                let secs = if secs.is_empty() { 0.0 } else { secs.parse::<f64>().ok()? };
                mins.parse::<f64>().ok()? + secs / 60.0
            } else if let Some((mins, secs)) = s.split_once(':') {
                mins.parse::<f64>().ok()?.trunc() + secs.parse::<f64>().ok()? / 60.0
            } else {
                s.parse::<f64>().ok()?
            }
        }
        _ => return None,
    };
    minutes.is_finite().then_some(minutes)
}

/// Inches from a `"6-9"` feet-inches height or a bare inch count.
pub fn parse_height_inches(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if let Some((feet, inches)) = raw.split_once('-') {
        let feet = feet.trim().parse::<i64>().ok()?;
        let inches = inches.trim().parse::<i64>().ok()?;
        return feet.checked_mul(12)?.checked_add(inches);
    }
    raw.parse::<i64>().ok()
}

/// Splits a display name at its first space into first and last name.
pub fn split_name(full: &str) -> (Option<String>, Option<String>) {
    let full = full.trim();
    if full.is_empty() {
        return (None, None);
    }
    match full.split_once(' ') {
        Some((first, last)) => (
            Some(first.to_string()),
            Some(last.trim().to_string()).filter(|s| !s.is_empty()),
        ),
        None => (Some(full.to_string()), None),
    }
}

fn iso_date(raw: Option<String>) -> Option<String> {
    let raw = raw?;
    match parse_calendar_date(&raw) {
        Some(date) => Some(date.format("%Y-%m-%d").to_string()),
        None => Some(raw),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TeamRecord {
    pub team_id: String,
    pub team_name: Option<String>,
    pub team_city: Option<String>,
    pub team_abbreviation: Option<String>,
    pub conference: Option<String>,
    pub division: Option<String>,
}

impl TeamRecord {
    pub fn from_raw(record: &RawRecord) -> Result<Self, RecordError> {
        Ok(Self {
            team_id: required(record, "team_id", &["team_id", "TEAM_ID", "id"])?,
            team_name: text(record, &["team_name", "TEAM_NAME", "nickname"]),
            team_city: text(record, &["team_city", "TEAM_CITY", "city"]),
            team_abbreviation: text(
                record,
                &["team_abbreviation", "TEAM_ABBREVIATION", "abbreviation"],
            ),
            conference: text(record, &["conference", "CONFERENCE", "TEAM_CONFERENCE"]),
            division: text(record, &["division", "DIVISION", "TEAM_DIVISION"]),
        })
    }

    pub fn columns(&self) -> ColumnSet {
        let mut cols = ColumnSet::default();
        cols.set_present("team_name", self.team_name.as_deref());
        cols.set_present("team_city", self.team_city.as_deref());
        cols.set_present("team_abbreviation", self.team_abbreviation.as_deref());
        cols.set_present("conference", self.conference.as_deref());
        cols.set_present("division", self.division.as_deref());
        cols
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerRecord {
    pub player_id: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub jersey_num: Option<i64>,
    pub position: Option<String>,
    pub height_inches: Option<i64>,
    pub weight_lbs: Option<i64>,
    pub birth_date: Option<String>,
    pub draft_year: Option<i64>,
}

impl PlayerRecord {
    pub fn from_raw(record: &RawRecord) -> Result<Self, RecordError> {
        let player_id = required(
            record,
            "player_id",
            &["player_id", "PLAYER_ID", "PERSON_ID", "id"],
        )?;
        let mut first_name = text(record, &["first_name", "FIRST_NAME"]);
        let mut last_name = text(record, &["last_name", "LAST_NAME"]);
        if first_name.is_none()
            && last_name.is_none()
            && let Some(full) = text(
                record,
                &["full_name", "DISPLAY_FIRST_LAST", "PLAYER_NAME", "PLAYER"],
            )
        {
            (first_name, last_name) = split_name(&full);
        }
        let height_inches = int(record, &["height_inches"]).or_else(|| {
            text(record, &["HEIGHT", "height"]).and_then(|h| parse_height_inches(&h))
        });
        Ok(Self {
            player_id,
            first_name,
            last_name,
            jersey_num: int(record, &["jersey_num", "JERSEY", "jersey"]),
            position: text(record, &["position", "POSITION"]),
            height_inches,
            weight_lbs: int(record, &["weight_lbs", "WEIGHT", "weight"]),
            birth_date: iso_date(text(record, &["birth_date", "BIRTHDATE"])),
            draft_year: int(record, &["draft_year", "DRAFT_YEAR"]),
        })
    }

    /// Minimal record carrying only identity and name, used when a box score
    /// references a player the dimension has not seen yet.
    pub fn from_display_name(player_id: &str, display_name: &str) -> Self {
        let (first_name, last_name) = split_name(display_name);
        Self {
            player_id: player_id.to_string(),
            first_name,
            last_name,
            jersey_num: None,
            position: None,
            height_inches: None,
            weight_lbs: None,
            birth_date: None,
            draft_year: None,
        }
    }

    pub fn columns(&self) -> ColumnSet {
        let mut cols = ColumnSet::default();
        cols.set_present("first_name", self.first_name.as_deref());
        cols.set_present("last_name", self.last_name.as_deref());
        cols.set_present("jersey_num", self.jersey_num);
        cols.set_present("position", self.position.as_deref());
        cols.set_present("height_inches", self.height_inches);
        cols.set_present("weight_lbs", self.weight_lbs);
        cols.set_present("birth_date", self.birth_date.as_deref());
        cols.set_present("draft_year", self.draft_year);
        cols
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GameScore {
    pub home_team_score: Option<i64>,
    pub away_team_score: Option<i64>,
    pub home_quarters: [Option<i64>; 4],
    pub away_quarters: [Option<i64>; 4],
    pub home_ot_score: Option<i64>,
    pub away_ot_score: Option<i64>,
    pub attendance: Option<i64>,
    pub lead_changes: Option<i64>,
    pub times_tied: Option<i64>,
    pub duration_minutes: Option<i64>,
}

const HOME_QUARTERS: [&str; 4] = ["home_q1_score", "home_q2_score", "home_q3_score", "home_q4_score"];
const AWAY_QUARTERS: [&str; 4] = ["away_q1_score", "away_q2_score", "away_q3_score", "away_q4_score"];

impl GameScore {
    /// `None` when the record carries no score or game-summary data at all.
    pub fn from_raw(record: &RawRecord) -> Option<Self> {
        let mut score = Self {
            home_team_score: int(record, &["home_team_score", "PTS_HOME", "HOME_TEAM_SCORE"]),
            away_team_score: int(record, &["away_team_score", "PTS_AWAY", "AWAY_TEAM_SCORE"]),
            home_ot_score: int(record, &["home_ot_score"]),
            away_ot_score: int(record, &["away_ot_score"]),
            attendance: int(record, &["attendance", "ATTENDANCE"]),
            lead_changes: int(record, &["lead_changes", "LEAD_CHANGES"]),
            times_tied: int(record, &["times_tied", "TIMES_TIED"]),
            duration_minutes: int(record, &["duration_minutes"]),
            ..Self::default()
        };
        for (slot, key) in score.home_quarters.iter_mut().zip(HOME_QUARTERS) {
            *slot = int(record, &[key]);
        }
        for (slot, key) in score.away_quarters.iter_mut().zip(AWAY_QUARTERS) {
            *slot = int(record, &[key]);
        }
        (score != Self::default()).then_some(score)
    }

    pub fn write(&self, cols: &mut ColumnSet) {
        cols.set("home_team_score", &self.home_team_score);
        cols.set("away_team_score", &self.away_team_score);
        for (value, key) in self.home_quarters.iter().zip(HOME_QUARTERS) {
            cols.set(key, value);
        }
        for (value, key) in self.away_quarters.iter().zip(AWAY_QUARTERS) {
            cols.set(key, value);
        }
        cols.set("home_ot_score", &self.home_ot_score);
        cols.set("away_ot_score", &self.away_ot_score);
        cols.set("attendance", &self.attendance);
        cols.set("lead_changes", &self.lead_changes);
        cols.set("times_tied", &self.times_tied);
        cols.set("duration_minutes", &self.duration_minutes);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GameRecord {
    pub game_id: String,
    pub game_date: Option<String>,
    pub season: Option<String>,
    pub season_type: Option<String>,
    pub home_team_id: Option<String>,
    pub away_team_id: Option<String>,
    pub venue_id: Option<String>,
    pub score: Option<GameScore>,
}

impl GameRecord {
    pub fn from_raw(record: &RawRecord) -> Result<Self, RecordError> {
        let season = text(record, &["season", "SEASON_ID", "SEASON"]);
        let season_type = text(record, &["season_type", "SEASON_TYPE"])
            .or_else(|| season.as_deref().map(|s| season_type_for(s).to_string()));
        Ok(Self {
            game_id: required(record, "game_id", &["game_id", "GAME_ID", "gameId"])?,
            game_date: iso_date(text(
                record,
                &["game_date", "GAME_DATE", "GAME_DATE_EST", "gameDate"],
            )),
            season,
            season_type,
            home_team_id: text(record, &["home_team_id", "HOME_TEAM_ID"]),
            away_team_id: text(record, &["away_team_id", "VISITOR_TEAM_ID", "AWAY_TEAM_ID"]),
            venue_id: text(record, &["venue_id", "ARENA_ID"]),
            score: GameScore::from_raw(record),
        })
    }

    pub fn columns(&self, date_id: Option<&str>) -> ColumnSet {
        let mut cols = ColumnSet::default();
        cols.set_present("game_date", self.game_date.as_deref());
        cols.set_present("date_id", date_id);
        cols.set_present("season", self.season.as_deref());
        cols.set_present("season_type", self.season_type.as_deref());
        cols.set_present("home_team_id", self.home_team_id.as_deref());
        cols.set_present("away_team_id", self.away_team_id.as_deref());
        cols.set_present("venue_id", self.venue_id.as_deref());
        cols
    }

    /// Full `fact_game_stats` snapshot, or `None` without score data.
    pub fn stats_columns(&self, date_id: Option<&str>) -> Option<ColumnSet> {
        let score = self.score.as_ref()?;
        let mut cols = ColumnSet::default();
        cols.set("date_id", &date_id);
        cols.set("home_team_id", &self.home_team_id);
        cols.set("away_team_id", &self.away_team_id);
        score.write(&mut cols);
        Some(cols)
    }
}

/// Made/attempted/percentage triples shared by player and team box scores.
/// A missing provider percentage is derived from the counts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShootingSplits {
    pub fg_made: Option<i64>,
    pub fg_attempted: Option<i64>,
    pub fg_pct: Option<f64>,
    pub fg3_made: Option<i64>,
    pub fg3_attempted: Option<i64>,
    pub fg3_pct: Option<f64>,
    pub ft_made: Option<i64>,
    pub ft_attempted: Option<i64>,
    pub ft_pct: Option<f64>,
}

impl ShootingSplits {
    pub fn from_raw(record: &RawRecord) -> Self {
        let fg_made = int(record, &["fg_made", "FGM"]);
        let fg_attempted = int(record, &["fg_attempted", "FGA"]);
        let fg3_made = int(record, &["fg3_made", "FG3M"]);
        let fg3_attempted = int(record, &["fg3_attempted", "FG3A"]);
        let ft_made = int(record, &["ft_made", "FTM"]);
        let ft_attempted = int(record, &["ft_attempted", "FTA"]);
        Self {
            fg_pct: real(record, &["fg_pct", "FG_PCT"]).or_else(|| ratio(fg_made, fg_attempted)),
            fg3_pct: real(record, &["fg3_pct", "FG3_PCT"])
                .or_else(|| ratio(fg3_made, fg3_attempted)),
            ft_pct: real(record, &["ft_pct", "FT_PCT"]).or_else(|| ratio(ft_made, ft_attempted)),
            fg_made,
            fg_attempted,
            fg3_made,
            fg3_attempted,
            ft_made,
            ft_attempted,
        }
    }

    pub fn write(&self, cols: &mut ColumnSet) {
        cols.set("fg_made", &self.fg_made);
        cols.set("fg_attempted", &self.fg_attempted);
        cols.set("fg_pct", &self.fg_pct);
        cols.set("fg3_made", &self.fg3_made);
        cols.set("fg3_attempted", &self.fg3_attempted);
        cols.set("fg3_pct", &self.fg3_pct);
        cols.set("ft_made", &self.ft_made);
        cols.set("ft_attempted", &self.ft_attempted);
        cols.set("ft_pct", &self.ft_pct);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerGameStatsRecord {
    pub player_game_id: String,
    pub game_id: String,
    pub player_id: String,
    pub team_id: Option<String>,
    pub player_name: Option<String>,
    pub minutes_played: Option<f64>,
    pub points: Option<i64>,
    pub assists: Option<i64>,
    pub rebounds: Option<i64>,
    pub steals: Option<i64>,
    pub blocks: Option<i64>,
    pub turnovers: Option<i64>,
    pub personal_fouls: Option<i64>,
    pub shooting: ShootingSplits,
    pub plus_minus: Option<i64>,
}

impl PlayerGameStatsRecord {
    pub fn from_raw(record: &RawRecord) -> Result<Self, RecordError> {
        let game_id = text(record, &["game_id", "GAME_ID", "gameId"]);
        let player_id = text(record, &["player_id", "PLAYER_ID", "personId"]);
        let (game_id, player_id) = match (game_id, player_id) {
            (Some(g), Some(p)) => (g, p),
            _ => {
                let composite = required(record, "player_game_id", &["player_game_id"])?;
                let (g, p) = split_player_game_key(&composite)
                    .ok_or_else(|| RecordError::InvalidKey(composite.clone()))?;
                (g.to_string(), p.to_string())
            }
        };
        let minutes_played = lookup(record, &["minutes_played", "MIN", "minutes"])
            .and_then(parse_minutes);
        Ok(Self {
            player_game_id: player_game_key(&game_id, &player_id),
            game_id,
            player_id,
            team_id: text(record, &["team_id", "TEAM_ID", "teamId"]),
            player_name: text(record, &["player_name", "PLAYER_NAME", "full_name"]),
            minutes_played,
            points: int(record, &["points", "PTS"]),
            assists: int(record, &["assists", "AST"]),
            rebounds: int(record, &["rebounds", "REB"]),
            steals: int(record, &["steals", "STL"]),
            blocks: int(record, &["blocks", "BLK"]),
            turnovers: int(record, &["turnovers", "TO", "TOV"]),
            personal_fouls: int(record, &["personal_fouls", "PF"]),
            shooting: ShootingSplits::from_raw(record),
            plus_minus: int(record, &["plus_minus", "PLUS_MINUS"]),
        })
    }

    /// Snapshot columns; metrics absent from the record are written as NULL.
    pub fn columns(&self, team_id: Option<&str>, date_id: Option<&str>) -> ColumnSet {
        let mut cols = ColumnSet::default();
        cols.set("game_id", self.game_id.as_str());
        cols.set("player_id", self.player_id.as_str());
        cols.set("team_id", &team_id);
        cols.set("date_id", &date_id);
        cols.set("minutes_played", &self.minutes_played);
        cols.set("points", &self.points);
        cols.set("assists", &self.assists);
        cols.set("rebounds", &self.rebounds);
        cols.set("steals", &self.steals);
        cols.set("blocks", &self.blocks);
        cols.set("turnovers", &self.turnovers);
        cols.set("personal_fouls", &self.personal_fouls);
        self.shooting.write(&mut cols);
        cols.set("plus_minus", &self.plus_minus);
        cols
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TeamGameStatsRecord {
    pub team_game_id: String,
    pub game_id: String,
    pub team_id: String,
    pub is_home: Option<bool>,
    pub game_date: Option<String>,
    pub points: Option<i64>,
    pub assists: Option<i64>,
    pub rebounds: Option<i64>,
    pub offensive_rebounds: Option<i64>,
    pub defensive_rebounds: Option<i64>,
    pub steals: Option<i64>,
    pub blocks: Option<i64>,
    pub turnovers: Option<i64>,
    pub personal_fouls: Option<i64>,
    pub shooting: ShootingSplits,
    pub fast_break_points: Option<i64>,
    pub points_in_paint: Option<i64>,
    pub points_off_turnovers: Option<i64>,
    pub second_chance_points: Option<i64>,
}

impl TeamGameStatsRecord {
    pub fn from_raw(record: &RawRecord) -> Result<Self, RecordError> {
        let game_id = required(record, "game_id", &["game_id", "GAME_ID", "gameId"])?;
        let team_id = required(record, "team_id", &["team_id", "TEAM_ID", "teamId"])?;
        Ok(Self {
            team_game_id: team_game_key(&game_id, &team_id),
            is_home: flag(record, &["is_home", "IS_HOME"]),
            game_date: iso_date(text(record, &["game_date", "GAME_DATE"])),
            points: int(record, &["points", "PTS"]),
            assists: int(record, &["assists", "AST"]),
            rebounds: int(record, &["rebounds", "REB"]),
            offensive_rebounds: int(record, &["offensive_rebounds", "OREB"]),
            defensive_rebounds: int(record, &["defensive_rebounds", "DREB"]),
            steals: int(record, &["steals", "STL"]),
            blocks: int(record, &["blocks", "BLK"]),
            turnovers: int(record, &["turnovers", "TOV", "TO"]),
            personal_fouls: int(record, &["personal_fouls", "PF"]),
            shooting: ShootingSplits::from_raw(record),
            fast_break_points: int(record, &["fast_break_points", "PTS_FB"]),
            points_in_paint: int(record, &["points_in_paint", "PTS_PAINT"]),
            points_off_turnovers: int(record, &["points_off_turnovers", "PTS_OFF_TO"]),
            second_chance_points: int(record, &["second_chance_points", "PTS_2ND_CHANCE"]),
            game_id,
            team_id,
        })
    }

    pub fn columns(&self, date_id: Option<&str>) -> ColumnSet {
        let mut cols = ColumnSet::default();
        cols.set("game_id", self.game_id.as_str());
        cols.set("team_id", self.team_id.as_str());
        cols.set("date_id", &date_id);
        cols.set("is_home", &self.is_home);
        cols.set("points", &self.points);
        cols.set("assists", &self.assists);
        cols.set("rebounds", &self.rebounds);
        cols.set("offensive_rebounds", &self.offensive_rebounds);
        cols.set("defensive_rebounds", &self.defensive_rebounds);
        cols.set("steals", &self.steals);
        cols.set("blocks", &self.blocks);
        cols.set("turnovers", &self.turnovers);
        cols.set("personal_fouls", &self.personal_fouls);
        self.shooting.write(&mut cols);
        cols.set("fast_break_points", &self.fast_break_points);
        cols.set("points_in_paint", &self.points_in_paint);
        cols.set("points_off_turnovers", &self.points_off_turnovers);
        cols.set("second_chance_points", &self.second_chance_points);
        cols
    }
}
