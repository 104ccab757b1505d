use chrono::NaiveDate;

pub fn parse_calendar_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Some(date);
    }
    // "2024-03-05T00:00:00" and "2024-03-05 19:30:00" both carry the date up front.
    if let Some(prefix) = trimmed.get(..10)
        && let Ok(date) = NaiveDate::parse_from_str(prefix, "%Y-%m-%d")
    {
        return Some(date);
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%m/%d/%Y") {
        return Some(date);
    }
    if trimmed.len() == 8 && trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return NaiveDate::parse_from_str(trimmed, "%Y%m%d").ok();
    }
    None
}

/// Eight digit `YYYYMMDD` key for a raw calendar date, or `None` when the
/// input is not a recognisable date.
pub fn date_key(raw: &str) -> Option<String> {
    parse_calendar_date(raw).map(date_key_for)
}

pub fn date_key_for(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

pub fn player_game_key(game_id: &str, player_id: &str) -> String {
    format!("{game_id}_{player_id}")
}

pub fn team_game_key(game_id: &str, team_id: &str) -> String {
    format!("{game_id}_{team_id}")
}

/// Splits a composite `{game}_{player}` key at the first separator.
pub fn split_player_game_key(key: &str) -> Option<(&str, &str)> {
    let (game_id, player_id) = key.split_once('_')?;
    if game_id.is_empty() || player_id.is_empty() {
        return None;
    }
    Some((game_id, player_id))
}
