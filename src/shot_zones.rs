use crate::advanced::ShotTracking;
use crate::records::{RawRecord, int, text};

/// `made / attempted` when attempts are positive; otherwise no value.
pub fn ratio(made: Option<i64>, attempted: Option<i64>) -> Option<f64> {
    match (made, attempted) {
        (Some(made), Some(attempted)) if attempted > 0 => Some(made as f64 / attempted as f64),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShotZone {
    RestrictedArea,
    ShortPaint,
    ShortMidRange,
    LongMidRange,
    Corner3,
    AboveBreak3,
}

impl ShotZone {
    pub const ALL: [ShotZone; 6] = [
        ShotZone::RestrictedArea,
        ShotZone::ShortPaint,
        ShotZone::ShortMidRange,
        ShotZone::LongMidRange,
        ShotZone::Corner3,
        ShotZone::AboveBreak3,
    ];

    /// Buckets a shot by the provider's zone and distance labels. Backcourt
    /// heaves and unknown labels fall outside all six zones.
    pub fn classify(zone_basic: &str, zone_range: Option<&str>) -> Option<Self> {
        let zone = zone_basic.trim();
        match zone {
            "Restricted Area" => Some(Self::RestrictedArea),
            "In The Paint (Non-RA)" => Some(Self::ShortPaint),
            "Mid-Range" => {
                if zone_range.is_some_and(|r| r.trim() == "8-16 ft.") {
                    Some(Self::ShortMidRange)
                } else {
                    Some(Self::LongMidRange)
                }
            }
            "Above the Break 3" => Some(Self::AboveBreak3),
            _ if zone.ends_with("Corner 3") => Some(Self::Corner3),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::RestrictedArea => "0_3ft",
            Self::ShortPaint => "3_10ft",
            Self::ShortMidRange => "10_16ft",
            Self::LongMidRange => "16ft_3pt",
            Self::Corner3 => "corner_3",
            Self::AboveBreak3 => "above_break_3",
        }
    }

    fn index(self) -> usize {
        match self {
            Self::RestrictedArea => 0,
            Self::ShortPaint => 1,
            Self::ShortMidRange => 2,
            Self::LongMidRange => 3,
            Self::Corner3 => 4,
            Self::AboveBreak3 => 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShotEvent {
    pub player_id: Option<String>,
    pub game_id: Option<String>,
    pub zone: Option<ShotZone>,
    pub made: bool,
    pub dunk: bool,
}

impl ShotEvent {
    pub fn from_raw(record: &RawRecord) -> Self {
        let zone_basic = text(record, &["SHOT_ZONE_BASIC", "shot_zone_basic"]).unwrap_or_default();
        let zone_range = text(record, &["SHOT_ZONE_RANGE", "shot_zone_range"]);
        let action = text(record, &["ACTION_TYPE", "action_type"]).unwrap_or_default();
        Self {
            player_id: text(record, &["PLAYER_ID", "player_id"]),
            game_id: text(record, &["GAME_ID", "game_id"]),
            zone: ShotZone::classify(&zone_basic, zone_range.as_deref()),
            made: int(record, &["SHOT_MADE_FLAG", "shot_made_flag"]).is_some_and(|f| f != 0),
            dunk: action.to_ascii_lowercase().contains("dunk"),
        }
    }
}

/// Running made/attempted counts for one player-game's shot log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShotTally {
    made: [i64; 6],
    attempted: [i64; 6],
    dunk_made: i64,
    dunk_attempted: i64,
    unclassified: i64,
}

impl ShotTally {
    pub fn add(&mut self, shot: &ShotEvent) {
        match shot.zone {
            Some(zone) => {
                let idx = zone.index();
                self.attempted[idx] += 1;
                if shot.made {
                    self.made[idx] += 1;
                }
            }
            None => self.unclassified += 1,
        }
        if shot.dunk {
            self.dunk_attempted += 1;
            if shot.made {
                self.dunk_made += 1;
            }
        }
    }

    pub fn zone(&self, zone: ShotZone) -> (i64, i64) {
        (self.made[zone.index()], self.attempted[zone.index()])
    }

    /// Attempts across the six zones; equals field-goal attempts when the
    /// shot log is complete.
    pub fn total_attempted(&self) -> i64 {
        self.attempted.iter().sum()
    }

    pub fn unclassified(&self) -> i64 {
        self.unclassified
    }

    pub fn to_metrics(&self) -> ShotTracking {
        let pair = |zone: ShotZone| {
            let (made, attempted) = self.zone(zone);
            (Some(made), Some(attempted), ratio(Some(made), Some(attempted)))
        };
        let (m0, a0, p0) = pair(ShotZone::RestrictedArea);
        let (m1, a1, p1) = pair(ShotZone::ShortPaint);
        let (m2, a2, p2) = pair(ShotZone::ShortMidRange);
        let (m3, a3, p3) = pair(ShotZone::LongMidRange);
        let (m4, a4, p4) = pair(ShotZone::Corner3);
        let (m5, a5, p5) = pair(ShotZone::AboveBreak3);
        ShotTracking {
            shots_made_0_3ft: m0,
            shots_attempted_0_3ft: a0,
            shots_pct_0_3ft: p0,
            shots_made_3_10ft: m1,
            shots_attempted_3_10ft: a1,
            shots_pct_3_10ft: p1,
            shots_made_10_16ft: m2,
            shots_attempted_10_16ft: a2,
            shots_pct_10_16ft: p2,
            shots_made_16ft_3pt: m3,
            shots_attempted_16ft_3pt: a3,
            shots_pct_16ft_3pt: p3,
            corner_3_made: m4,
            corner_3_attempted: a4,
            corner_3_pct: p4,
            above_break_3_made: m5,
            above_break_3_attempted: a5,
            above_break_3_pct: p5,
            dunk_made: Some(self.dunk_made),
            dunk_attempted: Some(self.dunk_attempted),
        }
    }
}
