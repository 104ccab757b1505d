//! Advanced per-player metric families.
//!
//! Each family is a sparse row keyed by `player_game_id`. Every metric is
//! optional: a write only carries the metrics that are present, and a later
//! write for the same key fills in more of the row without erasing what an
//! earlier call stored.

use crate::records::{RawRecord, int, real};
use crate::upsert::{ColumnSet, ToCell};

/// Scalar type of a single advanced metric column.
pub trait Metric: Copy + ToCell {
    const SQL_TYPE: &'static str;
    fn read(record: &RawRecord, keys: &[&str]) -> Option<Self>;
}

impl Metric for i64 {
    const SQL_TYPE: &'static str = "INTEGER";

    fn read(record: &RawRecord, keys: &[&str]) -> Option<Self> {
        int(record, keys)
    }
}

impl Metric for f64 {
    const SQL_TYPE: &'static str = "REAL";

    fn read(record: &RawRecord, keys: &[&str]) -> Option<Self> {
        real(record, keys)
    }
}

/// A stored percentage recomputed from a made/attempted pair after merges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ratio {
    pub made: &'static str,
    pub attempted: &'static str,
    pub pct: &'static str,
}

pub trait AdvancedFamily: Clone + Default + std::fmt::Debug {
    const TABLE: &'static str;
    const LABEL: &'static str;
    const METRICS: &'static [(&'static str, &'static str)];
    const RATIOS: &'static [Ratio];

    /// Columns for the metrics that carry a value.
    fn present_columns(&self) -> ColumnSet;
    /// Overwrites this row's metrics with every metric present in `other`.
    fn merge_from(&mut self, other: &Self);
    /// Reads canonical column names from a loose record.
    fn from_record(record: &RawRecord) -> Self;
    fn is_empty(&self) -> bool;
}

macro_rules! advanced_family {
    (
        $(#[$meta:meta])*
        $name:ident {
            table: $table:literal,
            label: $label:literal,
            ratios: [$(($made:literal, $att:literal, $pct:literal)),* $(,)?],
            metrics: { $($field:ident: $ty:ty),* $(,)? }
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq)]
        pub struct $name {
            $(pub $field: Option<$ty>,)*
        }

        impl AdvancedFamily for $name {
            const TABLE: &'static str = $table;
            const LABEL: &'static str = $label;
            const METRICS: &'static [(&'static str, &'static str)] =
                &[$((stringify!($field), <$ty as Metric>::SQL_TYPE)),*];
            const RATIOS: &'static [Ratio] =
                &[$(Ratio { made: $made, attempted: $att, pct: $pct }),*];

            fn present_columns(&self) -> ColumnSet {
                let mut cols = ColumnSet::default();
                $(cols.set_present(stringify!($field), self.$field);)*
                cols
            }

            fn merge_from(&mut self, other: &Self) {
                $(if other.$field.is_some() {
                    self.$field = other.$field;
                })*
            }

            fn from_record(record: &RawRecord) -> Self {
                Self {
                    $($field: <$ty as Metric>::read(record, &[stringify!($field)]),)*
                }
            }

            fn is_empty(&self) -> bool {
                true $(&& self.$field.is_none())*
            }
        }
    };
}

advanced_family! {
    /// Shot-log zone buckets plus a non-exclusive dunk counter.
    ShotTracking {
        table: "fact_player_shot_tracking",
        label: "shot_tracking",
        ratios: [
            ("shots_made_0_3ft", "shots_attempted_0_3ft", "shots_pct_0_3ft"),
            ("shots_made_3_10ft", "shots_attempted_3_10ft", "shots_pct_3_10ft"),
            ("shots_made_10_16ft", "shots_attempted_10_16ft", "shots_pct_10_16ft"),
            ("shots_made_16ft_3pt", "shots_attempted_16ft_3pt", "shots_pct_16ft_3pt"),
            ("corner_3_made", "corner_3_attempted", "corner_3_pct"),
            ("above_break_3_made", "above_break_3_attempted", "above_break_3_pct"),
        ],
        metrics: {
            shots_made_0_3ft: i64,
            shots_attempted_0_3ft: i64,
            shots_pct_0_3ft: f64,
            shots_made_3_10ft: i64,
            shots_attempted_3_10ft: i64,
            shots_pct_3_10ft: f64,
            shots_made_10_16ft: i64,
            shots_attempted_10_16ft: i64,
            shots_pct_10_16ft: f64,
            shots_made_16ft_3pt: i64,
            shots_attempted_16ft_3pt: i64,
            shots_pct_16ft_3pt: f64,
            corner_3_made: i64,
            corner_3_attempted: i64,
            corner_3_pct: f64,
            above_break_3_made: i64,
            above_break_3_attempted: i64,
            above_break_3_pct: f64,
            dunk_made: i64,
            dunk_attempted: i64,
        }
    }
}

advanced_family! {
    Defensive {
        table: "fact_player_defensive",
        label: "defensive",
        ratios: [("contested_shots_made", "contested_shots", "contested_shots_pct")],
        metrics: {
            defensive_rebounds: i64,
            contested_shots: i64,
            contested_shots_made: i64,
            contested_shots_pct: f64,
            deflections: i64,
            charges_drawn: i64,
            box_outs: i64,
            loose_balls_recovered: i64,
            screen_assists: i64,
            defensive_win_shares: f64,
            defensive_rating: f64,
            steals_per_foul: f64,
            blocks_per_foul: f64,
            block_pct: f64,
            steal_pct: f64,
            defensive_box_plus_minus: f64,
        }
    }
}

advanced_family! {
    Playmaking {
        table: "fact_player_playmaking",
        label: "playmaking",
        ratios: [],
        metrics: {
            potential_assists: i64,
            assist_points_created: i64,
            passes_made: i64,
            passes_received: i64,
            secondary_assists: i64,
            free_throw_assists: i64,
            assist_to_turnover_ratio: f64,
            assist_ratio: f64,
            assist_pct: f64,
            time_of_possession: f64,
            avg_dribbles_per_touch: f64,
            avg_touch_time: f64,
            usage_pct: f64,
            front_court_touches: i64,
            elbow_touches: i64,
            post_touches: i64,
            paint_touches: i64,
        }
    }
}

advanced_family! {
    Efficiency {
        table: "fact_player_efficiency",
        label: "efficiency",
        ratios: [],
        metrics: {
            true_shooting_pct: f64,
            effective_fg_pct: f64,
            offensive_rating: f64,
            offensive_win_shares: f64,
            offensive_box_plus_minus: f64,
            player_impact_estimate: f64,
            game_score: f64,
            points_per_shot: f64,
            points_per_touch: f64,
            points_per_possession: f64,
            offensive_rebound_pct: f64,
            defensive_rebound_pct: f64,
            total_rebound_pct: f64,
            net_rating: f64,
            value_added: f64,
            estimated_wins_added: f64,
        }
    }
}

advanced_family! {
    Hustle {
        table: "fact_player_hustle",
        label: "hustle",
        ratios: [],
        metrics: {
            contested_shots_2pt: i64,
            contested_shots_3pt: i64,
            deflections: i64,
            loose_balls_recovered: i64,
            charges_drawn: i64,
            screen_assists: i64,
            screen_assist_points: i64,
            box_outs: i64,
            box_outs_offensive: i64,
            box_outs_defensive: i64,
            distance_miles: f64,
            distance_miles_offense: f64,
            distance_miles_defense: f64,
            avg_speed_mph: f64,
            avg_speed_mph_offense: f64,
            avg_speed_mph_defense: f64,
        }
    }
}

fn non_empty<F: AdvancedFamily>(family: F) -> Option<F> {
    (!family.is_empty()).then_some(family)
}

fn merge_slot<F: AdvancedFamily>(slot: &mut Option<F>, incoming: Option<F>) {
    let Some(incoming) = incoming else {
        return;
    };
    match slot {
        Some(existing) => existing.merge_from(&incoming),
        None => *slot = Some(incoming),
    }
}

/// All advanced families for one player-game, as gathered from however many
/// provider calls succeeded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdvancedStats {
    pub shot_tracking: Option<ShotTracking>,
    pub defensive: Option<Defensive>,
    pub playmaking: Option<Playmaking>,
    pub efficiency: Option<Efficiency>,
    pub hustle: Option<Hustle>,
}

impl AdvancedStats {
    pub fn is_empty(&self) -> bool {
        self.shot_tracking.is_none()
            && self.defensive.is_none()
            && self.playmaking.is_none()
            && self.efficiency.is_none()
            && self.hustle.is_none()
    }

    pub fn merge(&mut self, other: AdvancedStats) {
        merge_slot(&mut self.shot_tracking, other.shot_tracking);
        merge_slot(&mut self.defensive, other.defensive);
        merge_slot(&mut self.playmaking, other.playmaking);
        merge_slot(&mut self.efficiency, other.efficiency);
        merge_slot(&mut self.hustle, other.hustle);
    }

    /// Families read from a record already in canonical column names.
    pub fn from_canonical(record: &RawRecord) -> Self {
        Self {
            shot_tracking: non_empty(ShotTracking::from_record(record)),
            defensive: non_empty(Defensive::from_record(record)),
            playmaking: non_empty(Playmaking::from_record(record)),
            efficiency: non_empty(Efficiency::from_record(record)),
            hustle: non_empty(Hustle::from_record(record)),
        }
    }

    /// Ratings and rate stats from the advanced box score.
    pub fn from_advanced_box(row: &RawRecord) -> Self {
        let efficiency = Efficiency {
            offensive_rating: real(row, &["OFF_RATING", "E_OFF_RATING"]),
            net_rating: real(row, &["NET_RATING", "E_NET_RATING"]),
            effective_fg_pct: real(row, &["EFG_PCT"]),
            true_shooting_pct: real(row, &["TS_PCT"]),
            offensive_rebound_pct: real(row, &["OREB_PCT"]),
            defensive_rebound_pct: real(row, &["DREB_PCT"]),
            total_rebound_pct: real(row, &["REB_PCT"]),
            player_impact_estimate: real(row, &["PIE"]),
            ..Efficiency::default()
        };
        let playmaking = Playmaking {
            assist_pct: real(row, &["AST_PCT"]),
            assist_to_turnover_ratio: real(row, &["AST_TOV", "AST_TO"]),
            assist_ratio: real(row, &["AST_RATIO"]),
            usage_pct: real(row, &["USG_PCT", "E_USG_PCT"]),
            ..Playmaking::default()
        };
        let defensive = Defensive {
            defensive_rating: real(row, &["DEF_RATING", "E_DEF_RATING"]),
            steal_pct: real(row, &["STL_PCT"]),
            block_pct: real(row, &["BLK_PCT"]),
            ..Defensive::default()
        };
        Self {
            efficiency: non_empty(efficiency),
            playmaking: non_empty(playmaking),
            defensive: non_empty(defensive),
            ..Self::default()
        }
    }

    /// Passing, touch, and movement data from player tracking.
    pub fn from_tracking(row: &RawRecord) -> Self {
        let playmaking = Playmaking {
            potential_assists: int(row, &["POTENTIAL_AST"]),
            assist_points_created: int(row, &["AST_PTS_CREATED"]),
            passes_made: int(row, &["PASSES_MADE", "PASS"]),
            passes_received: int(row, &["PASSES_RECEIVED"]),
            secondary_assists: int(row, &["SECONDARY_AST", "SAST"]),
            free_throw_assists: int(row, &["FT_AST", "FTAST"]),
            time_of_possession: real(row, &["TIME_OF_POSS"]),
            avg_dribbles_per_touch: real(row, &["AVG_DRIB_PER_TOUCH"]),
            avg_touch_time: real(row, &["AVG_SEC_PER_TOUCH", "AVG_TOUCH_TIME"]),
            elbow_touches: int(row, &["ELBOW_TOUCHES"]),
            post_touches: int(row, &["POST_TOUCHES"]),
            paint_touches: int(row, &["PAINT_TOUCHES"]),
            front_court_touches: int(row, &["FRONT_CT_TOUCHES"]),
            ..Playmaking::default()
        };
        let efficiency = Efficiency {
            points_per_touch: real(row, &["PTS_PER_TOUCH"]),
            ..Efficiency::default()
        };
        let hustle = Hustle {
            distance_miles: real(row, &["DIST_MILES", "DIST"]),
            distance_miles_offense: real(row, &["DIST_MILES_OFF"]),
            distance_miles_defense: real(row, &["DIST_MILES_DEF"]),
            avg_speed_mph: real(row, &["AVG_SPEED", "SPD"]),
            avg_speed_mph_offense: real(row, &["AVG_SPEED_OFF"]),
            avg_speed_mph_defense: real(row, &["AVG_SPEED_DEF"]),
            ..Hustle::default()
        };
        Self {
            playmaking: non_empty(playmaking),
            efficiency: non_empty(efficiency),
            hustle: non_empty(hustle),
            ..Self::default()
        }
    }

    /// Effort plays from the hustle box score, mirrored into the defensive
    /// family where the concepts overlap.
    pub fn from_hustle(row: &RawRecord) -> Self {
        let contested_2pt = int(row, &["CONTESTED_SHOTS_2PT"]);
        let contested_3pt = int(row, &["CONTESTED_SHOTS_3PT"]);
        let deflections = int(row, &["DEFLECTIONS"]);
        let loose_balls = int(row, &["LOOSE_BALLS_RECOVERED"]);
        let charges = int(row, &["CHARGES_DRAWN"]);
        let screen_assists = int(row, &["SCREEN_ASSISTS"]);
        let box_outs = int(row, &["BOX_OUTS"]);
        let hustle = Hustle {
            contested_shots_2pt: contested_2pt,
            contested_shots_3pt: contested_3pt,
            deflections,
            loose_balls_recovered: loose_balls,
            charges_drawn: charges,
            screen_assists,
            screen_assist_points: int(row, &["SCREEN_AST_PTS"]),
            box_outs,
            box_outs_offensive: int(row, &["BOX_OUTS_OFF", "OFF_BOXOUTS"]),
            box_outs_defensive: int(row, &["BOX_OUTS_DEF", "DEF_BOXOUTS"]),
            ..Hustle::default()
        };
        let contested_shots = int(row, &["CONTESTED_SHOTS"]).or(match (contested_2pt, contested_3pt) {
            (Some(a), Some(b)) => Some(a + b),
            (a, b) => a.or(b),
        });
        let defensive = Defensive {
            contested_shots,
            deflections,
            charges_drawn: charges,
            box_outs,
            loose_balls_recovered: loose_balls,
            screen_assists,
            ..Defensive::default()
        };
        Self {
            hustle: non_empty(hustle),
            defensive: non_empty(defensive),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn raw(value: Value) -> RawRecord {
        match value {
            Value::Object(map) => map,
            _ => panic!("record must be an object"),
        }
    }

    #[test]
    fn metric_catalogue_matches_struct_fields() {
        assert_eq!(ShotTracking::METRICS.len(), 20);
        assert_eq!(ShotTracking::METRICS[2], ("shots_pct_0_3ft", "REAL"));
        assert_eq!(ShotTracking::RATIOS.len(), 6);
        assert_eq!(Defensive::RATIOS[0].pct, "contested_shots_pct");
        assert!(Playmaking::RATIOS.is_empty());
        assert_eq!(Hustle::TABLE, "fact_player_hustle");
    }

    #[test]
    fn present_columns_only_carry_values() {
        let shots = ShotTracking {
            shots_made_0_3ft: Some(3),
            shots_attempted_0_3ft: Some(5),
            ..ShotTracking::default()
        };
        let cols = shots.present_columns();
        assert_eq!(cols.len(), 2);
        assert!(cols.contains("shots_made_0_3ft"));
        assert!(!cols.contains("corner_3_made"));
    }

    #[test]
    fn merge_keeps_earlier_metrics() {
        let mut stored = Hustle {
            deflections: Some(4),
            box_outs: Some(2),
            ..Hustle::default()
        };
        stored.merge_from(&Hustle {
            box_outs: Some(3),
            distance_miles: Some(2.4),
            ..Hustle::default()
        });
        assert_eq!(stored.deflections, Some(4));
        assert_eq!(stored.box_outs, Some(3));
        assert_eq!(stored.distance_miles, Some(2.4));
    }

    #[test]
    fn from_record_reads_canonical_names() {
        let shots = ShotTracking::from_record(&raw(json!({
            "corner_3_made": 1, "corner_3_attempted": "2", "unrelated": 9
        })));
        assert_eq!(shots.corner_3_made, Some(1));
        assert_eq!(shots.corner_3_attempted, Some(2));
        assert_eq!(shots.present_columns().len(), 2);
        assert!(ShotTracking::from_record(&raw(json!({"x": 1}))).is_empty());
    }

    #[test]
    fn hustle_rows_feed_defensive_family() {
        let stats = AdvancedStats::from_hustle(&raw(json!({
            "PLAYER_ID": 2544, "CONTESTED_SHOTS_2PT": 5, "CONTESTED_SHOTS_3PT": 3,
            "DEFLECTIONS": 2, "BOX_OUTS": 1, "SCREEN_AST_PTS": 6
        })));
        let defensive = stats.defensive.expect("defensive");
        assert_eq!(defensive.contested_shots, Some(8));
        assert_eq!(defensive.deflections, Some(2));
        let hustle = stats.hustle.expect("hustle");
        assert_eq!(hustle.screen_assist_points, Some(6));
        assert!(stats.playmaking.is_none());
    }

    #[test]
    fn bundles_merge_per_family() {
        let mut stats = AdvancedStats::from_advanced_box(&raw(json!({
            "OFF_RATING": 118.2, "DEF_RATING": 104.5, "USG_PCT": 0.31
        })));
        stats.merge(AdvancedStats::from_tracking(&raw(json!({
            "PASSES_MADE": 48, "PTS_PER_TOUCH": 0.42, "DIST_MILES": 2.6
        }))));
        let playmaking = stats.playmaking.as_ref().expect("playmaking");
        assert_eq!(playmaking.usage_pct, Some(0.31));
        assert_eq!(playmaking.passes_made, Some(48));
        let efficiency = stats.efficiency.as_ref().expect("efficiency");
        assert_eq!(efficiency.offensive_rating, Some(118.2));
        assert_eq!(efficiency.points_per_touch, Some(0.42));
        assert_eq!(stats.defensive.as_ref().and_then(|d| d.defensive_rating), Some(104.5));
        assert!(stats.shot_tracking.is_none());
        assert!(!stats.is_empty());
    }
}
