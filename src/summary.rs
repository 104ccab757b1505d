use std::collections::BTreeMap;
use std::fmt;
use std::ops::AddAssign;

use serde::Serialize;
use tracing::info;

use crate::facts::AdvancedOutcome;
use crate::upsert::WriteOutcome;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpsertCounts {
    pub added: usize,
    pub updated: usize,
    pub skipped: usize,
}

impl UpsertCounts {
    /// `None` marks a record that was rejected and skipped.
    pub fn record(&mut self, outcome: Option<WriteOutcome>) {
        match outcome {
            Some(WriteOutcome::Inserted) => self.added += 1,
            Some(WriteOutcome::Updated) => self.updated += 1,
            None => self.skipped += 1,
        }
    }

    pub fn written(&self) -> usize {
        self.added + self.updated
    }

    pub fn log(&self, batch: &str) {
        info!(
            batch,
            added = self.added,
            updated = self.updated,
            skipped = self.skipped,
            "batch committed"
        );
    }
}

impl AddAssign for UpsertCounts {
    fn add_assign(&mut self, rhs: Self) {
        self.added += rhs.added;
        self.updated += rhs.updated;
        self.skipped += rhs.skipped;
    }
}

impl fmt::Display for UpsertCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "added={} updated={} skipped={}",
            self.added, self.updated, self.skipped
        )
    }
}

/// Advanced-family write tallies, keyed by family label.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AdvancedCounts {
    pub families: BTreeMap<&'static str, UpsertCounts>,
    pub missing_anchor: usize,
    pub empty: usize,
    pub rejected: usize,
}

impl AdvancedCounts {
    pub fn record(&mut self, family: &'static str, outcome: AdvancedOutcome) {
        match outcome {
            AdvancedOutcome::Written(written) => {
                self.families
                    .entry(family)
                    .or_default()
                    .record(Some(written));
            }
            AdvancedOutcome::MissingAnchor => self.missing_anchor += 1,
            AdvancedOutcome::NoMetrics => self.empty += 1,
            AdvancedOutcome::Rejected => self.rejected += 1,
        }
    }

    pub fn family(&self, label: &str) -> UpsertCounts {
        self.families.get(label).copied().unwrap_or_default()
    }

    pub fn written(&self) -> usize {
        self.families.values().map(UpsertCounts::written).sum()
    }

    pub fn merge(&mut self, other: AdvancedCounts) {
        for (family, counts) in other.families {
            *self.families.entry(family).or_default() += counts;
        }
        self.missing_anchor += other.missing_anchor;
        self.empty += other.empty;
        self.rejected += other.rejected;
    }

    pub fn log(&self, batch: &str) {
        info!(
            batch,
            written = self.written(),
            missing_anchor = self.missing_anchor,
            rejected = self.rejected,
            "advanced batch committed"
        );
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ShotLogCounts {
    pub shots: usize,
    pub player_games: usize,
    pub unclassified: usize,
    pub unkeyed: usize,
    pub advanced: AdvancedCounts,
}

/// Outcome of one load pass, printed for operators and stored with the run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadSummary {
    pub teams: UpsertCounts,
    pub players: UpsertCounts,
    pub games: UpsertCounts,
    pub team_game_stats: UpsertCounts,
    pub player_game_stats: UpsertCounts,
    pub shot_log: ShotLogCounts,
    pub advanced: AdvancedCounts,
}

impl LoadSummary {
    pub fn totals(&self) -> UpsertCounts {
        let mut total = UpsertCounts::default();
        for counts in [
            self.teams,
            self.players,
            self.games,
            self.team_game_stats,
            self.player_game_stats,
        ] {
            total += counts;
        }
        for counts in self
            .advanced
            .families
            .values()
            .chain(self.shot_log.advanced.families.values())
        {
            total += *counts;
        }
        total.skipped += self.advanced.rejected + self.shot_log.advanced.rejected;
        total
    }
}

impl fmt::Display for LoadSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "teams: {}", self.teams)?;
        writeln!(f, "players: {}", self.players)?;
        writeln!(f, "games: {}", self.games)?;
        writeln!(f, "team game stats: {}", self.team_game_stats)?;
        writeln!(f, "player game stats: {}", self.player_game_stats)?;
        writeln!(
            f,
            "shot log: shots={} player_games={} unclassified={}",
            self.shot_log.shots, self.shot_log.player_games, self.shot_log.unclassified
        )?;
        let mut advanced = self.advanced.clone();
        advanced.merge(self.shot_log.advanced.clone());
        for (family, counts) in &advanced.families {
            writeln!(f, "{family}: {counts}")?;
        }
        write!(
            f,
            "advanced skipped: missing_anchor={} rejected={}",
            advanced.missing_anchor, advanced.rejected
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_track_outcomes() {
        let mut counts = UpsertCounts::default();
        counts.record(Some(WriteOutcome::Inserted));
        counts.record(Some(WriteOutcome::Updated));
        counts.record(Some(WriteOutcome::Updated));
        counts.record(None);
        assert_eq!(
            counts,
            UpsertCounts {
                added: 1,
                updated: 2,
                skipped: 1
            }
        );
        assert_eq!(counts.to_string(), "added=1 updated=2 skipped=1");
    }

    #[test]
    fn advanced_counts_split_by_family() {
        let mut counts = AdvancedCounts::default();
        counts.record("hustle", AdvancedOutcome::Written(WriteOutcome::Inserted));
        counts.record("hustle", AdvancedOutcome::Written(WriteOutcome::Updated));
        counts.record("defensive", AdvancedOutcome::MissingAnchor);
        assert_eq!(counts.family("hustle").written(), 2);
        assert_eq!(counts.family("defensive"), UpsertCounts::default());
        assert_eq!(counts.missing_anchor, 1);
    }

    #[test]
    fn summary_serializes_for_run_log() {
        let mut summary = LoadSummary::default();
        summary.teams.added = 30;
        let json = serde_json::to_value(&summary).expect("serialize summary");
        assert_eq!(json["teams"]["added"], 30);
        assert_eq!(summary.totals().added, 30);
    }
}
