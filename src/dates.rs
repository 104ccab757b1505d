use std::collections::HashSet;

use anyhow::Result;
use chrono::{Datelike, NaiveDate, Weekday};
use rusqlite::Connection;
use tracing::debug;

use crate::keys::{date_key_for, parse_calendar_date};
use crate::schema::{DIM_DATES, LiveSchema};
use crate::upsert::{ColumnSet, RowWrite, Stamp, insert_row, row_exists};

/// Calendar attributes stored in `dim_dates`. Day of week counts from
/// Monday = 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateRow {
    pub date_id: String,
    pub full_date: String,
    pub day_of_week: i64,
    pub day_name: String,
    pub day_of_month: i64,
    pub day_of_year: i64,
    pub week_of_year: i64,
    pub month_num: i64,
    pub month_name: String,
    pub quarter: i64,
    pub year: i64,
    pub is_weekend: bool,
}

impl DateRow {
    pub fn from_date(date: NaiveDate) -> Self {
        let month = date.month() as i64;
        Self {
            date_id: date_key_for(date),
            full_date: date.format("%Y-%m-%d").to_string(),
            day_of_week: date.weekday().num_days_from_monday() as i64,
            day_name: date.format("%A").to_string(),
            day_of_month: date.day() as i64,
            day_of_year: date.ordinal() as i64,
            week_of_year: date.iso_week().week() as i64,
            month_num: month,
            month_name: date.format("%B").to_string(),
            quarter: (month - 1) / 3 + 1,
            year: date.year() as i64,
            is_weekend: matches!(date.weekday(), Weekday::Sat | Weekday::Sun),
        }
    }

    fn columns(&self) -> ColumnSet {
        let mut cols = ColumnSet::default();
        cols.set("full_date", &self.full_date);
        cols.set("day_of_week", &self.day_of_week);
        cols.set("day_name", &self.day_name);
        cols.set("day_of_month", &self.day_of_month);
        cols.set("day_of_year", &self.day_of_year);
        cols.set("week_of_year", &self.week_of_year);
        cols.set("month_num", &self.month_num);
        cols.set("month_name", &self.month_name);
        cols.set("quarter", &self.quarter);
        cols.set("year", &self.year);
        cols.set("is_weekend", &self.is_weekend);
        cols
    }
}

/// Write-once date dimension with a per-process memo of keys known to exist.
///
/// Keys inserted inside an uncommitted record are held as pending so a
/// rolled-back record does not leave the memo claiming a row that is gone.
#[derive(Debug, Default)]
pub struct DateDimension {
    seen: HashSet<String>,
    pending: Vec<String>,
    inserts: usize,
}

impl DateDimension {
    /// Returns the date key for `raw`, inserting the dimension row on first
    /// sight. Missing or malformed dates yield `Ok(None)`.
    pub fn ensure(
        &mut self,
        conn: &Connection,
        schema: &mut LiveSchema,
        raw: Option<&str>,
        now: &str,
    ) -> Result<Option<String>> {
        let Some(date) = raw.and_then(parse_calendar_date) else {
            return Ok(None);
        };
        let row = DateRow::from_date(date);
        if self.seen.contains(&row.date_id) {
            return Ok(Some(row.date_id));
        }
        if !row_exists(conn, DIM_DATES, "date_id", &row.date_id)? {
            insert_row(
                conn,
                schema,
                RowWrite {
                    table: DIM_DATES,
                    key_column: "date_id",
                    key: &row.date_id,
                    columns: row.columns(),
                    stamp: Stamp::Fact,
                },
                now,
            )?;
            self.inserts += 1;
            self.pending.push(row.date_id.clone());
            debug!(date_id = %row.date_id, "inserted date dimension row");
        }
        self.seen.insert(row.date_id.clone());
        Ok(Some(row.date_id))
    }

    /// Resolves keys inserted since the last call: kept when the enclosing
    /// write committed, forgotten when it rolled back.
    pub fn settle(&mut self, committed: bool) {
        if !committed {
            for key in &self.pending {
                self.seen.remove(key);
            }
        }
        self.pending.clear();
    }

    pub fn reset(&mut self) {
        self.seen.clear();
        self.pending.clear();
    }

    /// Number of `dim_dates` rows this resolver has inserted.
    pub fn inserts(&self) -> usize {
        self.inserts
    }
}
