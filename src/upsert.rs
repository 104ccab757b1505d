use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, params_from_iter};

use crate::dates::DateDimension;
use crate::schema::LiveSchema;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn now_stamp() -> String {
    Utc::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Conversion into a bindable SQLite cell. Non-finite reals become NULL.
pub trait ToCell {
    fn to_cell(&self) -> Value;
}

impl ToCell for i64 {
    fn to_cell(&self) -> Value {
        Value::Integer(*self)
    }
}

impl ToCell for f64 {
    fn to_cell(&self) -> Value {
        if self.is_finite() {
            Value::Real(*self)
        } else {
            Value::Null
        }
    }
}

impl ToCell for bool {
    fn to_cell(&self) -> Value {
        Value::Integer(if *self { 1 } else { 0 })
    }
}

impl ToCell for str {
    fn to_cell(&self) -> Value {
        Value::Text(self.to_string())
    }
}

impl ToCell for String {
    fn to_cell(&self) -> Value {
        Value::Text(self.clone())
    }
}

impl<T: ToCell> ToCell for Option<T> {
    fn to_cell(&self) -> Value {
        match self {
            Some(v) => v.to_cell(),
            None => Value::Null,
        }
    }
}

impl<T: ToCell + ?Sized> ToCell for &T {
    fn to_cell(&self) -> Value {
        (**self).to_cell()
    }
}

/// Ordered column/value pairs for one row write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnSet {
    entries: Vec<(&'static str, Value)>,
}

impl ColumnSet {
    /// Sets a column unconditionally; `None` is written as NULL.
    pub fn set<T: ToCell + ?Sized>(&mut self, name: &'static str, value: &T) {
        let cell = value.to_cell();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = cell,
            None => self.entries.push((name, cell)),
        }
    }

    /// Sets a column only when a value is present.
    pub fn set_present<T: ToCell>(&mut self, name: &'static str, value: Option<T>) {
        if let Some(v) = value {
            self.set(name, &v);
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.iter().find(|(n, _)| *n == name).map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| *n == name)
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.entries.retain(|(n, _)| keep(*n));
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|(n, _)| *n)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn into_parts(self) -> (Vec<&'static str>, Vec<Value>) {
        self.entries.into_iter().unzip()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stamp {
    /// `inserted_at` once, `updated_at` on every write.
    Dimension,
    /// `inserted_at` once; no `updated_at` column.
    Fact,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Inserted,
    Updated,
}

#[derive(Debug, Clone)]
pub struct RowWrite<'a> {
    pub table: &'static str,
    pub key_column: &'static str,
    pub key: &'a str,
    pub columns: ColumnSet,
    pub stamp: Stamp,
}

/// Per-batch state threaded through every record write.
pub struct WriteContext<'a> {
    pub schema: &'a mut LiveSchema,
    pub dates: &'a mut DateDimension,
    pub now: &'a str,
}

pub fn row_exists(conn: &Connection, table: &str, key_column: &str, key: &str) -> Result<bool> {
    let sql = format!("SELECT 1 FROM {table} WHERE {key_column} = ?1 LIMIT 1");
    let found = conn
        .prepare_cached(&sql)
        .with_context(|| format!("prepare existence check on {table}"))?
        .query_row([key], |_| Ok(()))
        .optional()
        .with_context(|| format!("existence check on {table}"))?;
    Ok(found.is_some())
}

/// Insert-or-update keyed by the row's natural key. Only the supplied
/// columns are written on update; `inserted_at` is never touched after the
/// first insert.
pub fn write_row(
    conn: &Connection,
    schema: &mut LiveSchema,
    row: RowWrite<'_>,
    now: &str,
) -> Result<WriteOutcome> {
    if row_exists(conn, row.table, row.key_column, row.key)? {
        update_row(conn, schema, row, now)?;
        Ok(WriteOutcome::Updated)
    } else {
        insert_row(conn, schema, row, now)?;
        Ok(WriteOutcome::Inserted)
    }
}

pub fn insert_row(
    conn: &Connection,
    schema: &mut LiveSchema,
    row: RowWrite<'_>,
    now: &str,
) -> Result<()> {
    let RowWrite {
        table,
        key_column,
        key,
        mut columns,
        stamp,
    } = row;
    columns.set("inserted_at", now);
    if stamp == Stamp::Dimension {
        columns.set("updated_at", now);
    }
    schema.retain_known(conn, table, &mut columns)?;

    let (names, mut values) = columns.into_parts();
    let placeholders = (1..=names.len() + 1)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ");
    let mut column_list = vec![key_column];
    column_list.extend(names);
    let sql = format!(
        "INSERT INTO {table} ({}) VALUES ({placeholders})",
        column_list.join(", ")
    );
    values.insert(0, Value::Text(key.to_string()));
    conn.prepare_cached(&sql)
        .with_context(|| format!("prepare insert into {table}"))?
        .execute(params_from_iter(values.iter()))
        .with_context(|| format!("insert into {table} ({key})"))?;
    Ok(())
}

fn update_row(
    conn: &Connection,
    schema: &mut LiveSchema,
    row: RowWrite<'_>,
    now: &str,
) -> Result<()> {
    let RowWrite {
        table,
        key_column,
        key,
        mut columns,
        stamp,
    } = row;
    if stamp == Stamp::Dimension {
        columns.set("updated_at", now);
    }
    schema.retain_known(conn, table, &mut columns)?;
    if columns.is_empty() {
        return Ok(());
    }

    let (names, mut values) = columns.into_parts();
    let assignments = names
        .iter()
        .enumerate()
        .map(|(i, name)| format!("{name} = ?{}", i + 1))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "UPDATE {table} SET {assignments} WHERE {key_column} = ?{}",
        names.len() + 1
    );
    values.push(Value::Text(key.to_string()));
    conn.prepare_cached(&sql)
        .with_context(|| format!("prepare update of {table}"))?
        .execute(params_from_iter(values.iter()))
        .with_context(|| format!("update {table} ({key})"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_set_overwrites_and_skips_absent() {
        let mut cols = ColumnSet::default();
        cols.set("points", &30_i64);
        cols.set("points", &31_i64);
        cols.set_present::<i64>("assists", None);
        cols.set_present("rebounds", Some(8_i64));
        assert_eq!(cols.len(), 2);
        assert_eq!(cols.get("points"), Some(&Value::Integer(31)));
        assert!(!cols.contains("assists"));
    }

    #[test]
    fn non_finite_reals_bind_as_null() {
        assert_eq!(f64::NAN.to_cell(), Value::Null);
        assert_eq!(f64::INFINITY.to_cell(), Value::Null);
        assert_eq!(0.5_f64.to_cell(), Value::Real(0.5));
        assert_eq!(Option::<&str>::None.to_cell(), Value::Null);
        assert_eq!(true.to_cell(), Value::Integer(1));
    }

    #[test]
    fn timestamps_use_sql_layout() {
        let stamp = now_stamp();
        assert_eq!(stamp.len(), 19);
        assert_eq!(&stamp[10..11], " ");
    }
}
