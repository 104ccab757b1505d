use nba_warehouse::schema::{canonical_tables, table_columns};
use nba_warehouse::{Warehouse, WarehouseError};
use serde_json::{Value, json};

fn raw(value: Value) -> serde_json::Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

#[test]
fn ensure_schema_creates_every_table_once() {
    let mut warehouse = Warehouse::open_in_memory().expect("open warehouse");
    let first = warehouse.ensure_schema().expect("first ensure");
    assert_eq!(first.created.len(), canonical_tables().len());
    assert!(first.existing.is_empty());

    let second = warehouse.ensure_schema().expect("second ensure");
    assert!(second.created.is_empty());
    assert_eq!(second.existing.len(), canonical_tables().len());
    assert!(second.drifted.is_empty());

    let counts = warehouse.table_counts().expect("table counts");
    assert_eq!(counts.len(), canonical_tables().len());
    assert!(counts.iter().all(|(_, count)| *count == 0));
}

#[test]
fn existing_table_is_left_alone_and_drift_reported() {
    let mut warehouse = Warehouse::open_in_memory().expect("open warehouse");
    warehouse
        .connection()
        .expect("connection")
        .execute_batch(
            "CREATE TABLE dim_teams (team_id TEXT PRIMARY KEY, team_name TEXT, inserted_at TIMESTAMP);",
        )
        .expect("create legacy table");

    let report = warehouse.ensure_schema().expect("ensure schema");
    assert!(!report.created.iter().any(|t| t == "dim_teams"));
    let drift = report
        .drifted
        .iter()
        .find(|d| d.table == "dim_teams")
        .expect("dim_teams drift reported");
    assert!(drift.missing_columns.iter().any(|c| c == "team_city"));
    assert!(drift.missing_columns.iter().any(|c| c == "updated_at"));

    let counts = warehouse
        .upsert_teams(&[raw(json!({
            "TEAM_ID": 1610612747,
            "TEAM_NAME": "Lakers",
            "TEAM_CITY": "Los Angeles"
        }))])
        .expect("upsert teams");
    assert_eq!(counts.added, 1);
    assert_eq!(counts.skipped, 0);

    let conn = warehouse.connection().expect("connection");
    let columns = table_columns(conn, "dim_teams").expect("columns");
    assert!(!columns.contains("team_city"));
    let name: String = conn
        .query_row(
            "SELECT team_name FROM dim_teams WHERE team_id = '1610612747'",
            [],
            |row| row.get(0),
        )
        .expect("team row");
    assert_eq!(name, "Lakers");
}

#[test]
fn writes_without_tables_are_skipped_not_fatal() {
    let mut warehouse = Warehouse::open_in_memory().expect("open warehouse");
    let counts = warehouse
        .upsert_teams(&[raw(json!({"TEAM_ID": 1610612747}))])
        .expect("batch still commits");
    assert_eq!(counts.skipped, 1);
    assert_eq!(counts.written(), 0);
}

#[test]
fn closed_warehouse_rejects_work_and_closes_twice() {
    let mut warehouse = Warehouse::open_in_memory().expect("open warehouse");
    warehouse.ensure_schema().expect("ensure schema");
    warehouse.close().expect("first close");
    warehouse.close().expect("second close is a no-op");
    assert!(warehouse.is_closed());

    let err = warehouse
        .upsert_teams(&[raw(json!({"TEAM_ID": 1}))])
        .expect_err("closed warehouse");
    assert!(matches!(
        err.downcast_ref::<WarehouseError>(),
        Some(WarehouseError::Closed)
    ));
    assert!(warehouse.ensure_schema().is_err());
}
