#![allow(dead_code)]

use bar_store::db::connection::StoreConnection;
use chrono::{NaiveDateTime, TimeZone, Utc};
use diesel::prelude::*;
use diesel::sql_query;
use diesel::sql_types::{BigInt, Double, Integer, Text, Timestamp};
use market_data_ingestor::models::bar::Bar;
use std::path::PathBuf;
use tempfile::TempDir;

#[derive(QueryableByName)]
struct JournalMode {
    #[diesel(sql_type = Text)]
    journal_mode: String,
}
#[derive(QueryableByName)]
struct BusyTimeout {
    #[diesel(sql_type = Integer, column_name = "timeout")]
    busy_timeout: i32,
}
#[derive(QueryableByName)]
struct Count {
    #[diesel(sql_type = BigInt)]
    n: i64,
}
#[derive(QueryableByName)]
struct Name {
    #[diesel(sql_type = Text)]
    name: String,
}

#[derive(Debug, QueryableByName)]
pub struct MetaRow {
    #[diesel(sql_type = Text)]
    pub time_span: String,
    #[diesel(sql_type = Timestamp)]
    pub downloaded_on: NaiveDateTime,
}

#[derive(Debug, PartialEq, QueryableByName)]
pub struct BarRow {
    #[diesel(sql_type = Timestamp)]
    pub tick_time: NaiveDateTime,
    #[diesel(sql_type = Double)]
    pub open_val: f64,
    #[diesel(sql_type = Double)]
    pub high_val: f64,
    #[diesel(sql_type = Double)]
    pub low_val: f64,
    #[diesel(sql_type = Double)]
    pub close_val: f64,
    #[diesel(sql_type = BigInt)]
    pub volume: i64,
}

#[derive(Debug, PartialEq, QueryableByName)]
pub struct TickerRow {
    #[diesel(sql_type = Text)]
    pub tick_name: String,
    #[diesel(sql_type = Text)]
    pub tick_type: String,
}

pub struct TestDb {
    _dir: TempDir,    // keep alive for the life of the test
    pub path: String, // <tmpdir>/test.db
}

pub fn setup_db() -> (TestDb, StoreConnection) {
    let dir = TempDir::new().expect("tempdir");
    let mut p = PathBuf::from(dir.path());
    p.push("test.db");
    let path = p.to_string_lossy().to_string();

    let conn = StoreConnection::establish(&path).expect("connect");
    (TestDb { _dir: dir, path }, conn)
}

pub fn sqlite(conn: &mut StoreConnection) -> &mut SqliteConnection {
    match conn {
        StoreConnection::Sqlite(c) => c,
        StoreConnection::Postgres(_) => panic!("tests run against SQLite"),
    }
}

pub fn assert_sqlite_pragmas(conn: &mut StoreConnection) {
    let conn = sqlite(conn);

    let jm: JournalMode = sql_query("PRAGMA journal_mode;").get_result(conn).unwrap();
    assert_eq!(jm.journal_mode.to_lowercase(), "wal"); // WAL is persistent per DB file

    let bt: BusyTimeout = sql_query("PRAGMA busy_timeout;").get_result(conn).unwrap();
    assert_eq!(bt.busy_timeout, 5000);
}

/// Tables and indexes the store created, sorted by name.
pub fn schema_objects(conn: &mut StoreConnection) -> Vec<String> {
    sql_query(
        "SELECT name FROM sqlite_master WHERE type IN ('table', 'index') \
         AND name NOT LIKE 'sqlite%' ORDER BY name",
    )
    .load::<Name>(sqlite(conn))
    .unwrap()
    .into_iter()
    .map(|n| n.name)
    .collect()
}

pub fn count_rows(conn: &mut StoreConnection, table: &str) -> i64 {
    sql_query(format!("SELECT COUNT(*) AS n FROM \"{table}\""))
        .get_result::<Count>(sqlite(conn))
        .unwrap()
        .n
}

pub fn registry(conn: &mut StoreConnection) -> Vec<TickerRow> {
    sql_query("SELECT tick_name, tick_type FROM ticker ORDER BY tick_name")
        .load(sqlite(conn))
        .unwrap()
}

pub fn meta_rows(conn: &mut StoreConnection, table: &str) -> Vec<MetaRow> {
    sql_query(format!(
        "SELECT time_span, downloaded_on FROM \"{table}\" ORDER BY time_span"
    ))
    .load(sqlite(conn))
    .unwrap()
}

pub fn bar_rows(conn: &mut StoreConnection, table: &str) -> Vec<BarRow> {
    sql_query(format!(
        "SELECT tick_time, open_val, high_val, low_val, close_val, volume FROM \"{table}\" \
         ORDER BY tick_time"
    ))
    .load(sqlite(conn))
    .unwrap()
}

/// Daily bar at midnight UTC on 2024-01-`day`.
pub fn daily_bar(day: u32, close: f64) -> Bar {
    Bar {
        timestamp: Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap(),
        open: close - 1.0,
        high: close + 1.0,
        low: close - 2.0,
        close,
        volume: 1_000 * i64::from(day),
    }
}

impl BarRow {
    pub fn matches(&self, bar: &Bar) -> bool {
        self.tick_time == bar.timestamp.naive_utc()
            && self.open_val == bar.open
            && self.high_val == bar.high
            && self.low_val == bar.low
            && self.close_val == bar.close
            && self.volume == bar.volume
    }
}
