//! Ingestion writer: registry, metadata, bars, recluster.
//!
//! Each statement commits on its own. Only a registry failure aborts the
//! call; metadata, per-row and recluster failures are logged and counted in
//! the [`IngestReport`] so a partial batch still lands.

use chrono::{DateTime, Utc};
use diesel::{
    RunQueryDsl,
    result::{DatabaseErrorKind, Error as DieselError},
    sql_query,
    sql_types::{BigInt, Double, Text, Timestamp},
};
use market_data_ingestor::models::{bar::Bar, instrument::Instrument};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
    db::connection::{Dialect, StoreConnection, with_connection},
    ident::InstrumentTables,
    models::NewTicker,
    schema::ticker,
};

/// What to do with a bar whose timestamp is already stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Replace the stored values with the freshly fetched ones.
    #[default]
    Overwrite,
    /// Keep the stored row and count the collision.
    Skip,
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("could not register {name}: {source}")]
    Registry { name: String, source: DieselError },
}

/// Outcome of one [`IngestWriter::ingest`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Bars written as new rows.
    pub inserted: usize,
    /// Colliding bars that replaced the stored row.
    pub overwritten: usize,
    /// Colliding bars left untouched under [`ConflictPolicy::Skip`].
    pub conflicts: usize,
    /// Bars that failed for any other reason.
    pub failed: usize,
    pub metadata_recorded: bool,
    pub reclustered: bool,
}

impl IngestReport {
    /// Bars whose timestamp was already stored.
    pub fn collisions(&self) -> usize {
        self.overwritten + self.conflicts
    }

    /// Bars whose values now sit in the table.
    pub fn written(&self) -> usize {
        self.inserted + self.overwritten
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IngestWriter {
    policy: ConflictPolicy,
}

enum RowOutcome {
    Inserted,
    Overwritten,
    Conflict,
}

impl IngestWriter {
    pub fn new(policy: ConflictPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> ConflictPolicy {
        self.policy
    }

    /// Persists `bars` for `instrument` into `tables`, stamping the metadata
    /// row with `downloaded_on`. Storage must already exist.
    pub fn ingest(
        &self,
        conn: &mut StoreConnection,
        instrument: &Instrument,
        tables: &InstrumentTables,
        bars: &[Bar],
        downloaded_on: DateTime<Utc>,
    ) -> Result<IngestReport, IngestError> {
        register(conn, instrument, tables)?;

        let mut report = IngestReport {
            metadata_recorded: true,
            ..Default::default()
        };

        if let Err(e) = record_download(conn, tables, downloaded_on) {
            error!(table = %tables.meta, error = %e, "Could not record download time");
            report.metadata_recorded = false;
        }

        for bar in bars {
            match self.write_bar(conn, tables, bar) {
                Ok(RowOutcome::Inserted) => report.inserted += 1,
                Ok(RowOutcome::Overwritten) => report.overwritten += 1,
                Ok(RowOutcome::Conflict) => {
                    debug!(table = %tables.bars, tick_time = %bar.timestamp, "Bar already stored, skipped");
                    report.conflicts += 1;
                }
                Err(e) => {
                    error!(table = %tables.bars, tick_time = %bar.timestamp, error = %e, "Could not write bar");
                    report.failed += 1;
                }
            }
        }

        match recluster(conn, tables) {
            Ok(()) => report.reclustered = true,
            Err(e) => warn!(table = %tables.bars, error = %e, "Recluster failed"),
        }

        if report.collisions() > 0 {
            warn!(
                table = %tables.bars,
                collisions = report.collisions(),
                policy = ?self.policy,
                "Some bars were already stored"
            );
        }
        info!(
            table = %tables.bars,
            inserted = report.inserted,
            overwritten = report.overwritten,
            conflicts = report.conflicts,
            failed = report.failed,
            "Ingested"
        );
        Ok(report)
    }

    fn write_bar(
        &self,
        conn: &mut StoreConnection,
        tables: &InstrumentTables,
        bar: &Bar,
    ) -> Result<RowOutcome, DieselError> {
        match insert_bar(conn, tables, bar) {
            Ok(_) => Ok(RowOutcome::Inserted),
            Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
                match self.policy {
                    ConflictPolicy::Overwrite => {
                        update_bar(conn, tables, bar)?;
                        Ok(RowOutcome::Overwritten)
                    }
                    ConflictPolicy::Skip => Ok(RowOutcome::Conflict),
                }
            }
            Err(e) => Err(e),
        }
    }
}

fn register(
    conn: &mut StoreConnection,
    instrument: &Instrument,
    tables: &InstrumentTables,
) -> Result<(), IngestError> {
    let row = NewTicker::new(&tables.name, instrument.kind());
    let added = with_connection!(conn, c => diesel::insert_into(ticker::table)
        .values(&row)
        .on_conflict(ticker::tick_name)
        .do_nothing()
        .execute(c))
    .map_err(|source| IngestError::Registry {
        name: tables.name.clone(),
        source,
    })?;

    if added > 0 {
        info!(instrument = %tables.name, kind = %instrument.kind(), "Registered instrument");
    }
    Ok(())
}

fn record_download(
    conn: &mut StoreConnection,
    tables: &InstrumentTables,
    downloaded_on: DateTime<Utc>,
) -> diesel::QueryResult<usize> {
    let sql = format!(
        "INSERT INTO {} (time_span, downloaded_on) VALUES ({}) \
         ON CONFLICT (time_span) DO UPDATE SET downloaded_on = excluded.downloaded_on",
        tables.meta.quoted(),
        conn.dialect().placeholders(2)
    );
    let code = tables.interval.code();
    let stamp = downloaded_on.naive_utc();
    with_connection!(conn, c => sql_query(&sql)
        .bind::<Text, _>(code)
        .bind::<Timestamp, _>(stamp)
        .execute(c))
}

fn insert_bar(
    conn: &mut StoreConnection,
    tables: &InstrumentTables,
    bar: &Bar,
) -> diesel::QueryResult<usize> {
    let sql = format!(
        "INSERT INTO {} (tick_time, open_val, high_val, low_val, close_val, volume) VALUES ({})",
        tables.bars.quoted(),
        conn.dialect().placeholders(6)
    );
    let tick_time = bar.timestamp.naive_utc();
    with_connection!(conn, c => sql_query(&sql)
        .bind::<Timestamp, _>(tick_time)
        .bind::<Double, _>(bar.open)
        .bind::<Double, _>(bar.high)
        .bind::<Double, _>(bar.low)
        .bind::<Double, _>(bar.close)
        .bind::<BigInt, _>(bar.volume)
        .execute(c))
}

fn update_bar(
    conn: &mut StoreConnection,
    tables: &InstrumentTables,
    bar: &Bar,
) -> diesel::QueryResult<usize> {
    let d = conn.dialect();
    let sql = format!(
        "UPDATE {} SET open_val = {}, high_val = {}, low_val = {}, close_val = {}, volume = {} \
         WHERE tick_time = {}",
        tables.bars.quoted(),
        d.placeholder(1),
        d.placeholder(2),
        d.placeholder(3),
        d.placeholder(4),
        d.placeholder(5),
        d.placeholder(6)
    );
    let tick_time = bar.timestamp.naive_utc();
    with_connection!(conn, c => sql_query(&sql)
        .bind::<Double, _>(bar.open)
        .bind::<Double, _>(bar.high)
        .bind::<Double, _>(bar.low)
        .bind::<Double, _>(bar.close)
        .bind::<BigInt, _>(bar.volume)
        .bind::<Timestamp, _>(tick_time)
        .execute(c))
}

/// Physically reorders the bar table by time (PostgreSQL) or rebuilds the
/// time index (SQLite, which has no clustering).
fn recluster(conn: &mut StoreConnection, tables: &InstrumentTables) -> diesel::QueryResult<()> {
    let sql = match conn.dialect() {
        Dialect::Postgres => format!(
            "CLUSTER {} USING {}",
            tables.bars.quoted(),
            tables.index.quoted()
        ),
        Dialect::Sqlite => format!("REINDEX {}", tables.index.quoted()),
    };
    conn.execute_plain(&sql).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overwrite_is_the_default_policy() {
        assert_eq!(IngestWriter::default().policy(), ConflictPolicy::Overwrite);
    }

    #[test]
    fn policy_reads_snake_case() {
        #[derive(Deserialize)]
        struct Wrapper {
            on_conflict: ConflictPolicy,
        }
        let w: Wrapper = toml::from_str("on_conflict = \"skip\"").unwrap();
        assert_eq!(w.on_conflict, ConflictPolicy::Skip);
    }

    #[test]
    fn report_totals() {
        let report = IngestReport {
            inserted: 3,
            overwritten: 2,
            conflicts: 1,
            ..Default::default()
        };
        assert_eq!(report.collisions(), 3);
        assert_eq!(report.written(), 5);
    }
}
