//! Lazily creates the tables that back one (instrument, interval) pair.
//!
//! Layout, per instrument `NAME` and interval `I`:
//!
//! - `ticker(tick_name PK, tick_type)`: global registry, shared by everyone.
//! - `"NAME"(time_span PK, downloaded_on)`: last download per interval.
//! - `"NAME_I"(tick_time PK, open_val, high_val, low_val, close_val, volume)`: bars.
//! - `"NAME_I_idx"` on `tick_time`.
//!
//! All DDL is `IF NOT EXISTS`, and "already exists" errors raised by a
//! concurrent creator are swallowed, so any number of workers may race here.

use diesel::result::{DatabaseErrorKind, Error as DieselError};
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    db::connection::StoreConnection,
    ident::{Ident, InstrumentTables, REGISTRY_TABLE},
};

#[derive(Debug, Error)]
pub enum StorageError {
    /// Probing a table failed for a reason other than "no such table".
    #[error("unexpected error probing {table}: {source}")]
    Unexpected { table: String, source: DieselError },

    #[error("could not create {object}: {source}")]
    Create { object: String, source: DieselError },
}

/// What [`ensure_storage`] found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaStatus {
    /// Both per-instrument tables were already there.
    Existing,
    /// At least one was missing and the set was (re)created.
    Created,
}

pub fn registry_ddl() -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS \"{REGISTRY_TABLE}\" (tick_name TEXT PRIMARY KEY, tick_type TEXT NOT NULL)"
    )
}

pub fn meta_ddl(meta: &Ident) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (time_span TEXT PRIMARY KEY, downloaded_on TIMESTAMP)",
        meta.quoted()
    )
}

pub fn bars_ddl(bars: &Ident) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (tick_time TIMESTAMP PRIMARY KEY, \
         open_val DOUBLE PRECISION, high_val DOUBLE PRECISION, \
         low_val DOUBLE PRECISION, close_val DOUBLE PRECISION, volume BIGINT)",
        bars.quoted()
    )
}

pub fn index_ddl(tables: &InstrumentTables) -> String {
    format!(
        "CREATE INDEX IF NOT EXISTS {} ON {} (tick_time)",
        tables.index.quoted(),
        tables.bars.quoted()
    )
}

fn message(err: &DieselError) -> Option<&str> {
    match err {
        DieselError::DatabaseError(_, info) => Some(info.message()),
        _ => None,
    }
}

/// Error raised when a table is simply not there.
pub fn is_missing_table(err: &DieselError) -> bool {
    message(err).is_some_and(|m| m.contains("no such table") || m.contains("does not exist"))
}

/// Error raised when another session created the object first.
///
/// PostgreSQL can report a lost `IF NOT EXISTS` race as a unique violation
/// on its catalog instead of "already exists".
pub fn is_already_exists(err: &DieselError) -> bool {
    match err {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => true,
        _ => message(err).is_some_and(|m| m.contains("already exists")),
    }
}

/// Trivial read against `table`; `Ok(false)` when it does not exist.
pub fn probe_table(conn: &mut StoreConnection, table: &Ident) -> Result<bool, StorageError> {
    match conn.execute_plain(&format!("SELECT 1 FROM {} LIMIT 1", table.quoted())) {
        Ok(_) => Ok(true),
        Err(e) if is_missing_table(&e) => Ok(false),
        Err(source) => Err(StorageError::Unexpected {
            table: table.to_string(),
            source,
        }),
    }
}

fn create(conn: &mut StoreConnection, object: &str, ddl: &str) -> Result<(), StorageError> {
    match conn.execute_plain(ddl) {
        Ok(_) => {
            debug!(object, "Created");
            Ok(())
        }
        Err(e) if is_already_exists(&e) => Ok(()),
        Err(source) => Err(StorageError::Create {
            object: object.to_string(),
            source,
        }),
    }
}

/// Makes sure the global registry table exists. Returns `true` if it had to be created.
pub fn ensure_registry(conn: &mut StoreConnection) -> Result<bool, StorageError> {
    if probe_table(conn, &Ident::registry())? {
        return Ok(false);
    }
    create(conn, REGISTRY_TABLE, &registry_ddl())?;
    info!("Created instrument registry");
    Ok(true)
}

/// Ensures the registry plus the metadata table, bar table and index for `tables`.
///
/// A failure partway leaves whatever was already created in place; the next
/// call re-probes and fills in the rest.
pub fn ensure_storage(
    conn: &mut StoreConnection,
    tables: &InstrumentTables,
) -> Result<SchemaStatus, StorageError> {
    ensure_registry(conn)?;

    let meta_present = probe_table(conn, &tables.meta)?;
    let bars_present = probe_table(conn, &tables.bars)?;
    if meta_present && bars_present {
        return Ok(SchemaStatus::Existing);
    }

    create(conn, tables.meta.as_str(), &meta_ddl(&tables.meta))?;
    create(conn, tables.bars.as_str(), &bars_ddl(&tables.bars))?;
    create(conn, tables.index.as_str(), &index_ddl(tables))?;

    info!(
        instrument = %tables.name,
        interval = %tables.interval,
        "Created storage"
    );
    Ok(SchemaStatus::Created)
}
