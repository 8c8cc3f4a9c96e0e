//! Backend-neutral database session.
//!
//! Bar tables are named at runtime, so most statements are raw SQL built by
//! the caller. [`StoreConnection`] carries the concrete diesel connection and
//! the [`Dialect`] needed to spell placeholders and maintenance commands;
//! [`with_connection!`] runs the same diesel expression against whichever
//! backend is open.

use diesel::{
    Connection, ConnectionError, PgConnection, RunQueryDsl, SqliteConnection, sql_query,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("could not connect: {0}")]
    Connection(#[from] ConnectionError),

    #[error("could not configure connection: {0}")]
    Setup(#[from] diesel::result::Error),
}

/// SQL flavour of the open connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    Sqlite,
}

impl Dialect {
    /// Picks the backend from a database URL or libpq connection string.
    pub fn from_url(url: &str) -> Self {
        let url = url.trim();
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            return Dialect::Postgres;
        }
        let is_conninfo = url
            .split_whitespace()
            .any(|kv| kv.starts_with("host=") || kv.starts_with("dbname="));
        if is_conninfo {
            Dialect::Postgres
        } else {
            Dialect::Sqlite
        }
    }

    /// Bind placeholder for the 1-based parameter `n`.
    pub fn placeholder(self, n: usize) -> String {
        match self {
            Dialect::Postgres => format!("${n}"),
            Dialect::Sqlite => "?".to_string(),
        }
    }

    /// Comma-separated placeholders for parameters `1..=count`.
    pub fn placeholders(self, count: usize) -> String {
        (1..=count)
            .map(|n| self.placeholder(n))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// One open database session.
pub enum StoreConnection {
    Postgres(PgConnection),
    Sqlite(SqliteConnection),
}

/// Evaluates `$body` with `$c` bound to the concrete diesel connection.
macro_rules! with_connection {
    ($conn:expr, $c:ident => $body:expr) => {
        match $conn {
            $crate::db::connection::StoreConnection::Postgres($c) => $body,
            $crate::db::connection::StoreConnection::Sqlite($c) => $body,
        }
    };
}
pub(crate) use with_connection;

impl StoreConnection {
    /// Opens a session, dispatching on the URL the way [`Dialect::from_url`] does.
    pub fn establish(database_url: &str) -> Result<Self, ConnectError> {
        match Dialect::from_url(database_url) {
            Dialect::Postgres => Ok(StoreConnection::Postgres(PgConnection::establish(
                database_url,
            )?)),
            Dialect::Sqlite => Ok(StoreConnection::Sqlite(connect_sqlite(database_url)?)),
        }
    }

    pub fn dialect(&self) -> Dialect {
        match self {
            StoreConnection::Postgres(_) => Dialect::Postgres,
            StoreConnection::Sqlite(_) => Dialect::Sqlite,
        }
    }

    /// Runs one parameterless statement (DDL, maintenance).
    pub fn execute_plain(&mut self, sql: &str) -> diesel::QueryResult<usize> {
        with_connection!(self, c => sql_query(sql).execute(c))
    }
}

impl From<PgConnection> for StoreConnection {
    fn from(conn: PgConnection) -> Self {
        StoreConnection::Postgres(conn)
    }
}

impl From<SqliteConnection> for StoreConnection {
    fn from(conn: SqliteConnection) -> Self {
        StoreConnection::Sqlite(conn)
    }
}

/// Strips the optional `sqlite:` / `sqlite://` scheme diesel does not understand.
pub fn sqlite_path(database_url: &str) -> &str {
    let url = database_url.trim();
    url.strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url)
}

/// Open a SQLite connection and apply connection-wide PRAGMAs.
///
/// WAL lets the verification reads in tests and concurrent ingestion workers
/// share the file; the busy timeout makes writers queue instead of failing.
pub fn connect_sqlite(database_url: &str) -> Result<SqliteConnection, ConnectError> {
    let mut conn = SqliteConnection::establish(sqlite_path(database_url))?;

    sql_query("PRAGMA journal_mode=WAL;").execute(&mut conn)?;
    sql_query("PRAGMA busy_timeout=5000;").execute(&mut conn)?;
    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dialect_follows_the_url() {
        assert_eq!(Dialect::from_url("postgres://u@h/db"), Dialect::Postgres);
        assert_eq!(Dialect::from_url("postgresql://h/db"), Dialect::Postgres);
        assert_eq!(
            Dialect::from_url("host='localhost' port='5432' dbname='market_saver_db'"),
            Dialect::Postgres
        );
        assert_eq!(Dialect::from_url("sqlite:/tmp/x.db"), Dialect::Sqlite);
        assert_eq!(Dialect::from_url("/tmp/x.db"), Dialect::Sqlite);
        assert_eq!(Dialect::from_url(":memory:"), Dialect::Sqlite);
    }

    #[test]
    fn placeholders_per_dialect() {
        assert_eq!(Dialect::Postgres.placeholders(3), "$1, $2, $3");
        assert_eq!(Dialect::Sqlite.placeholders(3), "?, ?, ?");
        assert_eq!(Dialect::Postgres.placeholder(6), "$6");
    }

    #[test]
    fn sqlite_scheme_is_stripped() {
        assert_eq!(sqlite_path("sqlite:///tmp/a.db"), "/tmp/a.db");
        assert_eq!(sqlite_path("sqlite:data/a.db"), "data/a.db");
        assert_eq!(sqlite_path("data/a.db"), "data/a.db");
    }

    #[test]
    fn in_memory_sqlite_opens() {
        let conn = StoreConnection::establish(":memory:").unwrap();
        assert_eq!(conn.dialect(), Dialect::Sqlite);
    }
}
