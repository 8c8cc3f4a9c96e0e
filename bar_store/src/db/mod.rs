//! Database utilities: connections and first-run bootstrap.
//!
//! This module provides:
//! - [`connection::StoreConnection`]: one open session against either PostgreSQL or SQLite,
//!   chosen from the URL (`postgres://`, `postgresql://`, a libpq `key=value` string, or a
//!   SQLite path with an optional `sqlite:` prefix).
//! - [`connection::connect_sqlite`]: applies WAL and a 5000ms busy_timeout.
//! - [`bootstrap::create_database`]: creates the PostgreSQL database when it does not exist yet.
//!
//! Example:
//! ```no_run
//! use bar_store::db::connection::StoreConnection;
//!
//! let db_path = std::env::temp_dir().join("bar_store_example.db");
//! let conn = StoreConnection::establish(db_path.to_str().unwrap()).expect("connect");
//! assert_eq!(conn.dialect(), bar_store::db::connection::Dialect::Sqlite);
//! ```
//!
//! Note: Building with PostgreSQL support requires the system libpq (e.g., libpq-dev on Debian/Ubuntu).

pub mod bootstrap;
pub mod connection;
