//! First-run setup for PostgreSQL: create the database when it is missing.

use diesel::{Connection, ConnectionError, PgConnection, RunQueryDsl, sql_query};
use secrecy::{ExposeSecret, SecretString};
use tracing::{info, warn};

use crate::{
    db::connection::{ConnectError, StoreConnection},
    ident::{Ident, IdentError},
    schema_manager::{StorageError, ensure_registry, is_already_exists},
};

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error("invalid database name: {0}")]
    Name(#[from] IdentError),

    #[error(transparent)]
    Registry(#[from] StorageError),

    #[error("could not create database {dbname}: {source}")]
    Create {
        dbname: String,
        source: diesel::result::Error,
    },
}

/// Where to go when the target database does not exist yet.
#[derive(Debug, Clone)]
pub struct Bootstrap {
    /// Connection string for the `postgres` maintenance database.
    pub maintenance_url: SecretString,
    /// Name of the database to create.
    pub dbname: String,
}

/// `true` when a connection failed only because the database is missing.
pub fn is_missing_database(err: &ConnectError) -> bool {
    matches!(err, ConnectError::Connection(ConnectionError::BadConnection(msg))
        if msg.contains("does not exist"))
}

/// Creates `dbname` through the maintenance database. An existing database is not an error.
pub fn create_database(bootstrap: &Bootstrap) -> Result<(), BootstrapError> {
    let name = Ident::new(&bootstrap.dbname)?;
    let mut conn =
        PgConnection::establish(bootstrap.maintenance_url.expose_secret()).map_err(ConnectError::from)?;

    match sql_query(format!("CREATE DATABASE {}", name.quoted())).execute(&mut conn) {
        Ok(_) => {
            info!(dbname = %bootstrap.dbname, "Created database");
            Ok(())
        }
        Err(e) if is_already_exists(&e) => Ok(()),
        Err(source) => Err(BootstrapError::Create {
            dbname: bootstrap.dbname.clone(),
            source,
        }),
    }
}

/// Connects to `database_url`, creating the database first if it is missing
/// and a bootstrap target is known.
pub fn connect_or_create(
    database_url: &str,
    bootstrap: Option<&Bootstrap>,
) -> Result<StoreConnection, BootstrapError> {
    match (StoreConnection::establish(database_url), bootstrap) {
        (Ok(conn), _) => Ok(conn),
        (Err(e), Some(bootstrap)) if is_missing_database(&e) => {
            warn!(dbname = %bootstrap.dbname, "Database doesn't exist, attempting to create it");
            create_database(bootstrap)?;
            Ok(StoreConnection::establish(database_url)?)
        }
        (Err(e), _) => Err(e.into()),
    }
}

/// [`connect_or_create`] plus the instrument registry, for an explicit
/// first-time setup. Ingestion does not need this: the registry is created
/// with the first stored bars.
pub fn init_database(
    database_url: &str,
    bootstrap: Option<&Bootstrap>,
) -> Result<StoreConnection, BootstrapError> {
    let mut conn = connect_or_create(database_url, bootstrap)?;
    ensure_registry(&mut conn)?;
    Ok(conn)
}
