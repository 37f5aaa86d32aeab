//! Creates the application's tables and opens connections to the application database.

use std::{path::Path, time::Duration};

use rusqlite::Connection;

use crate::{
    Error, category::create_category_table, ledger::create_entry_table,
    recurring::create_template_table, trip::create_trip_table, user::create_user_table,
};

/// How long a connection waits for another process to release its write lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open the SQLite database at `path`.
///
/// The connection waits for up to five seconds when another process, e.g. an admin batch
/// run, holds the write lock, instead of failing straight away.
///
/// # Errors
/// Returns an [Error::SqlError] if the database cannot be opened.
pub fn open_connection(path: impl AsRef<Path>) -> Result<Connection, Error> {
    let connection = Connection::open(path)?;
    connection.busy_timeout(BUSY_TIMEOUT)?;

    Ok(connection)
}

/// Create all of the application's tables and indexes if they do not already exist.
///
/// Foreign key enforcement is switched on for `connection`.
///
/// # Errors
/// Returns an [Error::SqlError] if there is an SQL error.
pub fn initialize(connection: &Connection) -> Result<(), Error> {
    connection.pragma_update(None, "foreign_keys", true)?;

    let transaction = connection.unchecked_transaction()?;

    create_user_table(&transaction)?;
    create_category_table(&transaction)?;
    create_trip_table(&transaction)?;
    create_template_table(&transaction)?;
    create_entry_table(&transaction)?;

    transaction.commit()?;

    Ok(())
}
