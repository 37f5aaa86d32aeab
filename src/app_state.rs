//! Implements a struct that holds the state of the REST server.

use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::{Error, clock::Clock, db::initialize, recurring::TemplateLocks};

/// The state of the REST server.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The database connection
    pub db_connection: Arc<Mutex<Connection>>,

    /// The per-template locks shared by every materialization trigger.
    pub template_locks: TemplateLocks,

    /// The source of today's date for deciding which recurring transactions are due.
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    /// Create a new [AppState] with a SQLite database connection.
    ///
    /// This function will initialize the database by adding the tables for the domain models.
    ///
    /// # Errors
    /// Returns an error if the database cannot be initialized.
    pub fn new(db_connection: Connection, clock: impl Clock + 'static) -> Result<Self, Error> {
        initialize(&db_connection)?;

        let connection = Arc::new(Mutex::new(db_connection));

        Ok(Self {
            db_connection: connection,
            template_locks: TemplateLocks::new(),
            clock: Arc::new(clock),
        })
    }
}
