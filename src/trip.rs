//! Trips group the entries spent or earned while travelling.
//!
//! Like categories, trips are managed elsewhere and only looked up here.

use rusqlite::{Connection, Row};
use serde::{Deserialize, Serialize};

use crate::{Error, user::UserId};

/// Database identifier for a trip.
pub type TripId = i64;

/// A trip owned by a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trip {
    /// The ID of the trip.
    pub id: TripId,
    /// The user that owns the trip.
    pub user_id: UserId,
    /// The name of the trip, e.g. "Lisbon 2025".
    pub name: String,
}

/// Create a trip and return it with its generated ID.
pub fn create_trip(user_id: UserId, name: &str, connection: &Connection) -> Result<Trip, Error> {
    connection.execute(
        "INSERT INTO trip (user_id, name) VALUES (?1, ?2);",
        (user_id.as_i64(), name),
    )?;

    let id = connection.last_insert_rowid();

    Ok(Trip {
        id,
        user_id,
        name: name.to_owned(),
    })
}

/// Retrieve a single trip by ID.
pub fn get_trip(trip_id: TripId, connection: &Connection) -> Result<Trip, Error> {
    connection
        .prepare("SELECT id, user_id, name FROM trip WHERE id = :id;")?
        .query_row(&[(":id", &trip_id)], map_row)
        .map_err(|error| error.into())
}

/// Check that `trip_id` refers to an existing trip.
///
/// # Errors
/// Returns [Error::InvalidTrip] if the trip does not exist.
pub fn ensure_trip_exists(trip_id: TripId, connection: &Connection) -> Result<(), Error> {
    match get_trip(trip_id, connection) {
        Ok(_) => Ok(()),
        Err(Error::NotFound) => Err(Error::InvalidTrip(trip_id)),
        Err(error) => Err(error),
    }
}

/// Initialize the trip table.
pub fn create_trip_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS trip (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            FOREIGN KEY(user_id) REFERENCES user(id) ON UPDATE CASCADE ON DELETE CASCADE
        )",
        (),
    )?;

    Ok(())
}

fn map_row(row: &Row) -> Result<Trip, rusqlite::Error> {
    let id = row.get(0)?;
    let user_id = UserId::new(row.get(1)?);
    let name = row.get(2)?;

    Ok(Trip { id, user_id, name })
}
