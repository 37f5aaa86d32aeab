//! Defines the ledger entry model and the append-only ledger queries.

use std::{fmt::Display, str::FromStr};

use rusqlite::{
    Connection, Row,
    types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef},
};
use serde::{Deserialize, Serialize};
use time::Date;

use crate::{
    Error,
    category::{CategoryId, ensure_category_exists},
    database_id::{EntryId, TemplateId},
    trip::{TripId, ensure_trip_exists},
    user::UserId,
};

// ============================================================================
// MODELS
// ============================================================================

/// Whether money was earned or spent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// Money earned, e.g. wages.
    Income,
    /// Money spent, e.g. rent.
    Expense,
}

impl EntryKind {
    /// The name used for the kind in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Income => "income",
            EntryKind::Expense => "expense",
        }
    }
}

impl Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "income" => Ok(EntryKind::Income),
            "expense" => Ok(EntryKind::Expense),
            _ => Err(Error::InvalidEntryKind(s.to_owned())),
        }
    }
}

impl ToSql for EntryKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for EntryKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|error: Error| FromSqlError::Other(Box::new(error)))
    }
}

/// An income or expense recorded in a user's ledger.
///
/// Entries are immutable once created. Entries materialized from a recurrence template
/// keep the template's ID so they can be traced back to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// The ID of the entry.
    pub id: EntryId,
    /// The user that owns the entry.
    pub user_id: UserId,
    /// The amount of money, always positive. [EntryKind] gives the direction.
    pub amount: f64,
    /// The three letter ISO 4217 currency code, e.g. "EUR".
    pub currency: String,
    /// Whether the money was earned or spent.
    pub kind: EntryKind,
    /// The category of the entry. Cleared if the category is deleted.
    pub category_id: Option<CategoryId>,
    /// The trip the entry belongs to, if any.
    pub trip_id: Option<TripId>,
    /// A text description of what the entry was for.
    pub description: String,
    /// When the entry happened.
    ///
    /// For materialized entries this is the scheduled occurrence date, not the date the
    /// entry was created on.
    pub date: Date,
    /// The recurrence template this entry was materialized from, if any.
    pub template_id: Option<TemplateId>,
}

/// The data for a ledger entry that has not been stored yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewLedgerEntry {
    /// The user that owns the entry.
    pub user_id: UserId,
    /// The amount of money, always positive.
    pub amount: f64,
    /// The three letter ISO 4217 currency code.
    pub currency: String,
    /// Whether the money was earned or spent.
    pub kind: EntryKind,
    /// The category of the entry.
    pub category_id: Option<CategoryId>,
    /// The trip the entry belongs to, if any.
    pub trip_id: Option<TripId>,
    /// A text description of what the entry was for.
    pub description: String,
    /// When the entry happened.
    pub date: Date,
    /// The recurrence template this entry was materialized from, if any.
    pub template_id: Option<TemplateId>,
}

// ============================================================================
// DATABASE FUNCTIONS
// ============================================================================

/// Append an entry to the ledger and return its generated ID.
///
/// # Errors
/// This function will return a:
/// - [Error::DuplicateOccurrence] if the entry's template already has an entry on that date,
/// - [Error::InvalidCategory] or [Error::InvalidTrip] if a reference does not exist,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn append_entry(entry: &NewLedgerEntry, connection: &Connection) -> Result<EntryId, Error> {
    connection
        .prepare(
            "INSERT INTO ledger_entry
                (user_id, amount, currency, kind, category_id, trip_id, description, date, template_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             RETURNING id",
        )?
        .query_row(
            (
                entry.user_id.as_i64(),
                entry.amount,
                &entry.currency,
                entry.kind,
                entry.category_id,
                entry.trip_id,
                &entry.description,
                entry.date,
                entry.template_id,
            ),
            |row| row.get(0),
        )
        .map_err(|error| match error {
            rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error {
                    code: _,
                    extended_code: rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE,
                },
                _,
            ) => match entry.template_id {
                Some(template_id) => Error::DuplicateOccurrence(template_id, entry.date),
                None => error.into(),
            },
            rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error {
                    code: _,
                    extended_code: rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY,
                },
                _,
            ) => find_missing_reference(entry, connection).unwrap_or_else(|| error.into()),
            error => error.into(),
        })
}

/// Work out which reference of `entry` broke a foreign key constraint.
fn find_missing_reference(entry: &NewLedgerEntry, connection: &Connection) -> Option<Error> {
    let category_check = entry
        .category_id
        .map(|category_id| ensure_category_exists(category_id, connection));
    let trip_check = entry
        .trip_id
        .map(|trip_id| ensure_trip_exists(trip_id, connection));

    [category_check, trip_check]
        .into_iter()
        .flatten()
        .find_map(Result::err)
}

/// Retrieve a user's ledger entries, newest first.
pub fn get_entries_for_user(
    user_id: UserId,
    connection: &Connection,
) -> Result<Vec<LedgerEntry>, Error> {
    connection
        .prepare(
            "SELECT id, user_id, amount, currency, kind, category_id, trip_id, description, date, template_id
             FROM ledger_entry
             WHERE user_id = :user_id
             ORDER BY date DESC, id DESC",
        )?
        .query_map(&[(":user_id", &user_id.as_i64())], map_entry_row)?
        .map(|maybe_entry| maybe_entry.map_err(|error| error.into()))
        .collect()
}

/// Retrieve the entries materialized from a template, oldest first.
pub fn get_entries_for_template(
    template_id: TemplateId,
    connection: &Connection,
) -> Result<Vec<LedgerEntry>, Error> {
    connection
        .prepare(
            "SELECT id, user_id, amount, currency, kind, category_id, trip_id, description, date, template_id
             FROM ledger_entry
             WHERE template_id = :template_id
             ORDER BY date ASC, id ASC",
        )?
        .query_map(&[(":template_id", &template_id)], map_entry_row)?
        .map(|maybe_entry| maybe_entry.map_err(|error| error.into()))
        .collect()
}

/// Get the total number of entries in the ledger.
///
/// # Errors
/// This function will return a [Error::SqlError] there is some SQL error.
pub fn count_entries(connection: &Connection) -> Result<u32, Error> {
    connection
        .query_row("SELECT COUNT(id) FROM ledger_entry;", [], |row| row.get(0))
        .map_err(|error| error.into())
}

/// Create the ledger entry table in the database.
///
/// Must run after the recurring template table exists.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL error.
pub fn create_entry_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute_batch(
        "CREATE TABLE IF NOT EXISTS ledger_entry (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                amount REAL NOT NULL,
                currency TEXT NOT NULL,
                kind TEXT NOT NULL,
                category_id INTEGER,
                trip_id INTEGER,
                description TEXT NOT NULL,
                date TEXT NOT NULL,
                template_id INTEGER,
                FOREIGN KEY(user_id) REFERENCES user(id) ON UPDATE CASCADE ON DELETE CASCADE,
                FOREIGN KEY(category_id) REFERENCES category(id) ON UPDATE CASCADE ON DELETE SET NULL,
                FOREIGN KEY(trip_id) REFERENCES trip(id) ON UPDATE CASCADE ON DELETE SET NULL,
                FOREIGN KEY(template_id) REFERENCES recurring_template(id) ON DELETE SET NULL
                );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_ledger_entry_template_date
            ON ledger_entry(template_id, date) WHERE template_id IS NOT NULL;

        CREATE INDEX IF NOT EXISTS idx_ledger_entry_user_date ON ledger_entry(user_id, date);",
    )?;

    Ok(())
}

/// Map a database row to a [LedgerEntry].
pub fn map_entry_row(row: &Row) -> Result<LedgerEntry, rusqlite::Error> {
    let id = row.get(0)?;
    let user_id = UserId::new(row.get(1)?);
    let amount = row.get(2)?;
    let currency = row.get(3)?;
    let kind = row.get(4)?;
    let category_id = row.get(5)?;
    let trip_id = row.get(6)?;
    let description = row.get(7)?;
    let date = row.get(8)?;
    let template_id = row.get(9)?;

    Ok(LedgerEntry {
        id,
        user_id,
        amount,
        currency,
        kind,
        category_id,
        trip_id,
        description,
        date,
        template_id,
    })
}

// ============================================================================
// TESTS
// ============================================================================
