//! Database queries for recurrence templates.

use rusqlite::{Connection, Params, Row, params};
use time::Date;

use crate::{
    Error,
    category::ensure_category_exists,
    database_id::TemplateId,
    recurring::{
        MaterializeScope, NewRecurrenceTemplate, RecurrencePattern, RecurrenceTemplate,
        template::{seed_next_execution, validate_payload, validate_schedule},
    },
    trip::ensure_trip_exists,
    user::UserId,
};

const TEMPLATE_COLUMNS: &str = "id, user_id, amount, currency, kind, category_id, trip_id, \
    description, pattern, start_date, end_date, next_execution, max_occurrences, \
    executed_occurrences, active";

/// Create a recurrence template for `user_id`.
///
/// `today` is the creation date used to seed the first occurrence in
/// [SeedMode::Lazy](crate::SeedMode::Lazy) mode.
///
/// # Errors
/// This function will return a:
/// - [Error::InvalidTemplate] if the payload or schedule is invalid,
/// - [Error::InvalidCategory] or [Error::InvalidTrip] if a reference does not exist,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn create_template(
    user_id: UserId,
    new_template: NewRecurrenceTemplate,
    today: Date,
    connection: &Connection,
) -> Result<RecurrenceTemplate, Error> {
    let currency = validate_payload(new_template.amount, &new_template.currency)?;
    validate_schedule(
        new_template.start_date,
        new_template.end_date,
        new_template.max_occurrences,
    )?;
    ensure_category_exists(new_template.category_id, connection)?;
    if let Some(trip_id) = new_template.trip_id {
        ensure_trip_exists(trip_id, connection)?;
    }

    let next_execution = seed_next_execution(&new_template, today)?;

    connection
        .prepare(&format!(
            "INSERT INTO recurring_template
                (user_id, amount, currency, kind, category_id, trip_id, description, pattern,
                 start_date, end_date, next_execution, max_occurrences, executed_occurrences, active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, 0, 1)
             RETURNING {TEMPLATE_COLUMNS}"
        ))?
        .query_row(
            params![
                user_id.as_i64(),
                new_template.amount,
                currency,
                new_template.kind,
                new_template.category_id,
                new_template.trip_id,
                new_template.description,
                new_template.pattern.as_str(),
                new_template.start_date,
                new_template.end_date,
                next_execution,
                new_template.max_occurrences,
            ],
            map_template_row,
        )
        .map_err(|error| error.into())
}

/// Retrieve a template by its ID.
///
/// # Errors
/// Returns [Error::NotFound] if the template does not exist, or [Error::InvalidPattern] /
/// [Error::InvalidEntryKind] if the stored row is corrupt.
pub fn get_template(
    template_id: TemplateId,
    connection: &Connection,
) -> Result<RecurrenceTemplate, Error> {
    connection
        .prepare(&format!(
            "SELECT {TEMPLATE_COLUMNS} FROM recurring_template WHERE id = :id"
        ))?
        .query_row(&[(":id", &template_id)], map_template_row)
        .map_err(|error| error.into())
}

/// Retrieve a template by its ID, hiding templates owned by other users.
///
/// # Errors
/// Returns [Error::NotFound] if the template does not exist or belongs to someone else.
pub fn get_user_template(
    template_id: TemplateId,
    user_id: UserId,
    connection: &Connection,
) -> Result<RecurrenceTemplate, Error> {
    match get_template(template_id, connection) {
        Ok(template) if template.user_id == user_id => Ok(template),
        Ok(_) => Err(Error::NotFound),
        Err(error) => Err(error),
    }
}

/// Retrieve all of a user's templates, ordered by ID.
pub fn get_templates_for_user(
    user_id: UserId,
    connection: &Connection,
) -> Result<Vec<RecurrenceTemplate>, Error> {
    connection
        .prepare(&format!(
            "SELECT {TEMPLATE_COLUMNS} FROM recurring_template WHERE user_id = :user_id ORDER BY id"
        ))?
        .query_map(&[(":user_id", &user_id.as_i64())], map_template_row)?
        .map(|maybe_template| maybe_template.map_err(|error| error.into()))
        .collect()
}

/// Find the IDs of the active templates in `scope` with an occurrence on or before `as_of`.
///
/// Only IDs are returned so that one corrupt row cannot stop the others from being
/// processed. Each template is loaded again when it is materialized.
pub fn find_due_template_ids(
    scope: MaterializeScope,
    as_of: Date,
    connection: &Connection,
) -> Result<Vec<TemplateId>, Error> {
    match scope {
        MaterializeScope::Global => query_template_ids(
            "SELECT id FROM recurring_template
             WHERE active = 1 AND next_execution <= ?1 ORDER BY id",
            params![as_of],
            connection,
        ),
        MaterializeScope::User(user_id) => query_template_ids(
            "SELECT id FROM recurring_template
             WHERE active = 1 AND next_execution <= ?1 AND user_id = ?2 ORDER BY id",
            params![as_of, user_id.as_i64()],
            connection,
        ),
        MaterializeScope::Template(template_id) => query_template_ids(
            "SELECT id FROM recurring_template
             WHERE active = 1 AND next_execution <= ?1 AND id = ?2",
            params![as_of, template_id],
            connection,
        ),
    }
}

fn query_template_ids(
    sql: &str,
    params: impl Params,
    connection: &Connection,
) -> Result<Vec<TemplateId>, Error> {
    connection
        .prepare(sql)?
        .query_map(params, |row| row.get(0))?
        .map(|maybe_id| maybe_id.map_err(|error| error.into()))
        .collect()
}

/// Store the schedule state of a template after a materialization pass.
///
/// # Errors
/// Returns [Error::UpdateMissingTemplate] if the template no longer exists.
pub fn save_template_state(
    template: &RecurrenceTemplate,
    connection: &Connection,
) -> Result<(), Error> {
    let rows_affected = connection.execute(
        "UPDATE recurring_template
         SET next_execution = ?1, executed_occurrences = ?2, active = ?3
         WHERE id = ?4",
        params![
            template.next_execution,
            template.executed_occurrences,
            template.active,
            template.id
        ],
    )?;

    if rows_affected == 0 {
        return Err(Error::UpdateMissingTemplate);
    }

    Ok(())
}

/// Store the editable fields of a template.
///
/// # Errors
/// Returns [Error::UpdateMissingTemplate] if the template no longer exists.
pub fn update_template(
    template: &RecurrenceTemplate,
    connection: &Connection,
) -> Result<(), Error> {
    let rows_affected = connection.execute(
        "UPDATE recurring_template
         SET amount = ?1, currency = ?2, kind = ?3, category_id = ?4, trip_id = ?5,
             description = ?6, pattern = ?7, end_date = ?8, max_occurrences = ?9, active = ?10
         WHERE id = ?11",
        params![
            template.amount,
            template.currency,
            template.kind,
            template.category_id,
            template.trip_id,
            template.description,
            template.pattern.as_str(),
            template.end_date,
            template.max_occurrences,
            template.active,
            template.id
        ],
    )?;

    if rows_affected == 0 {
        return Err(Error::UpdateMissingTemplate);
    }

    Ok(())
}

/// Delete a template. Entries already materialized from it are kept.
///
/// # Errors
/// Returns [Error::DeleteMissingTemplate] if the template does not exist.
pub fn delete_template(template_id: TemplateId, connection: &Connection) -> Result<(), Error> {
    let rows_affected = connection.execute(
        "DELETE FROM recurring_template WHERE id = ?1",
        params![template_id],
    )?;

    if rows_affected == 0 {
        return Err(Error::DeleteMissingTemplate);
    }

    Ok(())
}

/// Create the recurring template table in the database.
///
/// IDs are never reused so that entries and per-template locks cannot be confused with a
/// template created after a deletion.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL error.
pub fn create_template_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute_batch(
        "CREATE TABLE IF NOT EXISTS recurring_template (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                amount REAL NOT NULL,
                currency TEXT NOT NULL,
                kind TEXT NOT NULL,
                category_id INTEGER NOT NULL,
                trip_id INTEGER,
                description TEXT NOT NULL,
                pattern TEXT NOT NULL,
                start_date TEXT NOT NULL,
                end_date TEXT,
                next_execution TEXT NOT NULL,
                max_occurrences INTEGER CHECK (max_occurrences IS NULL OR max_occurrences > 0),
                executed_occurrences INTEGER NOT NULL DEFAULT 0 CHECK (executed_occurrences >= 0),
                active INTEGER NOT NULL DEFAULT 1,
                FOREIGN KEY(user_id) REFERENCES user(id) ON UPDATE CASCADE ON DELETE CASCADE
                );

        CREATE INDEX IF NOT EXISTS idx_recurring_template_due
            ON recurring_template(active, next_execution);

        CREATE INDEX IF NOT EXISTS idx_recurring_template_user_due
            ON recurring_template(user_id, active, next_execution);",
    )?;

    Ok(())
}

/// Map a database row to a [RecurrenceTemplate].
///
/// An unknown pattern or entry kind is reported as a conversion failure wrapping
/// [Error::InvalidPattern] or [Error::InvalidEntryKind].
pub fn map_template_row(row: &Row) -> Result<RecurrenceTemplate, rusqlite::Error> {
    let raw_pattern: String = row.get(8)?;
    let pattern: RecurrencePattern = raw_pattern.parse().map_err(|error: Error| {
        rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, Box::new(error))
    })?;

    Ok(RecurrenceTemplate {
        id: row.get(0)?,
        user_id: UserId::new(row.get(1)?),
        amount: row.get(2)?,
        currency: row.get(3)?,
        kind: row.get(4)?,
        category_id: row.get(5)?,
        trip_id: row.get(6)?,
        description: row.get(7)?,
        pattern,
        start_date: row.get(9)?,
        end_date: row.get(10)?,
        next_execution: row.get(11)?,
        max_occurrences: row.get(12)?,
        executed_occurrences: row.get(13)?,
        active: row.get(14)?,
    })
}
