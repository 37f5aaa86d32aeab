//! The materialization engine: turns the due occurrences of recurrence templates into
//! ledger entries.
//!
//! Every trigger funnels into [materialize_due]. A template is only ever materialized
//! while holding its lock from [TemplateLocks], and the created entries are committed
//! in the same database transaction as the template's new schedule state.

use std::sync::Mutex;

use rusqlite::{Connection, TransactionBehavior};
use time::Date;

use crate::{
    Error,
    category::ensure_category_exists,
    database_id::TemplateId,
    ledger::{NewLedgerEntry, append_entry},
    recurring::{
        RecurrenceTemplate, TemplateLocks,
        db::{find_due_template_ids, get_template, save_template_state},
        next_occurrence,
    },
    trip::ensure_trip_exists,
    user::UserId,
};

/// Which templates a materialization run covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterializeScope {
    /// Every active template in the system.
    Global,
    /// The active templates of one user.
    User(UserId),
    /// A single template. Errors are returned to the caller instead of being logged.
    Template(TemplateId),
}

/// Materialize every due occurrence of the templates in `scope`, up to and including
/// `as_of`, and return the number of entries created.
///
/// For the global and user scopes, a template that fails is logged and skipped so the
/// remaining templates are still processed. Its state is left as it was before the
/// failed attempt, so the next run retries it.
///
/// # Errors
/// Returns an error if the due templates cannot be found. For the template scope, any
/// error from [materialize_template] is returned, including [Error::NotFound] for a
/// template that does not exist.
pub fn materialize_due(
    scope: MaterializeScope,
    as_of: Date,
    db_connection: &Mutex<Connection>,
    template_locks: &TemplateLocks,
) -> Result<usize, Error> {
    if let MaterializeScope::Template(template_id) = scope {
        return materialize_template(template_id, as_of, db_connection, template_locks);
    }

    let template_ids = {
        let connection = lock_connection(db_connection)?;
        find_due_template_ids(scope, as_of, &connection)?
    };

    let mut created = 0;

    for template_id in template_ids {
        match materialize_template(template_id, as_of, db_connection, template_locks) {
            Ok(count) => created += count,
            Err(Error::NotFound) => tracing::debug!(
                "Recurring transaction {template_id} was deleted before it could be processed"
            ),
            Err(error) if error.is_template_fault() => {
                tracing::warn!("Skipping recurring transaction {template_id}: {error}")
            }
            Err(error) => tracing::error!(
                "Could not process recurring transaction {template_id}, it will be retried on the next run: {error}"
            ),
        }
    }

    Ok(created)
}

/// Materialize one template while holding its lock.
///
/// # Errors
/// Returns [Error::DatabaseLockError] if the connection lock is poisoned, otherwise
/// see [materialize].
pub fn materialize_template(
    template_id: TemplateId,
    as_of: Date,
    db_connection: &Mutex<Connection>,
    template_locks: &TemplateLocks,
) -> Result<usize, Error> {
    template_locks.with_lock(template_id, || {
        let mut connection = lock_connection(db_connection)?;
        materialize(template_id, as_of, &mut connection)
    })
}

/// Create the entries for every due occurrence of a template and advance its schedule.
///
/// The template is read inside an immediate (write-locking) transaction, so a pass that
/// had to wait for another one sees that pass's committed state and creates nothing twice.
/// Either all of the entries and the new template state are stored, or none of them are.
///
/// Callers in this crate should go through [materialize_template] so that the template
/// lock is held.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if the template does not exist,
/// - [Error::InvalidPattern] or [Error::InvalidEntryKind] if the stored template is corrupt,
/// - [Error::InvalidCategory] or [Error::InvalidTrip] if the template refers to a deleted
///   category or trip,
/// - or [Error::SqlError] if the database fails, in which case nothing is changed.
pub fn materialize(
    template_id: TemplateId,
    as_of: Date,
    connection: &mut Connection,
) -> Result<usize, Error> {
    let transaction = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let original = get_template(template_id, &transaction)?;
    if !original.active {
        return Ok(0);
    }

    let mut template = original.clone();
    let entries = plan_occurrences(&mut template, as_of);

    if template == original {
        return Ok(0);
    }

    if !entries.is_empty() {
        ensure_category_exists(template.category_id, &transaction)?;
        if let Some(trip_id) = template.trip_id {
            ensure_trip_exists(trip_id, &transaction)?;
        }
    }

    for entry in &entries {
        append_entry(entry, &transaction)?;
    }

    save_template_state(&template, &transaction)?;
    transaction.commit()?;

    if !template.active {
        tracing::info!(
            "Recurring transaction {template_id} finished after {} occurrences",
            template.executed_occurrences
        );
    }
    tracing::debug!(
        "Created {} entries for recurring transaction {template_id}, next occurrence on {}",
        entries.len(),
        template.next_execution
    );

    Ok(entries.len())
}

/// Advance `template` through its occurrences on or before `as_of`, oldest first, and
/// return the entries for them.
///
/// The template is deactivated as soon as it runs out of occurrences, either by reaching
/// `max_occurrences`, by passing its end date, or by running off the end of the calendar.
pub(crate) fn plan_occurrences(
    template: &mut RecurrenceTemplate,
    as_of: Date,
) -> Vec<NewLedgerEntry> {
    let mut entries = Vec::new();

    while template.active && template.next_execution <= as_of {
        if template.is_exhausted() {
            template.active = false;
            break;
        }

        entries.push(template.entry_for(template.next_execution));
        template.executed_occurrences = template.executed_occurrences.saturating_add(1);

        match next_occurrence(template.next_execution, template.pattern) {
            Some(next) => template.next_execution = next,
            None => {
                tracing::warn!(
                    "Recurring transaction {} has no occurrence after {}",
                    template.id,
                    template.next_execution
                );
                template.active = false;
            }
        }

        if template.is_exhausted() {
            template.active = false;
        }
    }

    entries
}

fn lock_connection(
    db_connection: &Mutex<Connection>,
) -> Result<std::sync::MutexGuard<'_, Connection>, Error> {
    db_connection.lock().map_err(|error| {
        tracing::error!("could not acquire database lock: {error}");
        Error::DatabaseLockError
    })
}


#[cfg(test)]
mod materialize_tests {
    use std::{
        path::PathBuf,
        sync::{Arc, Mutex},
        thread,
    };

    use rusqlite::Connection;
    use time::{Duration, macros::date};

    use crate::{
        Error,
        category::create_category,
        db::{initialize, open_connection},
        ledger::{count_entries, get_entries_for_template},
        recurring::{
            MaterializeScope, RecurrencePattern, TemplateLocks,
            db::get_template,
            engine::{materialize, materialize_due},
        },
        test_utils::Fixture,
        trip::create_trip,
    };

    #[test]
    fn catches_up_every_missed_day() {
        let fixture = Fixture::new();
        let start = date!(2025 - 01 - 01);
        let template = fixture.insert_template(RecurrencePattern::Daily, start);
        let mut connection = fixture.connection;

        let created = materialize(template.id, start + Duration::days(5), &mut connection);

        assert_eq!(created, Ok(6));
        let dates: Vec<_> = get_entries_for_template(template.id, &connection)
            .unwrap()
            .into_iter()
            .map(|entry| entry.date)
            .collect();
        let want: Vec<_> = (0..6).map(|day| start + Duration::days(day)).collect();
        assert_eq!(dates, want);
        let template = get_template(template.id, &connection).unwrap();
        assert_eq!(template.next_execution, start + Duration::days(6));
        assert_eq!(template.executed_occurrences, 6);
        assert!(template.active);
    }

    #[test]
    fn month_end_is_clamped() {
        let fixture = Fixture::new();
        let template = fixture.insert_template(RecurrencePattern::Monthly, date!(2025 - 01 - 31));
        let leap_template =
            fixture.insert_template(RecurrencePattern::Monthly, date!(2024 - 01 - 31));
        let mut connection = fixture.connection;

        materialize(template.id, date!(2025 - 03 - 05), &mut connection).unwrap();
        materialize(leap_template.id, date!(2024 - 03 - 05), &mut connection).unwrap();

        let dates = |id| -> Vec<_> {
            get_entries_for_template(id, &connection)
                .unwrap()
                .into_iter()
                .map(|entry| entry.date)
                .collect()
        };
        assert_eq!(
            dates(template.id),
            vec![date!(2025 - 01 - 31), date!(2025 - 02 - 28)]
        );
        assert_eq!(
            dates(leap_template.id),
            vec![date!(2024 - 01 - 31), date!(2024 - 02 - 29)]
        );
    }

    #[test]
    fn max_occurrences_finishes_template() {
        let fixture = Fixture::new();
        let mut new_template =
            fixture.new_template(RecurrencePattern::Daily, date!(2025 - 01 - 01));
        new_template.max_occurrences = Some(3);
        let template = fixture.insert(new_template);
        let mut connection = fixture.connection;

        let created = materialize(template.id, date!(2025 - 01 - 10), &mut connection);
        let created_later = materialize(template.id, date!(2026 - 01 - 01), &mut connection);

        assert_eq!(created, Ok(3));
        assert_eq!(created_later, Ok(0));
        let template = get_template(template.id, &connection).unwrap();
        assert!(!template.active);
        assert_eq!(template.executed_occurrences, 3);
        assert_eq!(count_entries(&connection), Ok(3));
    }

    #[test]
    fn end_date_before_next_occurrence_finishes_template() {
        let fixture = Fixture::new();
        let mut new_template =
            fixture.new_template(RecurrencePattern::Monthly, date!(2025 - 01 - 31));
        new_template.end_date = Some(date!(2025 - 02 - 15));
        let template = fixture.insert(new_template);
        let mut connection = fixture.connection;

        let created = materialize(template.id, date!(2025 - 06 - 30), &mut connection);

        assert_eq!(created, Ok(1));
        let template = get_template(template.id, &connection).unwrap();
        assert!(!template.active);
        assert_eq!(template.next_execution, date!(2025 - 02 - 28));
    }

    #[test]
    fn end_date_reached_without_entries_is_saved() {
        let fixture = Fixture::new();
        let template = fixture.insert_template(RecurrencePattern::Daily, date!(2025 - 01 - 01));
        fixture
            .connection
            .execute(
                "UPDATE recurring_template SET end_date = '2024-12-31' WHERE id = ?1",
                [template.id],
            )
            .unwrap();
        let mut connection = fixture.connection;

        let created = materialize(template.id, date!(2025 - 01 - 05), &mut connection);

        assert_eq!(created, Ok(0));
        assert!(!get_template(template.id, &connection).unwrap().active);
    }

    #[test]
    fn second_run_with_same_date_creates_nothing() {
        let fixture = Fixture::new();
        fixture.insert_template(RecurrencePattern::Daily, date!(2025 - 01 - 01));
        fixture.insert_template(RecurrencePattern::Weekly, date!(2025 - 01 - 01));
        let db = Mutex::new(fixture.connection);
        let locks = TemplateLocks::new();
        let as_of = date!(2025 - 01 - 31);

        let first = materialize_due(MaterializeScope::Global, as_of, &db, &locks);
        let second = materialize_due(MaterializeScope::Global, as_of, &db, &locks);

        assert_eq!(first, Ok(31 + 5));
        assert_eq!(second, Ok(0));
    }

    #[test]
    fn triggers_agree_on_ledger_state() {
        let as_of = date!(2025 - 03 - 31);
        let mut ledgers = Vec::new();

        for scopes in [
            vec![MaterializeScope::Global],
            vec![MaterializeScope::User(crate::UserId::new(1))],
            vec![
                MaterializeScope::User(crate::UserId::new(1)),
                MaterializeScope::Global,
                MaterializeScope::Template(1),
            ],
        ] {
            let fixture = Fixture::new();
            let template =
                fixture.insert_template(RecurrencePattern::Monthly, date!(2025 - 01 - 31));
            assert_eq!(template.id, 1);
            let db = Mutex::new(fixture.connection);
            let locks = TemplateLocks::new();

            for scope in scopes {
                materialize_due(scope, as_of, &db, &locks).unwrap();
            }

            let connection = db.lock().unwrap();
            let dates: Vec<_> = get_entries_for_template(1, &connection)
                .unwrap()
                .into_iter()
                .map(|entry| entry.date)
                .collect();
            ledgers.push((dates, get_template(1, &connection).unwrap()));
        }

        assert_eq!(ledgers[0], ledgers[1]);
        assert_eq!(ledgers[0], ledgers[2]);
        assert_eq!(ledgers[0].0.len(), 3);
    }

    #[test]
    fn concurrent_runs_do_not_duplicate() {
        let fixture = Fixture::new();
        let template_id = fixture
            .insert_template(RecurrencePattern::Daily, date!(2025 - 01 - 01))
            .id;
        let db = Arc::new(Mutex::new(fixture.connection));
        let locks = TemplateLocks::new();
        let as_of = date!(2025 - 01 - 06);

        let results: Vec<_> = thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let db = &db;
                    let locks = &locks;
                    scope.spawn(move || {
                        let materialize_scope = if i % 2 == 0 {
                            MaterializeScope::Global
                        } else {
                            MaterializeScope::Template(template_id)
                        };
                        materialize_due(materialize_scope, as_of, db, locks)
                    })
                })
                .collect();

            handles
                .into_iter()
                .map(|handle| handle.join().unwrap())
                .collect()
        });

        let total: usize = results.into_iter().map(Result::unwrap).sum();
        assert_eq!(total, 6);
        assert_eq!(count_entries(&db.lock().unwrap()), Ok(6));
    }

    struct TempDatabase(PathBuf);

    impl TempDatabase {
        fn new(name: &str) -> Self {
            let path = std::env::temp_dir().join(format!(
                "ledgerline-{name}-{}.db",
                std::process::id()
            ));
            let _ = std::fs::remove_file(&path);
            Self(path)
        }
    }

    impl Drop for TempDatabase {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.0);
        }
    }

    #[test]
    fn separate_processes_do_not_duplicate() {
        let database = TempDatabase::new("separate-processes");
        let template_id = {
            let connection = open_connection(&database.0).unwrap();
            initialize(&connection).unwrap();
            let user = crate::create_user("Alice", &connection).unwrap();
            let category = create_category("Housing", &connection).unwrap();
            let mut new_template = Fixture::template_for(category.id);
            new_template.start_date = date!(2025 - 01 - 01);
            crate::create_template(user.id, new_template, date!(2025 - 01 - 01), &connection)
                .unwrap()
                .id
        };
        let as_of = date!(2025 - 01 - 10);

        // Each thread stands in for a separate process with its own connection and locks.
        let total: usize = thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let path = &database.0;
                    scope.spawn(move || {
                        let connection = open_connection(path).unwrap();
                        connection
                            .pragma_update(None, "foreign_keys", true)
                            .unwrap();
                        let db = Mutex::new(connection);
                        materialize_due(
                            MaterializeScope::Template(template_id),
                            as_of,
                            &db,
                            &TemplateLocks::new(),
                        )
                        .unwrap()
                    })
                })
                .collect();

            handles.into_iter().map(|handle| handle.join().unwrap()).sum()
        });

        assert_eq!(total, 10);
        let connection = Connection::open(&database.0).unwrap();
        assert_eq!(count_entries(&connection), Ok(10));
    }

    #[test]
    fn failed_commit_leaves_state_unchanged() {
        let fixture = Fixture::new();
        let template = fixture.insert_template(RecurrencePattern::Daily, date!(2025 - 01 - 01));
        fixture
            .connection
            .execute_batch(
                "CREATE TRIGGER fail_third_entry BEFORE INSERT ON ledger_entry
                 WHEN NEW.date = '2025-01-03'
                 BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
            )
            .unwrap();
        let mut connection = fixture.connection;

        let result = materialize(template.id, date!(2025 - 01 - 06), &mut connection);

        assert!(matches!(result, Err(Error::SqlError(_))));
        assert_eq!(count_entries(&connection), Ok(0));
        assert_eq!(get_template(template.id, &connection), Ok(template.clone()));

        connection
            .execute_batch("DROP TRIGGER fail_third_entry;")
            .unwrap();
        let retried = materialize(template.id, date!(2025 - 01 - 06), &mut connection);

        assert_eq!(retried, Ok(6));
    }

    #[test]
    fn deleted_category_skips_only_that_template() {
        let fixture = Fixture::new();
        let doomed_category = create_category("Gym", &fixture.connection).unwrap();
        let mut new_template =
            fixture.new_template(RecurrencePattern::Daily, date!(2025 - 01 - 01));
        new_template.category_id = doomed_category.id;
        let orphan = fixture.insert(new_template);
        let healthy = fixture.insert_template(RecurrencePattern::Daily, date!(2025 - 01 - 01));
        fixture
            .connection
            .execute("DELETE FROM category WHERE id = ?1", [doomed_category.id])
            .unwrap();
        let db = Mutex::new(fixture.connection);
        let locks = TemplateLocks::new();
        let as_of = date!(2025 - 01 - 02);

        let created = materialize_due(MaterializeScope::Global, as_of, &db, &locks);
        let surfaced = materialize_due(MaterializeScope::Template(orphan.id), as_of, &db, &locks);

        assert_eq!(created, Ok(2));
        assert_eq!(surfaced, Err(Error::InvalidCategory(doomed_category.id)));
        let connection = db.lock().unwrap();
        assert_eq!(get_template(orphan.id, &connection), Ok(orphan));
        assert_eq!(get_entries_for_template(healthy.id, &connection).unwrap().len(), 2);
    }

    #[test]
    fn deleted_trip_is_a_reference_fault() {
        let fixture = Fixture::new();
        let trip = create_trip(fixture.user.id, "Lisbon", &fixture.connection).unwrap();
        let mut new_template =
            fixture.new_template(RecurrencePattern::Daily, date!(2025 - 01 - 01));
        new_template.trip_id = Some(trip.id);
        let template = fixture.insert(new_template);
        fixture
            .connection
            .execute("DELETE FROM trip WHERE id = ?1", [trip.id])
            .unwrap();
        let mut connection = fixture.connection;

        let result = materialize(template.id, date!(2025 - 01 - 01), &mut connection);

        assert_eq!(result, Err(Error::InvalidTrip(trip.id)));
    }

    #[test]
    fn corrupt_pattern_skips_only_that_template() {
        let fixture = Fixture::new();
        let corrupt = fixture.insert_template(RecurrencePattern::Daily, date!(2025 - 01 - 01));
        let healthy = fixture.insert_template(RecurrencePattern::Daily, date!(2025 - 01 - 01));
        fixture
            .connection
            .execute(
                "UPDATE recurring_template SET pattern = 'HOURLY' WHERE id = ?1",
                [corrupt.id],
            )
            .unwrap();
        let db = Mutex::new(fixture.connection);
        let locks = TemplateLocks::new();
        let as_of = date!(2025 - 01 - 03);

        let created = materialize_due(MaterializeScope::Global, as_of, &db, &locks);
        let surfaced = materialize_due(MaterializeScope::Template(corrupt.id), as_of, &db, &locks);

        assert_eq!(created, Ok(3));
        assert_eq!(surfaced, Err(Error::InvalidPattern("HOURLY".to_owned())));
        let connection = db.lock().unwrap();
        assert_eq!(get_entries_for_template(healthy.id, &connection).unwrap().len(), 3);
        assert_eq!(get_entries_for_template(corrupt.id, &connection).unwrap().len(), 0);
    }

    #[test]
    fn missing_template_is_not_found() {
        let fixture = Fixture::new();
        let mut connection = fixture.connection;

        assert_eq!(
            materialize(99, date!(2025 - 01 - 01), &mut connection),
            Err(Error::NotFound)
        );
    }

    #[test]
    fn missing_template_in_template_scope_is_not_found() {
        let fixture = Fixture::new();
        let db = Mutex::new(fixture.connection);
        let locks = TemplateLocks::new();

        let result = materialize_due(
            MaterializeScope::Template(999),
            date!(2025 - 01 - 01),
            &db,
            &locks,
        );

        assert_eq!(result, Err(Error::NotFound));
    }

    #[test]
    fn template_scope_creates_nothing_for_pending_or_inactive_templates() {
        let fixture = Fixture::new();
        let pending = fixture.insert_template(RecurrencePattern::Daily, date!(2025 - 01 - 10));
        let inactive = fixture.insert_template(RecurrencePattern::Daily, date!(2025 - 01 - 01));
        fixture
            .connection
            .execute(
                "UPDATE recurring_template SET active = 0 WHERE id = ?1",
                [inactive.id],
            )
            .unwrap();
        let db = Mutex::new(fixture.connection);
        let locks = TemplateLocks::new();
        let as_of = date!(2025 - 01 - 05);

        let for_pending =
            materialize_due(MaterializeScope::Template(pending.id), as_of, &db, &locks);
        let for_inactive =
            materialize_due(MaterializeScope::Template(inactive.id), as_of, &db, &locks);

        assert_eq!(for_pending, Ok(0));
        assert_eq!(for_inactive, Ok(0));
        let connection = db.lock().unwrap();
        assert_eq!(get_template(pending.id, &connection), Ok(pending));
        assert_eq!(count_entries(&connection), Ok(0));
    }
}
