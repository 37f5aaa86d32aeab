use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use time::{Date, macros::date};

use crate::{
    AppState, FixedClock, TemplateLocks,
    category::{Category, CategoryId, create_category},
    db::initialize,
    ledger::EntryKind,
    recurring::{
        MaterializationState, NewRecurrenceTemplate, RecurrencePattern, RecurrenceTemplate,
        SeedMode, create_template,
    },
    user::{User, create_user},
};

/// An initialised in-memory database with one user and one category.
pub(crate) struct Fixture {
    pub connection: Connection,
    pub user: User,
    pub category: Category,
}

impl Fixture {
    pub fn new() -> Self {
        let connection = Connection::open_in_memory().expect("Could not open in-memory database");
        initialize(&connection).expect("Could not initialize database");
        let user = create_user("Alice", &connection).expect("Could not create user");
        let category = create_category("Housing", &connection).expect("Could not create category");

        Self {
            connection,
            user,
            category,
        }
    }

    /// A daily backfilling template starting on 2025-01-01.
    pub fn template_for(category_id: CategoryId) -> NewRecurrenceTemplate {
        NewRecurrenceTemplate {
            amount: 100.0,
            currency: "eur".to_owned(),
            kind: EntryKind::Expense,
            category_id,
            trip_id: None,
            description: "Rent".to_owned(),
            pattern: RecurrencePattern::Daily,
            start_date: date!(2025 - 01 - 01),
            end_date: None,
            max_occurrences: None,
            seed_mode: SeedMode::Backfill,
        }
    }

    /// A backfilling template for the fixture's user and category.
    pub fn new_template(
        &self,
        pattern: RecurrencePattern,
        start_date: Date,
    ) -> NewRecurrenceTemplate {
        NewRecurrenceTemplate {
            pattern,
            start_date,
            ..Self::template_for(self.category.id)
        }
    }

    pub fn insert(&self, new_template: NewRecurrenceTemplate) -> RecurrenceTemplate {
        let today = new_template.start_date;

        create_template(self.user.id, new_template, today, &self.connection)
            .expect("Could not create template")
    }

    pub fn insert_template(
        &self,
        pattern: RecurrencePattern,
        start_date: Date,
    ) -> RecurrenceTemplate {
        self.insert(self.new_template(pattern, start_date))
    }

    pub fn into_materialization_state(self, today: Date) -> MaterializationState {
        MaterializationState {
            db_connection: Arc::new(Mutex::new(self.connection)),
            template_locks: TemplateLocks::new(),
            clock: Arc::new(FixedClock(today)),
        }
    }

    pub fn into_app_state(self, today: Date) -> AppState {
        AppState::new(self.connection, FixedClock(today)).expect("Could not create app state")
    }
}
