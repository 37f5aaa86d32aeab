//! The recurrence template model and the rules for creating and editing templates.

use serde::{Deserialize, Serialize};
use time::Date;

use crate::{
    Error,
    category::CategoryId,
    database_id::TemplateId,
    ledger::{EntryKind, NewLedgerEntry},
    recurring::{RecurrencePattern, next_occurrence},
    trip::TripId,
    user::UserId,
};

/// A description of an income or expense that repeats on a schedule.
///
/// The template carries the payload copied into every materialized entry plus the
/// schedule state that decides which occurrence is due next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurrenceTemplate {
    /// The ID of the template.
    pub id: TemplateId,
    /// The user that owns the template and its entries.
    pub user_id: UserId,
    /// The amount of each entry.
    pub amount: f64,
    /// The currency of each entry.
    pub currency: String,
    /// Whether each entry is income or an expense.
    pub kind: EntryKind,
    /// The category of each entry.
    pub category_id: CategoryId,
    /// The trip each entry belongs to, if any.
    pub trip_id: Option<TripId>,
    /// The description of each entry.
    pub description: String,
    /// How often the template repeats.
    pub pattern: RecurrencePattern,
    /// The date the schedule is anchored to.
    pub start_date: Date,
    /// The last date an occurrence may fall on, inclusive.
    pub end_date: Option<Date>,
    /// The date of the next occurrence that has not been materialized yet.
    pub next_execution: Date,
    /// The maximum number of entries to materialize.
    pub max_occurrences: Option<u32>,
    /// The number of entries materialized so far.
    pub executed_occurrences: u32,
    /// Whether the template still produces entries.
    pub active: bool,
}

/// Where a template is in its lifecycle relative to some date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateStatus {
    /// Active, but the next occurrence is in the future.
    Pending,
    /// Active, and at least one occurrence is on or before the date.
    Due,
    /// Inactive. Finished templates never produce entries again unless they are edited.
    Finished,
}

impl RecurrenceTemplate {
    /// The status of the template as of `as_of`.
    pub fn status(&self, as_of: Date) -> TemplateStatus {
        if !self.active {
            TemplateStatus::Finished
        } else if self.next_execution <= as_of {
            TemplateStatus::Due
        } else {
            TemplateStatus::Pending
        }
    }

    /// Whether the template has produced all the entries it ever will: either the
    /// maximum number of occurrences has been reached or the next occurrence is past the
    /// end date.
    pub fn is_exhausted(&self) -> bool {
        self.max_occurrences
            .is_some_and(|max| self.executed_occurrences >= max)
            || self.end_date.is_some_and(|end| self.next_execution > end)
    }

    /// The ledger entry for the occurrence on `date`.
    pub fn entry_for(&self, date: Date) -> NewLedgerEntry {
        NewLedgerEntry {
            user_id: self.user_id,
            amount: self.amount,
            currency: self.currency.clone(),
            kind: self.kind,
            category_id: Some(self.category_id),
            trip_id: self.trip_id,
            description: self.description.clone(),
            date,
            template_id: Some(self.id),
        }
    }

    /// Apply the changes in `update`, checking that the result is still a valid template.
    ///
    /// The schedule anchor and progress (`start_date`, `next_execution` and
    /// `executed_occurrences`) cannot be edited, so changing the pattern takes effect from
    /// the next occurrence onwards.
    ///
    /// # Errors
    /// Returns [Error::InvalidTemplate] if the payload is invalid, if `max_occurrences`
    /// is below the number of entries already created, or if the update reactivates a
    /// template that would be finished straight away.
    pub fn apply_update(&self, update: TemplateUpdate) -> Result<RecurrenceTemplate, Error> {
        let currency = validate_payload(update.amount, &update.currency)?;
        validate_schedule(self.start_date, update.end_date, update.max_occurrences)?;

        if let Some(max) = update.max_occurrences
            && max < self.executed_occurrences
        {
            return Err(Error::InvalidTemplate(format!(
                "max_occurrences ({max}) cannot be lower than the {} entries already created",
                self.executed_occurrences
            )));
        }

        let updated = RecurrenceTemplate {
            amount: update.amount,
            currency,
            kind: update.kind,
            category_id: update.category_id,
            trip_id: update.trip_id,
            description: update.description,
            pattern: update.pattern,
            end_date: update.end_date,
            max_occurrences: update.max_occurrences,
            active: update.active,
            ..self.clone()
        };

        if updated.active && updated.is_exhausted() {
            return Err(Error::InvalidTemplate(
                "cannot activate a recurring transaction that has no occurrences left".to_owned(),
            ));
        }

        Ok(updated)
    }
}

/// How the first occurrence of a new template is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeedMode {
    /// The first occurrence is the start date, so a start date in the past creates the
    /// missed entries on the next run.
    Backfill,
    /// The first occurrence is the first one on or after the creation date.
    #[default]
    Lazy,
}

/// The data for creating a recurrence template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRecurrenceTemplate {
    /// The amount of each entry, must be positive.
    pub amount: f64,
    /// The three letter currency code of each entry.
    pub currency: String,
    /// Whether each entry is income or an expense.
    pub kind: EntryKind,
    /// The category of each entry.
    pub category_id: CategoryId,
    /// The trip each entry belongs to, if any.
    #[serde(default)]
    pub trip_id: Option<TripId>,
    /// The description of each entry.
    #[serde(default)]
    pub description: String,
    /// How often the template repeats.
    pub pattern: RecurrencePattern,
    /// The date the schedule is anchored to.
    pub start_date: Date,
    /// The last date an occurrence may fall on, inclusive.
    #[serde(default)]
    pub end_date: Option<Date>,
    /// The maximum number of entries to create.
    #[serde(default)]
    pub max_occurrences: Option<u32>,
    /// How the first occurrence is chosen.
    #[serde(default)]
    pub seed_mode: SeedMode,
}

/// The editable fields of a recurrence template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateUpdate {
    /// The amount of each entry, must be positive.
    pub amount: f64,
    /// The three letter currency code of each entry.
    pub currency: String,
    /// Whether each entry is income or an expense.
    pub kind: EntryKind,
    /// The category of each entry.
    pub category_id: CategoryId,
    /// The trip each entry belongs to, if any.
    #[serde(default)]
    pub trip_id: Option<TripId>,
    /// The description of each entry.
    #[serde(default)]
    pub description: String,
    /// How often the template repeats.
    pub pattern: RecurrencePattern,
    /// The last date an occurrence may fall on, inclusive.
    #[serde(default)]
    pub end_date: Option<Date>,
    /// The maximum number of entries to create.
    #[serde(default)]
    pub max_occurrences: Option<u32>,
    /// Whether the template should produce entries.
    pub active: bool,
}

/// Check the amount and currency of a template, returning the normalised currency code.
pub(crate) fn validate_payload(amount: f64, currency: &str) -> Result<String, Error> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(Error::InvalidTemplate(format!(
            "the amount must be a positive number, got {amount}"
        )));
    }

    let currency = currency.trim();
    if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(Error::InvalidTemplate(format!(
            "\"{currency}\" is not a three letter currency code"
        )));
    }

    Ok(currency.to_ascii_uppercase())
}

/// Check the termination conditions of a template.
pub(crate) fn validate_schedule(
    start_date: Date,
    end_date: Option<Date>,
    max_occurrences: Option<u32>,
) -> Result<(), Error> {
    if let Some(end_date) = end_date
        && end_date < start_date
    {
        return Err(Error::InvalidTemplate(format!(
            "the end date {end_date} is before the start date {start_date}"
        )));
    }

    if max_occurrences == Some(0) {
        return Err(Error::InvalidTemplate(
            "max_occurrences must be at least 1".to_owned(),
        ));
    }

    Ok(())
}

/// Choose the first occurrence of a new template created on `today`.
///
/// # Errors
/// Returns [Error::InvalidTemplate] if no occurrence falls on or before the end date.
pub(crate) fn seed_next_execution(
    new_template: &NewRecurrenceTemplate,
    today: Date,
) -> Result<Date, Error> {
    let first = match new_template.seed_mode {
        SeedMode::Backfill => Some(new_template.start_date),
        SeedMode::Lazy => {
            first_occurrence_on_or_after(new_template.start_date, new_template.pattern, today)
        }
    };

    match first {
        Some(first) if new_template.end_date.is_none_or(|end| first <= end) => Ok(first),
        _ => Err(Error::InvalidTemplate(
            "the recurring transaction has no occurrences before its end date".to_owned(),
        )),
    }
}

/// Walk the schedule from `start` until it reaches `date`.
fn first_occurrence_on_or_after(
    start: Date,
    pattern: RecurrencePattern,
    date: Date,
) -> Option<Date> {
    let mut occurrence = start;

    while occurrence < date {
        occurrence = next_occurrence(occurrence, pattern)?;
    }

    Some(occurrence)
}
