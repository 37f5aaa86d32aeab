//! Recurrence patterns and the schedule advancer.

use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};
use time::{Date, Duration, Month};

use crate::Error;

/// How often a recurring transaction repeats.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecurrencePattern {
    /// Every day.
    Daily,
    /// Every seven days.
    Weekly,
    /// Once a calendar month.
    Monthly,
    /// Once a calendar year.
    Yearly,
}

impl RecurrencePattern {
    /// The name used for the pattern in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            RecurrencePattern::Daily => "DAILY",
            RecurrencePattern::Weekly => "WEEKLY",
            RecurrencePattern::Monthly => "MONTHLY",
            RecurrencePattern::Yearly => "YEARLY",
        }
    }
}

impl Display for RecurrencePattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecurrencePattern {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DAILY" => Ok(RecurrencePattern::Daily),
            "WEEKLY" => Ok(RecurrencePattern::Weekly),
            "MONTHLY" => Ok(RecurrencePattern::Monthly),
            "YEARLY" => Ok(RecurrencePattern::Yearly),
            _ => Err(Error::InvalidPattern(s.to_owned())),
        }
    }
}

/// Get the date of the occurrence after `date`.
///
/// Monthly and yearly steps keep the day of the month, clamped to the length of the target
/// month: Jan 31 is followed by Feb 28 (or Feb 29 in a leap year), and Feb 29 by Feb 28 of
/// the next year. The clamped day is what gets stored, so later steps carry on from it.
///
/// Returns `None` if the next occurrence does not fit in the supported date range.
pub fn next_occurrence(date: Date, pattern: RecurrencePattern) -> Option<Date> {
    match pattern {
        RecurrencePattern::Daily => date.next_day(),
        RecurrencePattern::Weekly => date.checked_add(Duration::weeks(1)),
        RecurrencePattern::Monthly => {
            let (year, month) = match date.month() {
                Month::December => (date.year().checked_add(1)?, Month::January),
                month => (date.year(), month.next()),
            };

            clamped_date(year, month, date.day())
        }
        RecurrencePattern::Yearly => {
            clamped_date(date.year().checked_add(1)?, date.month(), date.day())
        }
    }
}

/// Build a date, moving `day` back to the last day of the month if the month is too short.
fn clamped_date(year: i32, month: Month, day: u8) -> Option<Date> {
    // Every month has at least 28 days.
    let shortest = day.min(28);

    (shortest..=day)
        .rev()
        .find_map(|day| Date::from_calendar_date(year, month, day).ok())
}
