//! The source of "today" for deciding which occurrences are due.
//!
//! Triggers never read the system time directly. They ask a [Clock], which lets tests and
//! admin backfills pin the as-of date.

use std::fmt::Debug;

use time::Date;

use crate::{Error, timezone::local_now};

/// Provides the current date.
pub trait Clock: Debug + Send + Sync {
    /// Today's date.
    ///
    /// # Errors
    /// Implementations may fail if the local date cannot be determined, e.g. when the
    /// configured timezone is invalid.
    fn today(&self) -> Result<Date, Error>;
}

/// A clock that reads the system time in a canonical timezone, e.g. "Pacific/Auckland".
#[derive(Debug, Clone)]
pub struct LocalClock {
    timezone: String,
}

impl LocalClock {
    /// Create a clock for `timezone`.
    ///
    /// # Errors
    /// Returns [Error::InvalidTimezoneError] if `timezone` is not a known canonical timezone.
    pub fn new(timezone: &str) -> Result<Self, Error> {
        local_now(timezone)?;

        Ok(Self {
            timezone: timezone.to_owned(),
        })
    }

    /// The canonical name of the timezone this clock reads.
    pub fn timezone(&self) -> &str {
        &self.timezone
    }
}

impl Clock for LocalClock {
    fn today(&self) -> Result<Date, Error> {
        local_now(&self.timezone).map(|now| now.date())
    }
}

/// A clock that is stuck on one date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedClock(pub Date);

impl Clock for FixedClock {
    fn today(&self) -> Result<Date, Error> {
        Ok(self.0)
    }
}
