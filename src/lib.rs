//! Ledgerline is a personal-finance ledger service.
//!
//! Users record income and expense entries in a ledger. Entries that repeat on a
//! schedule (rent, wages, subscriptions) are described once as a recurrence template,
//! and this library materializes the due occurrences of those templates into concrete
//! ledger entries. Materialization can be triggered by a daily batch, lazily whenever a
//! user reads their ledger, or manually, and every trigger funnels into the same
//! guarded, atomic catch-up pass so that no occurrence is ever duplicated or lost.
//!
//! This library provides a JSON REST API and the batch job entry points.

#![warn(missing_docs)]

use std::{net::SocketAddr, time::Duration};

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_server::Handle;
use serde_json::json;
use time::Date;
use tokio::signal;

mod app_state;
mod auth;
mod category;
mod clock;
mod database_id;
mod db;
mod endpoints;
mod ledger;
mod recurring;
mod routing;
mod timezone;
mod trip;
mod user;

#[cfg(test)]
mod test_utils;

pub use app_state::AppState;
pub use category::{Category, CategoryId, create_category};
pub use clock::{Clock, FixedClock, LocalClock};
pub use database_id::{DatabaseId, EntryId, TemplateId};
pub use db::{initialize as initialize_db, open_connection};
pub use ledger::{EntryKind, LedgerEntry, NewLedgerEntry, append_entry, get_entries_for_user};
pub use recurring::{
    MaterializationState, MaterializeScope, NewRecurrenceTemplate, ProcessResponse,
    RecurrencePattern, RecurrenceTemplate, SeedMode, TemplateLocks, TemplateStatus,
    TemplateUpdate, create_template, duration_until_next_run, get_template,
    get_templates_for_user, materialize, materialize_due, materialize_template, next_occurrence,
    run_lazy_check, run_manual, run_scheduled_batch, spawn_daily_materialization,
};
pub use routing::build_router;
pub use trip::{Trip, TripId, create_trip};
pub use user::{User, UserId, create_user};

/// An async task that waits for either the ctrl+c or terminate signal, whichever comes first, and
/// then signals the server to shut down gracefully.
///
/// `handle` is a handle to an Axum `Server`.
pub async fn graceful_shutdown(handle: Handle<SocketAddr>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::debug!("Received ctrl+c signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
        _ = terminate => {
            tracing::debug!("Received terminate signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
    }
}

/// The errors that may occur in the application.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// The requested resource was not found.
    ///
    /// For HTTP request handlers, the client should check that the parameters
    /// (e.g., ID) are correct and that the resource has been created.
    ///
    /// Internally, this error may occur when a query returns no rows.
    #[error("the requested resource could not be found")]
    NotFound,

    /// An unhandled/unexpected SQL error.
    #[error("an unexpected SQL error occurred: {0}")]
    SqlError(rusqlite::Error),

    /// Could not acquire the database lock
    #[error("could not acquire the database lock")]
    DatabaseLockError,

    /// An error occurred while getting the local timezone from a canonical timezone string.
    #[error("invalid timezone {0}")]
    InvalidTimezoneError(String),

    /// The request did not carry the identity of a known user.
    #[error("the request is not associated with a valid user")]
    Unauthenticated,

    /// A stored or submitted recurrence pattern is not one of the known patterns.
    #[error("\"{0}\" is not a valid recurrence pattern")]
    InvalidPattern(String),

    /// A stored or submitted entry kind is neither income nor expense.
    #[error("\"{0}\" is not a valid entry kind")]
    InvalidEntryKind(String),

    /// A recurrence template has an invalid configuration, e.g. an end date before its
    /// start date.
    #[error("invalid recurring transaction: {0}")]
    InvalidTemplate(String),

    /// The category ID does not refer to an existing category.
    ///
    /// For templates this can happen after creation if the category was deleted.
    #[error("the category ID {0} does not refer to a valid category")]
    InvalidCategory(CategoryId),

    /// The trip ID does not refer to an existing trip.
    #[error("the trip ID {0} does not refer to a valid trip")]
    InvalidTrip(TripId),

    /// A ledger entry for this template and date already exists.
    #[error("template {0} already has an entry dated {1}")]
    DuplicateOccurrence(TemplateId, Date),

    /// Tried to update a recurring transaction that does not exist
    #[error("tried to update a recurring transaction that is not in the database")]
    UpdateMissingTemplate,

    /// Tried to delete a recurring transaction that does not exist
    #[error("tried to delete a recurring transaction that is not in the database")]
    DeleteMissingTemplate,

    /// A background task panicked or was cancelled before it finished.
    #[error("background task failed: {0}")]
    TaskFailed(String),
}

impl Error {
    /// Whether the error is caused by the configuration of a single recurrence template
    /// (a validation or reference fault) rather than by the infrastructure.
    ///
    /// Batch runs skip templates with these faults and carry on with the others.
    pub fn is_template_fault(&self) -> bool {
        matches!(
            self,
            Error::InvalidPattern(_)
                | Error::InvalidEntryKind(_)
                | Error::InvalidTemplate(_)
                | Error::InvalidCategory(_)
                | Error::InvalidTrip(_)
        )
    }
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        match value {
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound,
            // Row mappers report invalid enum values as conversion failures wrapping our own
            // error type, so unwrap those back out.
            rusqlite::Error::FromSqlConversionFailure(column, column_type, inner) => {
                match inner.downcast::<Error>() {
                    Ok(error) => *error,
                    Err(inner) => {
                        let error =
                            rusqlite::Error::FromSqlConversionFailure(column, column_type, inner);
                        tracing::error!("an unhandled SQL error occurred: {}", error);
                        Error::SqlError(error)
                    }
                }
            }
            error => {
                tracing::error!("an unhandled SQL error occurred: {}", error);
                Error::SqlError(error)
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::NotFound | Error::UpdateMissingTemplate | Error::DeleteMissingTemplate => {
                StatusCode::NOT_FOUND
            }
            Error::Unauthenticated => StatusCode::UNAUTHORIZED,
            Error::InvalidPattern(_)
            | Error::InvalidEntryKind(_)
            | Error::InvalidTemplate(_)
            | Error::InvalidCategory(_)
            | Error::InvalidTrip(_) => StatusCode::BAD_REQUEST,
            Error::DuplicateOccurrence(..) => StatusCode::CONFLICT,
            // Any errors that are not handled above are not intended to be shown to the client.
            error => {
                tracing::error!("An unexpected error occurred: {}", error);

                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "error": "An unexpected error occurred, check the server logs for more details."
                    })),
                )
                    .into_response();
            }
        };

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
