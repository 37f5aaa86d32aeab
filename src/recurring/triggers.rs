//! The entry points that decide when recurring transactions are materialized: the daily
//! batch, the lazy check when a user reads their ledger, and manual requests.
//!
//! They differ only in scope and all go through [materialize_due].

use std::{
    sync::{Arc, Mutex},
    time::Instant,
};

use axum::extract::FromRef;
use rusqlite::Connection;
use time::{OffsetDateTime, Time};
use tokio::task::JoinHandle;

use crate::{
    AppState, Error,
    clock::Clock,
    recurring::{MaterializeScope, TemplateLocks, materialize_due},
    timezone::local_now,
    user::UserId,
};

/// The state needed to materialize recurring transactions.
#[derive(Debug, Clone)]
pub struct MaterializationState {
    /// The database connection for recurring transactions and the ledger.
    pub db_connection: Arc<Mutex<Connection>>,
    /// The per-template locks shared by every trigger.
    pub template_locks: TemplateLocks,
    /// The source of the as-of date.
    pub clock: Arc<dyn Clock>,
}

impl FromRef<AppState> for MaterializationState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            template_locks: state.template_locks.clone(),
            clock: state.clock.clone(),
        }
    }
}

/// Materialize every due recurring transaction in the system as of today.
///
/// # Errors
/// Returns an error if today's date cannot be determined or the due templates cannot be
/// found. Failures of individual templates are logged instead.
pub fn run_scheduled_batch(state: &MaterializationState) -> Result<usize, Error> {
    let as_of = state.clock.today()?;
    let start_time = Instant::now();

    let created = materialize_due(
        MaterializeScope::Global,
        as_of,
        &state.db_connection,
        &state.template_locks,
    )?;

    tracing::info!(
        "Processed due recurring transactions as of {as_of}: created {created} entries in {}ms",
        start_time.elapsed().as_millis()
    );

    Ok(created)
}

/// Catch up the recurring transactions of `user_id` before their ledger is read.
///
/// Failures are logged and reported as zero entries so that reading the ledger still works.
pub fn run_lazy_check(user_id: UserId, state: &MaterializationState) -> usize {
    let result = state.clock.today().and_then(|as_of| {
        materialize_due(
            MaterializeScope::User(user_id),
            as_of,
            &state.db_connection,
            &state.template_locks,
        )
    });

    match result {
        Ok(0) => {
            tracing::debug!("No recurring transactions due for user {user_id}");
            0
        }
        Ok(created) => {
            tracing::debug!("Created {created} recurring entries for user {user_id}");
            created
        }
        Err(error) => {
            tracing::error!("Could not process recurring transactions for user {user_id}: {error}");
            0
        }
    }
}

/// Materialize the due recurring transactions in `scope` as of today on request.
///
/// # Errors
/// Returns an error if today's date cannot be determined, or any error from
/// [materialize_due].
pub fn run_manual(scope: MaterializeScope, state: &MaterializationState) -> Result<usize, Error> {
    let as_of = state.clock.today()?;

    let created = materialize_due(scope, as_of, &state.db_connection, &state.template_locks)?;
    tracing::info!("Manual run for {scope:?} as of {as_of} created {created} entries");

    Ok(created)
}

/// How long to wait from `now` until the clock next reads `run_at`.
///
/// If `now` is exactly `run_at`, the next run is a day away.
pub fn duration_until_next_run(now: OffsetDateTime, run_at: Time) -> std::time::Duration {
    let today_run = now.replace_time(run_at);
    let next_run = if today_run > now {
        today_run
    } else {
        today_run + time::Duration::days(1)
    };

    std::time::Duration::try_from(next_run - now).unwrap_or_default()
}

/// Spawn the task that runs [run_scheduled_batch] once at start up and then every day at
/// `run_at` in `timezone`.
///
/// The batch runs on the blocking thread pool since it holds the database lock.
pub fn spawn_daily_materialization(
    state: MaterializationState,
    timezone: String,
    run_at: Time,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        run_batch_in_background(&state).await;

        loop {
            let now = match local_now(&timezone) {
                Ok(now) => now,
                Err(error) => {
                    tracing::error!("Stopping scheduled recurring transaction runs: {error}");
                    return;
                }
            };

            let wait = duration_until_next_run(now, run_at);
            tracing::info!(
                "Next scheduled recurring transaction run in {} minutes",
                wait.as_secs() / 60
            );

            tokio::time::sleep(wait).await;
            run_batch_in_background(&state).await;
        }
    })
}

async fn run_batch_in_background(state: &MaterializationState) {
    let batch_state = state.clone();

    match tokio::task::spawn_blocking(move || run_scheduled_batch(&batch_state)).await {
        Ok(Ok(_)) => {}
        Ok(Err(error)) => tracing::error!("Scheduled recurring transaction run failed: {error}"),
        Err(error) => tracing::error!("{}", Error::TaskFailed(error.to_string())),
    }
}
