//! The endpoint for reading a user's ledger.

use axum::{
    Extension, Json,
    extract::State,
    response::{IntoResponse, Response},
};

use crate::{
    Error,
    ledger::get_entries_for_user,
    recurring::{MaterializationState, run_lazy_check},
    user::UserId,
};

/// A route handler for listing the current user's ledger entries, newest first.
///
/// The user's due recurring transactions are caught up first so the ledger is current.
/// If that fails the ledger is still returned.
pub async fn get_entries_endpoint(
    State(state): State<MaterializationState>,
    Extension(user_id): Extension<UserId>,
) -> Response {
    run_lazy_check(user_id, &state);

    let connection = match state.db_connection.lock() {
        Ok(connection) => connection,
        Err(error) => {
            tracing::error!("could not acquire database lock: {error}");
            return Error::DatabaseLockError.into_response();
        }
    };

    match get_entries_for_user(user_id, &connection) {
        Ok(entries) => Json(entries).into_response(),
        Err(error) => error.into_response(),
    }
}
