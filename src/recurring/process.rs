//! Endpoints for processing due recurring transactions on request.

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::{
    Error,
    database_id::TemplateId,
    recurring::{MaterializationState, MaterializeScope, db::get_user_template, run_manual},
    user::UserId,
};

/// The result of a manual run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessResponse {
    /// The number of ledger entries created.
    pub created: usize,
}

/// A route handler that processes the current user's due recurring transactions.
pub async fn process_due_endpoint(
    State(state): State<MaterializationState>,
    Extension(user_id): Extension<UserId>,
) -> Response {
    match run_manual(MaterializeScope::User(user_id), &state) {
        Ok(created) => Json(ProcessResponse { created }).into_response(),
        Err(error) => error.into_response(),
    }
}

/// A route handler that processes a single recurring transaction.
///
/// Unlike the per-user run, a fault in the template is returned to the client.
pub async fn process_template_endpoint(
    Path(template_id): Path<TemplateId>,
    State(state): State<MaterializationState>,
    Extension(user_id): Extension<UserId>,
) -> Response {
    let owned = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)
        .and_then(|connection| get_user_template(template_id, user_id, &connection).map(|_| ()));

    if let Err(error) = owned {
        return error.into_response();
    }

    match run_manual(MaterializeScope::Template(template_id), &state) {
        Ok(created) => Json(ProcessResponse { created }).into_response(),
        Err(error) => error.into_response(),
    }
}
