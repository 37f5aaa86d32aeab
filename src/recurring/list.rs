//! Endpoints for reading recurring transactions.

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::{IntoResponse, Response},
};

use crate::{
    Error,
    database_id::TemplateId,
    recurring::{
        MaterializationState, RecurrenceTemplate,
        db::{get_templates_for_user, get_user_template},
    },
    user::UserId,
};

/// A route handler for listing the current user's recurring transactions.
pub async fn get_templates_endpoint(
    State(state): State<MaterializationState>,
    Extension(user_id): Extension<UserId>,
) -> Result<Json<Vec<RecurrenceTemplate>>, Error> {
    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    get_templates_for_user(user_id, &connection).map(Json)
}

/// A route handler for getting one of the current user's recurring transactions.
pub async fn get_template_endpoint(
    Path(template_id): Path<TemplateId>,
    State(state): State<MaterializationState>,
    Extension(user_id): Extension<UserId>,
) -> Response {
    let connection = match state.db_connection.lock() {
        Ok(connection) => connection,
        Err(error) => {
            tracing::error!("could not acquire database lock: {error}");
            return Error::DatabaseLockError.into_response();
        }
    };

    match get_user_template(template_id, user_id, &connection) {
        Ok(template) => Json(template).into_response(),
        Err(error) => error.into_response(),
    }
}
