//! Recurring transaction creation endpoint.

use axum::{
    Extension, Json,
    extract::State,
    http::{StatusCode, header::LOCATION},
    response::{IntoResponse, Response},
};

use crate::{
    Error, endpoints,
    recurring::{MaterializationState, NewRecurrenceTemplate, db::create_template},
    user::UserId,
};

/// A route handler for creating a recurring transaction.
///
/// Responds with `201 Created` and the stored template. Nothing is materialized here,
/// the next trigger picks up any occurrences that are already due.
pub async fn create_template_endpoint(
    State(state): State<MaterializationState>,
    Extension(user_id): Extension<UserId>,
    Json(new_template): Json<NewRecurrenceTemplate>,
) -> Response {
    let today = match state.clock.today() {
        Ok(today) => today,
        Err(error) => return error.into_response(),
    };

    let connection = match state.db_connection.lock() {
        Ok(connection) => connection,
        Err(error) => {
            tracing::error!("could not acquire database lock: {error}");
            return Error::DatabaseLockError.into_response();
        }
    };

    match create_template(user_id, new_template, today, &connection) {
        Ok(template) => {
            tracing::info!(
                "User {user_id} created recurring transaction {} starting {}",
                template.id,
                template.next_execution
            );
            let location = endpoints::format_endpoint(endpoints::RECURRING_TEMPLATE, template.id);

            (StatusCode::CREATED, [(LOCATION, location)], Json(template)).into_response()
        }
        Err(error) => error.into_response(),
    }
}
