//! Recurring transaction update endpoint.

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::{IntoResponse, Response},
};

use crate::{
    Error,
    category::ensure_category_exists,
    database_id::TemplateId,
    recurring::{
        MaterializationState, RecurrenceTemplate, TemplateUpdate,
        db::{get_user_template, update_template},
    },
    trip::ensure_trip_exists,
    user::UserId,
};

/// A route handler for updating a recurring transaction.
///
/// Runs under the template's lock so an edit cannot interleave with a materialization
/// pass. The schedule progress is kept, so entries that already exist are not changed.
pub async fn update_template_endpoint(
    Path(template_id): Path<TemplateId>,
    State(state): State<MaterializationState>,
    Extension(user_id): Extension<UserId>,
    Json(update): Json<TemplateUpdate>,
) -> Response {
    let result = state.template_locks.with_lock(template_id, || {
        let connection = state
            .db_connection
            .lock()
            .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
            .map_err(|_| Error::DatabaseLockError)?;

        apply_update(template_id, user_id, update, &connection)
    });

    match result {
        Ok(template) => {
            tracing::info!("User {user_id} updated recurring transaction {template_id}");
            Json(template).into_response()
        }
        Err(error) => error.into_response(),
    }
}

fn apply_update(
    template_id: TemplateId,
    user_id: UserId,
    update: TemplateUpdate,
    connection: &rusqlite::Connection,
) -> Result<RecurrenceTemplate, Error> {
    let template = match get_user_template(template_id, user_id, connection) {
        Ok(template) => template,
        Err(Error::NotFound) => return Err(Error::UpdateMissingTemplate),
        Err(error) => return Err(error),
    };

    let updated = template.apply_update(update)?;
    ensure_category_exists(updated.category_id, connection)?;
    if let Some(trip_id) = updated.trip_id {
        ensure_trip_exists(trip_id, connection)?;
    }

    update_template(&updated, connection)?;

    Ok(updated)
}

#[cfg(test)]
mod update_template_endpoint_tests {
    use axum::{
        Extension, Json,
        extract::{Path, State},
        http::StatusCode,
    };
    use time::macros::date;

    use crate::{
        recurring::{
            RecurrencePattern, RecurrenceTemplate, TemplateUpdate, edit::update_template_endpoint,
        },
        test_utils::{Fixture, assert_status, parse_json_body},
        user::create_user,
    };

    fn update_from(template: &RecurrenceTemplate) -> TemplateUpdate {
        TemplateUpdate {
            amount: template.amount,
            currency: template.currency.clone(),
            kind: template.kind,
            category_id: template.category_id,
            trip_id: template.trip_id,
            description: template.description.clone(),
            pattern: template.pattern,
            end_date: template.end_date,
            max_occurrences: template.max_occurrences,
            active: template.active,
        }
    }

    #[tokio::test]
    async fn updates_payload() {
        let fixture = Fixture::new();
        let user_id = fixture.user.id;
        let template = fixture.insert_template(RecurrencePattern::Monthly, date!(2025 - 01 - 01));
        let mut update = update_from(&template);
        update.amount = 1200.0;
        update.description = "Rent (new lease)".to_owned();
        let state = fixture.into_materialization_state(date!(2025 - 01 - 01));

        let response = update_template_endpoint(
            Path(template.id),
            State(state),
            Extension(user_id),
            Json(update),
        )
        .await;

        assert_status(&response, StatusCode::OK);
        let updated: RecurrenceTemplate = parse_json_body(response).await;
        assert_eq!(updated.amount, 1200.0);
        assert_eq!(updated.description, "Rent (new lease)");
        assert_eq!(updated.next_execution, template.next_execution);
    }

    #[tokio::test]
    async fn rejects_end_date_before_start() {
        let fixture = Fixture::new();
        let user_id = fixture.user.id;
        let template = fixture.insert_template(RecurrencePattern::Monthly, date!(2025 - 01 - 01));
        let mut update = update_from(&template);
        update.end_date = Some(date!(2024 - 12 - 01));
        let state = fixture.into_materialization_state(date!(2025 - 01 - 01));

        let response = update_template_endpoint(
            Path(template.id),
            State(state),
            Extension(user_id),
            Json(update),
        )
        .await;

        assert_status(&response, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn other_users_template_is_not_found() {
        let fixture = Fixture::new();
        let other_user = create_user("Bob", &fixture.connection).unwrap();
        let template = fixture.insert_template(RecurrencePattern::Monthly, date!(2025 - 01 - 01));
        let update = update_from(&template);
        let state = fixture.into_materialization_state(date!(2025 - 01 - 01));

        let response = update_template_endpoint(
            Path(template.id),
            State(state),
            Extension(other_user.id),
            Json(update),
        )
        .await;

        assert_status(&response, StatusCode::NOT_FOUND);
    }
}
