//! Recurring transaction deletion endpoint.

use axum::{
    Extension,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::{
    Error,
    database_id::TemplateId,
    recurring::{
        MaterializationState,
        db::{delete_template, get_user_template},
    },
    user::UserId,
};

/// Handle recurring transaction deletion. Responds with `204 No Content` on success.
///
/// Entries already created from the template are kept and lose their link to it.
pub async fn delete_template_endpoint(
    Path(template_id): Path<TemplateId>,
    State(state): State<MaterializationState>,
    Extension(user_id): Extension<UserId>,
) -> Response {
    let result = state.template_locks.with_lock(template_id, || {
        let connection = state
            .db_connection
            .lock()
            .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
            .map_err(|_| Error::DatabaseLockError)?;

        match get_user_template(template_id, user_id, &connection) {
            Ok(_) => delete_template(template_id, &connection),
            Err(Error::NotFound) => Err(Error::DeleteMissingTemplate),
            Err(error) => Err(error),
        }
    });

    match result {
        Ok(()) => {
            state.template_locks.forget(template_id);
            tracing::info!("User {user_id} deleted recurring transaction {template_id}");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(error) => error.into_response(),
    }
}

#[cfg(test)]
mod delete_template_endpoint_tests {
    use axum::{
        Extension,
        extract::{Path, State},
        http::StatusCode,
    };
    use time::macros::date;

    use crate::{
        Error,
        ledger::get_entries_for_user,
        recurring::{
            MaterializeScope, RecurrencePattern, delete::delete_template_endpoint,
            db::get_template, materialize_due,
        },
        test_utils::{Fixture, assert_status},
    };

    #[tokio::test]
    async fn deletes_template_and_keeps_entries() {
        let fixture = Fixture::new();
        let user_id = fixture.user.id;
        let template = fixture.insert_template(RecurrencePattern::Daily, date!(2025 - 01 - 01));
        let state = fixture.into_materialization_state(date!(2025 - 01 - 02));
        materialize_due(
            MaterializeScope::Global,
            date!(2025 - 01 - 02),
            &state.db_connection,
            &state.template_locks,
        )
        .unwrap();

        let response =
            delete_template_endpoint(Path(template.id), State(state.clone()), Extension(user_id))
                .await;

        assert_status(&response, StatusCode::NO_CONTENT);
        let connection = state.db_connection.lock().unwrap();
        assert_eq!(get_template(template.id, &connection), Err(Error::NotFound));
        let entries = get_entries_for_user(user_id, &connection).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|entry| entry.template_id.is_none()));
    }

    #[tokio::test]
    async fn missing_template_is_not_found() {
        let fixture = Fixture::new();
        let user_id = fixture.user.id;
        let state = fixture.into_materialization_state(date!(2025 - 01 - 02));

        let response = delete_template_endpoint(Path(42), State(state), Extension(user_id)).await;

        assert_status(&response, StatusCode::NOT_FOUND);
    }
}
