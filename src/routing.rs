//! Application router configuration with protected and unprotected route definitions.

use axum::{
    Json, Router,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;

use crate::{
    AppState,
    auth::auth_guard,
    endpoints,
    ledger::get_entries_endpoint,
    recurring::{
        create_template_endpoint, delete_template_endpoint, get_template_endpoint,
        get_templates_endpoint, process_due_endpoint, process_template_endpoint,
        update_template_endpoint,
    },
};

/// Return a router with all the app's routes.
///
/// Every route requires the `x-user-id` header to name a known user.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(
            endpoints::RECURRING_API,
            get(get_templates_endpoint).post(create_template_endpoint),
        )
        .route(endpoints::PROCESS_RECURRING, post(process_due_endpoint))
        .route(
            endpoints::RECURRING_TEMPLATE,
            get(get_template_endpoint)
                .put(update_template_endpoint)
                .delete(delete_template_endpoint),
        )
        .route(
            endpoints::PROCESS_RECURRING_TEMPLATE,
            post(process_template_endpoint),
        )
        .route(endpoints::ENTRIES_API, get(get_entries_endpoint))
        .layer(middleware::from_fn_with_state(state.clone(), auth_guard))
        .fallback(get_404_not_found)
        .with_state(state)
}

async fn get_404_not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "the requested resource could not be found" })),
    )
        .into_response()
}
