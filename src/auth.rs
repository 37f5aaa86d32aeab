//! Identifies the user behind a request.
//!
//! Authentication itself happens in front of this service. Requests carry the ID of the
//! authenticated user in the `x-user-id` header, and [auth_guard] checks that it refers
//! to a known user.

use std::sync::{Arc, Mutex};

use axum::{
    extract::{FromRef, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use rusqlite::Connection;

use crate::{
    AppState, Error,
    user::{UserId, get_user_by_id},
};

/// The header that carries the authenticated user's ID.
pub const USER_ID_HEADER: &str = "x-user-id";

/// The state needed for the auth middleware
#[derive(Debug, Clone)]
pub struct AuthState {
    /// The database connection for looking up users.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for AuthState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// Middleware function that checks the request is made on behalf of a known user.
///
/// The user ID is placed into the request extensions and the request is executed
/// normally, otherwise a `401 Unauthorized` JSON error is returned.
///
/// **Note**: Route handlers can use the function argument `Extension(user_id): Extension<UserId>` to receive the user ID.
pub async fn auth_guard(
    State(state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Response {
    let user_id = match identify_user(request.headers(), &state) {
        Ok(user_id) => user_id,
        Err(error) => return error.into_response(),
    };

    request.extensions_mut().insert(user_id);
    next.run(request).await
}

fn identify_user(headers: &HeaderMap, state: &AuthState) -> Result<UserId, Error> {
    let user_id = headers
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<i64>().ok())
        .map(UserId::new)
        .ok_or(Error::Unauthenticated)?;

    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    match get_user_by_id(user_id, &connection) {
        Ok(_) => Ok(user_id),
        Err(Error::NotFound) => {
            tracing::debug!("Rejected request for unknown user {user_id}");
            Err(Error::Unauthenticated)
        }
        Err(error) => Err(error),
    }
}
