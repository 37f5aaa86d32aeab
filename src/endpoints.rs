//! The API endpoints URIs.
//!
//! For endpoints that take a parameter, e.g., '/api/recurring/{template_id}', use [format_endpoint].

/// The route to list and create recurring transactions.
pub const RECURRING_API: &str = "/api/recurring";
/// The route to get, update or delete a single recurring transaction.
pub const RECURRING_TEMPLATE: &str = "/api/recurring/{template_id}";
/// The route to process the due recurring transactions of the current user.
pub const PROCESS_RECURRING: &str = "/api/recurring/process";
/// The route to process a single recurring transaction.
pub const PROCESS_RECURRING_TEMPLATE: &str = "/api/recurring/{template_id}/process";
/// The route to read the current user's ledger.
pub const ENTRIES_API: &str = "/api/entries";

/// Replace the parameter in `endpoint_path` with `id`.
///
/// A parameter is a string that starts with a left brace, followed by
/// lowercase letters or underscores, and ends with a right brace.
/// For example, in the endpoint path '/users/{user_id}', '{user_id}' is the parameter.
///
/// This function assumes that an endpoint path only contains ASCII characters
/// and a single parameter.
///
/// If no parameter is found in `endpoint_path`, the function returns the
/// the original `endpoint_path`.
pub fn format_endpoint(endpoint_path: &str, id: i64) -> String {
    let mut param_start = None;
    let mut param_end = None;

    for (i, c) in endpoint_path.chars().enumerate() {
        if c == '{' {
            param_start = Some(i);
        } else if param_start.is_some() && c == '}' {
            param_end = Some(i + 1);
            break;
        }
    }

    let param_start = match param_start {
        Some(start) => start,
        None => return endpoint_path.to_string(),
    };

    let param_end = param_end.unwrap_or(endpoint_path.len());

    format!(
        "{}{}{}",
        &endpoint_path[..param_start],
        id,
        &endpoint_path[param_end..]
    )
}
