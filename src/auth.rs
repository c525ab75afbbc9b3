//! Bearer-token authentication.
//!
//! Operator routes are gated by middleware carrying the single operator
//! token from configuration, compared constant-time. Account routes
//! authenticate in the handler via `account_from_headers`, because several
//! of them (initiation, confirm, intent reads) allow anonymous callers for
//! signup-fee intents.

use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use crate::crypto::secrets_equal;
use crate::db::{queries, AppState};
use crate::error::Result;
use crate::models::Account;

pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Resolve the calling account from headers, if a valid token is present.
/// `Ok(None)` means no/unknown token, which some routes allow.
pub fn account_from_headers(state: &AppState, headers: &HeaderMap) -> Result<Option<Account>> {
    let token = match extract_bearer_token(headers) {
        Some(token) => token,
        None => return Ok(None),
    };
    let conn = state.db.get()?;
    queries::get_account_by_token(&conn, token)
}

pub async fn operator_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> std::result::Result<Response, StatusCode> {
    let token = extract_bearer_token(request.headers()).ok_or(StatusCode::UNAUTHORIZED)?;

    if !secrets_equal(token, &state.operator_token) {
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(next.run(request).await)
}
