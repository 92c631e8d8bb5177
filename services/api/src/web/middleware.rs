//! services/api/src/web/middleware.rs

use crate::error::ApiError;
use crate::web::state::AppState;
use crate::web::token::authenticate;
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use std::sync::Arc;

/// Middleware that validates the bearer token and resolves the live principal.
///
/// On success the `Principal` is inserted into the request extensions for the
/// handlers; the role is read from the user store, never from the token.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    // 1. Extract the Authorization header; a non-ASCII value counts as malformed.
    let header = req
        .headers()
        .get(header::AUTHORIZATION)
        .map(|v| v.to_str().unwrap_or_default().to_string());

    // 2. Validate the token and re-read the user.
    let principal =
        authenticate(&state.jwt, state.db.as_ref(), header.as_deref(), Utc::now()).await?;

    // 3. Insert the principal into request extensions
    req.extensions_mut().insert(principal);

    // 4. Continue to the handler
    Ok(next.run(req).await)
}
