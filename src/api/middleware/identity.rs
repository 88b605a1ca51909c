//! Caller identity middleware.
//!
//! The fronting auth service authenticates users and forwards the
//! authenticated id as `X-User-Id`. This middleware rejects requests
//! without a usable id and injects [`UserContext`] into request
//! extensions for downstream handlers.

use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::api::error::ApiError;
use crate::api::types::UserContext;

const USER_ID_HEADER: &str = "X-User-Id";

pub async fn require_user(req: Request<axum::body::Body>, next: Next) -> Response {
    match require_user_inner(req, next).await {
        Ok(resp) => resp,
        Err(err) => err.into_response(),
    }
}

async fn require_user_inner(
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let user_id: i64 = req
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
        .ok_or(ApiError::Unauthorized)?;

    req.extensions_mut().insert(UserContext { user_id });
    Ok(next.run(req).await)
}
